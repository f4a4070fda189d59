//! JSON configuration loading and merging (§4.I). Files are read in the
//! order given on the command line and folded together with
//! [`merge_values`]; the result is deserialized once into [`RootConfig`],
//! whose nested structs are the narrow, typed views handed to each
//! component's constructor.

mod duration;
mod error;
mod merge;
mod types;

use std::fs;
use std::path::Path;

use serde_json::Value;

pub use duration::{deserialize_duration, parse_duration};
pub use error::ConfigError;
pub use merge::merge_values;
pub use types::{
    ActiveConsensusAlgo, ConsensusConfig, GossipConfig, LoggerConfig, MempoolConfig, PeerConfig,
    RootConfig, StorageConfig, SyncConfig,
};

pub fn load_value(path: impl AsRef<Path>) -> Result<Value, ConfigError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

/// Reads and merges every file in `paths`, later files winning, then
/// deserializes the merged document into a [`RootConfig`].
pub fn load(paths: &[impl AsRef<Path>]) -> Result<RootConfig, ConfigError> {
    let mut merged = Value::Object(serde_json::Map::new());
    for path in paths {
        let value = load_value(path)?;
        merged = merge_values(merged, value);
    }
    Ok(serde_json::from_value(merged)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_temp(name: &str, value: &Value) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(name);
        fs::write(&path, serde_json::to_vec(value).unwrap()).unwrap();
        path
    }

    fn base_document() -> Value {
        json!({
            "node-address": "aa00000000000000000000000000000000000000",
            "node-private-key": "00",
            "gossip": {
                "gossip-port": 4000,
                "gossip-connection-keep-alive-interval": "30s",
                "gossip-network-timeout": "5s"
            },
            "storage": {
                "data-dir": "/tmp/ledger",
                "block-storage-file-system-max-block-size-in-bytes": 4194304
            },
            "sync": {
                "block-sync-no-commit-interval": "10s",
                "block-sync-collect-response-timeout": "2s",
                "block-sync-collect-chunks-timeout": "5s",
                "block-sync-num-blocks-in-batch": 50,
                "block-sync-reference-max-allowed-distance": 100
            },
            "mempool": {
                "transaction-pool-pending-pool-size-in-bytes": 104857600,
                "transaction-pool-propagation-batch-size": 100,
                "transaction-pool-propagation-batching-timeout": "200ms",
                "transaction-pool-time-between-empty-blocks": "100ms",
                "max-number-of-transactions": 100,
                "transaction-pool-node-sync-reject-time": "1h",
                "transaction-pool-pending-pool-clear-expired-interval": "1m",
                "transaction-pool-committed-pool-clear-expired-interval": "1m",
                "transaction-expiration-window": "24h",
                "transaction-pool-future-timestamp-grace-timeout": "5m"
            },
            "consensus": {
                "active-consensus-algo": "benchmark",
                "benchmark-consensus-constant-leader": "aa00000000000000000000000000000000000000",
                "benchmark-consensus-retry-interval": "500ms",
                "benchmark-consensus-required-quorum-percentage": 67,
                "consensus-context-maximum-transactions-in-block": 1000,
                "consensus-context-system-timestamp-allowed-jitter": "2s",
                "lean-helix-consensus-minimum-committee-size": 4,
                "lean-helix-consensus-maximum-committee-size": 22,
                "virtual-chain-id": 42
            },
            "ethereum-finality-blocks-component": { "polling-interval": "12s" }
        })
    }

    #[test]
    fn loads_single_file_and_retains_unknown_keys() {
        let path = write_temp("ledger-config-test-single.json", &base_document());
        let cfg = load(&[path]).unwrap();
        assert_eq!(cfg.gossip.gossip_port, 4000);
        assert!(cfg.extra.contains_key("ethereum-finality-blocks-component"));
    }

    #[test]
    fn later_file_overrides_earlier() {
        let base = write_temp("ledger-config-test-base.json", &base_document());
        let overlay = write_temp(
            "ledger-config-test-overlay.json",
            &json!({ "gossip": { "gossip-port": 4100 } }),
        );
        let cfg = load(&[base, overlay]).unwrap();
        assert_eq!(cfg.gossip.gossip_port, 4100);
        assert_eq!(
            cfg.gossip.gossip_connection_keep_alive_interval,
            std::time::Duration::from_secs(30)
        );
    }

    #[test]
    fn federation_nodes_alias_resolves_to_topology_nodes() {
        let mut doc = base_document();
        doc["gossip"]["federation-nodes"] = json!([
            { "address": "bb00000000000000000000000000000000000000", "ip": "127.0.0.1", "port": 4001 }
        ]);
        let path = write_temp("ledger-config-test-alias.json", &doc);
        let cfg = load(&[path]).unwrap();
        assert_eq!(cfg.gossip.topology_nodes.len(), 1);
        assert_eq!(cfg.gossip.topology_nodes[0].port, 4001);
    }
}
