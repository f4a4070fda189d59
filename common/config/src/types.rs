use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use common_crypto::NodeAddress;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::duration::deserialize_duration;
use crate::error::ConfigError;

fn hex_to_node_address(s: &str) -> Result<NodeAddress, ConfigError> {
    NodeAddress::from_hex(s).map_err(|_| ConfigError::InvalidHex(s.to_owned()))
}

pub(crate) fn parse_node_addresses(raw: &[String]) -> Result<Vec<NodeAddress>, ConfigError> {
    raw.iter().map(|s| hex_to_node_address(s)).collect()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct PeerConfig {
    pub address: String,
    pub ip:      String,
    pub port:    u16,
}

impl PeerConfig {
    pub fn node_address(&self) -> Result<NodeAddress, ConfigError> {
        hex_to_node_address(&self.address)
    }
}

/// §4.B — one outbound/inbound session per configured peer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct GossipConfig {
    pub gossip_port: u16,

    #[serde(deserialize_with = "deserialize_duration")]
    pub gossip_connection_keep_alive_interval: Duration,

    #[serde(deserialize_with = "deserialize_duration")]
    pub gossip_network_timeout: Duration,

    #[serde(default = "default_send_queue_capacity")]
    pub send_queue_capacity: usize,

    #[serde(default, alias = "federation-nodes")]
    pub topology_nodes: Vec<PeerConfig>,
}

fn default_send_queue_capacity() -> usize {
    4096
}

/// §4.C.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct StorageConfig {
    pub data_dir: PathBuf,

    pub block_storage_file_system_max_block_size_in_bytes: u64,

    #[serde(default = "default_max_protocol_version")]
    pub max_protocol_version: u32,
}

fn default_max_protocol_version() -> u32 {
    1
}

/// Block-sync state machine timers (§4.C).
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct SyncConfig {
    #[serde(deserialize_with = "deserialize_duration")]
    pub block_sync_no_commit_interval: Duration,

    #[serde(deserialize_with = "deserialize_duration")]
    pub block_sync_collect_response_timeout: Duration,

    #[serde(deserialize_with = "deserialize_duration")]
    pub block_sync_collect_chunks_timeout: Duration,

    pub block_sync_num_blocks_in_batch: u32,

    pub block_sync_reference_max_allowed_distance: u64,

    #[serde(default)]
    pub block_sync_descending_activation_time: Option<u64>,
}

/// §4.D.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct MempoolConfig {
    pub transaction_pool_pending_pool_size_in_bytes: u64,

    pub transaction_pool_propagation_batch_size: usize,

    #[serde(deserialize_with = "deserialize_duration")]
    pub transaction_pool_propagation_batching_timeout: Duration,

    #[serde(deserialize_with = "deserialize_duration")]
    pub transaction_pool_time_between_empty_blocks: Duration,

    pub max_number_of_transactions: usize,

    #[serde(deserialize_with = "deserialize_duration")]
    pub transaction_pool_node_sync_reject_time: Duration,

    #[serde(deserialize_with = "deserialize_duration")]
    pub transaction_pool_pending_pool_clear_expired_interval: Duration,

    #[serde(deserialize_with = "deserialize_duration")]
    pub transaction_pool_committed_pool_clear_expired_interval: Duration,

    #[serde(deserialize_with = "deserialize_duration")]
    pub transaction_expiration_window: Duration,

    #[serde(deserialize_with = "deserialize_duration")]
    pub transaction_pool_future_timestamp_grace_timeout: Duration,

    #[serde(default = "default_admission_concurrency")]
    pub admission_concurrency: usize,
}

fn default_admission_concurrency() -> usize {
    100
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActiveConsensusAlgo {
    Benchmark,
    Bft,
}

/// §4.F/§4.G.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct ConsensusConfig {
    pub active_consensus_algo: ActiveConsensusAlgo,

    #[serde(default)]
    pub benchmark_consensus_constant_leader: Option<String>,

    #[serde(deserialize_with = "deserialize_duration")]
    pub benchmark_consensus_retry_interval: Duration,

    pub benchmark_consensus_required_quorum_percentage: u8,

    pub consensus_context_maximum_transactions_in_block: usize,

    #[serde(deserialize_with = "deserialize_duration")]
    pub consensus_context_system_timestamp_allowed_jitter: Duration,

    pub lean_helix_consensus_minimum_committee_size: usize,

    pub lean_helix_consensus_maximum_committee_size: usize,

    #[serde(default)]
    pub genesis_validator_addresses: Vec<String>,

    #[serde(default = "default_network_type")]
    pub network_type: u16,

    pub virtual_chain_id: u32,
}

fn default_network_type() -> u16 {
    1
}

impl ConsensusConfig {
    pub fn benchmark_constant_leader(&self) -> Result<Option<NodeAddress>, ConfigError> {
        self.benchmark_consensus_constant_leader
            .as_deref()
            .map(hex_to_node_address)
            .transpose()
    }

    pub fn genesis_validators(&self) -> Result<Vec<NodeAddress>, ConfigError> {
        parse_node_addresses(&self.genesis_validator_addresses)
    }
}

/// §4.J.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoggerConfig {
    #[serde(default = "default_filter")]
    pub filter: String,

    #[serde(default = "default_true")]
    pub log_to_console: bool,

    #[serde(default)]
    pub log_to_file: bool,

    #[serde(default)]
    pub log_path: Option<PathBuf>,

    #[serde(default)]
    pub modules_level: HashMap<String, String>,
}

fn default_filter() -> String {
    "info".to_owned()
}

fn default_true() -> bool {
    true
}

impl Default for LoggerConfig {
    fn default() -> Self {
        LoggerConfig {
            filter:         default_filter(),
            log_to_console: true,
            log_to_file:    false,
            log_path:       None,
            modules_level:  HashMap::new(),
        }
    }
}

/// The root document (§4.I). Retains unrecognized keys in `extra` so the
/// `ethereum-finality-blocks-component` key (and anything else out of this
/// node's scope) survives a round trip without this loader ever inspecting
/// it.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct RootConfig {
    pub node_address: String,
    pub node_private_key: String,

    pub gossip:    GossipConfig,
    pub storage:   StorageConfig,
    pub sync:      SyncConfig,
    pub mempool:   MempoolConfig,
    pub consensus: ConsensusConfig,

    #[serde(default)]
    pub logger: LoggerConfig,

    #[serde(flatten)]
    pub extra: HashMap<String, Value>,
}

impl RootConfig {
    pub fn node_address(&self) -> Result<NodeAddress, ConfigError> {
        hex_to_node_address(&self.node_address)
    }
}
