mod adapter;
mod notify;

use std::sync::Arc;

use common_config::{ActiveConsensusAlgo, RootConfig};
use common_crypto::{NodeAddress, PrivateKey};
use common_logger::{LogMetrics, Metrics};
use core_consensus::{register_benchmark_listener, BenchmarkConfig, BenchmarkConsensus, ConsensusContextConfig, ConsensusContextImpl};
use core_mempool::{MempoolConfig as TxPoolConfig, TxPool};
use core_state::InMemoryStateStorage;
use core_storage::sync::SyncConfig;
use core_storage::BlockFileStorage;
use core_vm::{ContractRegistry, Vm};
use protocol::shutdown::CancellationToken;
use protocol::traits::{
    BlockStorage, ConsensusAlgorithm, ConsensusContext, Gossip, MemPool, MemPoolAdapter, NodeInfo,
    StateStorage, VirtualMachine,
};
use protocol::{ProtocolError, ProtocolErrorKind, ProtocolResult};

use crate::adapter::{GenesisCommitteeSource, NetworkMempoolAdapter};
use crate::notify::CommitNotifier;

fn config_err(error: common_config::ConfigError) -> ProtocolError {
    ProtocolError::new(ProtocolErrorKind::Config, Box::new(error))
}

fn runtime_err(error: std::io::Error) -> ProtocolError {
    ProtocolError::new(ProtocolErrorKind::Network, Box::new(error))
}

/// Owns every long-lived piece of a running node and the bootstrap sequence
/// of §4.K: storage and state are opened eagerly so a bad data directory
/// fails before any task is spawned; everything that needs a tokio runtime
/// (sweepers, the sync driver, the consensus round, the commit fan-out) is
/// built and spawned once [`run`](Self::run) enters one.
pub struct Node {
    config:        RootConfig,
    node_address:  NodeAddress,
    signing_key:   Arc<PrivateKey>,
    storage:       Arc<dyn BlockStorage>,
    state:         Arc<dyn StateStorage>,
    network:       Arc<core_network::NetworkService>,
    metrics:       Arc<dyn Metrics>,
}

impl Node {
    pub fn new(config: RootConfig) -> ProtocolResult<Self> {
        let node_address = config.node_address().map_err(config_err)?;
        let key_bytes = hex::decode(config.node_private_key.trim_start_matches("0x"))
            .map_err(|_| config_err(common_config::ConfigError::InvalidHex(config.node_private_key.clone())))?;
        let signing_key = Arc::new(
            PrivateKey::from_bytes(&key_bytes)
                .map_err(|err| ProtocolError::new(ProtocolErrorKind::Config, Box::new(err)))?,
        );

        let block_file = config.storage.data_dir.join("blocks.dat");
        let storage = Arc::new(BlockFileStorage::open(
            &block_file,
            config.storage.block_storage_file_system_max_block_size_in_bytes,
            config.storage.max_protocol_version,
        )?) as Arc<dyn BlockStorage>;
        let state = Arc::new(InMemoryStateStorage::new()) as Arc<dyn StateStorage>;

        let metrics = Arc::new(LogMetrics) as Arc<dyn Metrics>;
        let network = core_network::NetworkService::new(node_address, config.gossip.clone(), Arc::clone(&metrics))?;

        Ok(Node { config, node_address, signing_key, storage, state, network, metrics })
    }

    /// Blocks until a shutdown signal is observed, then cooperatively tears
    /// every spawned task down.
    pub fn run(self) -> ProtocolResult<()> {
        let mut runtime = tokio::runtime::Runtime::new().map_err(runtime_err)?;
        runtime.block_on(self.run_async())
    }

    async fn run_async(self) -> ProtocolResult<()> {
        let shutdown = CancellationToken::new();

        let vm = Arc::new(Vm::new(Arc::clone(&self.storage), Arc::clone(&self.state), ContractRegistry::new()))
            as Arc<dyn VirtualMachine>;

        let mempool_adapter = NetworkMempoolAdapter::new(Arc::clone(&self.network));
        let mempool_config = TxPoolConfig {
            max_protocol_version: self.config.storage.max_protocol_version,
            chain_id: self.config.consensus.virtual_chain_id,
            pending_pool_size_in_bytes: self.config.mempool.transaction_pool_pending_pool_size_in_bytes,
            max_number_of_transactions: self.config.mempool.max_number_of_transactions,
            time_between_empty_blocks: self.config.mempool.transaction_pool_time_between_empty_blocks,
            transaction_expiration_window: self.config.mempool.transaction_expiration_window,
            future_timestamp_grace_timeout: self.config.mempool.transaction_pool_future_timestamp_grace_timeout,
            node_sync_reject_time: self.config.mempool.transaction_pool_node_sync_reject_time,
            admission_concurrency: self.config.mempool.admission_concurrency,
        };
        let mempool = TxPool::new(mempool_config, Arc::clone(&mempool_adapter) as Arc<dyn MemPoolAdapter>);
        mempool_adapter.set_mempool(&mempool);
        mempool_adapter.register_listener();
        mempool.spawn_sweepers(
            self.config.mempool.transaction_pool_pending_pool_clear_expired_interval,
            self.config.mempool.transaction_pool_committed_pool_clear_expired_interval,
            shutdown.clone(),
        );

        let sync_config = SyncConfig {
            no_commit_interval: self.config.sync.block_sync_no_commit_interval,
            collect_response_timeout: self.config.sync.block_sync_collect_response_timeout,
            collect_chunks_timeout: self.config.sync.block_sync_collect_chunks_timeout,
            num_blocks_in_batch: self.config.sync.block_sync_num_blocks_in_batch,
            reference_max_allowed_distance: self.config.sync.block_sync_reference_max_allowed_distance,
            descending: self.config.sync.block_sync_descending_activation_time.is_some(),
        };
        let sync_events = adapter::spawn_sync_driver(
            Arc::clone(&self.network),
            self.node_address,
            Arc::clone(&self.storage),
            sync_config,
            shutdown.clone(),
            Arc::clone(&self.metrics),
        );

        let notifying_storage =
            CommitNotifier::new(Arc::clone(&self.storage), Arc::clone(&mempool), sync_events) as Arc<dyn BlockStorage>;

        let genesis_validators = self.config.consensus.genesis_validators().map_err(config_err)?;
        let committee_source = Arc::new(GenesisCommitteeSource::new(genesis_validators))
            as Arc<dyn core_consensus::CommitteeSource>;

        let node_info = NodeInfo { node_address: self.node_address, chain_id: self.config.consensus.virtual_chain_id };
        let context_config = ConsensusContextConfig {
            protocol_version: self.config.storage.max_protocol_version,
            min_committee_size: self.config.consensus.lean_helix_consensus_minimum_committee_size,
            max_committee_size: self.config.consensus.lean_helix_consensus_maximum_committee_size,
            max_transactions_in_block: self.config.consensus.consensus_context_maximum_transactions_in_block,
            system_timestamp_allowed_jitter: self.config.consensus.consensus_context_system_timestamp_allowed_jitter,
        };
        let context = Arc::new(ConsensusContextImpl::new(
            node_info,
            context_config,
            committee_source,
            Arc::clone(&mempool) as Arc<dyn MemPool>,
            Arc::clone(&notifying_storage),
            vm,
        )) as Arc<dyn ConsensusContext>;

        let consensus: Arc<dyn ConsensusAlgorithm> = match self.config.consensus.active_consensus_algo {
            ActiveConsensusAlgo::Benchmark => {
                let constant_leader = self.config.consensus.benchmark_constant_leader().map_err(config_err)?;
                let benchmark_config = BenchmarkConfig {
                    node_address: self.node_address,
                    signing_key: Arc::clone(&self.signing_key),
                    constant_leader,
                    retry_interval: self.config.consensus.benchmark_consensus_retry_interval,
                    required_quorum_percentage: self.config.consensus.benchmark_consensus_required_quorum_percentage,
                };
                let benchmark = BenchmarkConsensus::new(
                    benchmark_config,
                    Arc::clone(&context),
                    Arc::clone(&notifying_storage),
                    Arc::clone(&self.network) as Arc<dyn Gossip>,
                    Arc::clone(&self.metrics),
                );
                register_benchmark_listener(Arc::clone(&benchmark), self.network.as_ref());
                benchmark as Arc<dyn ConsensusAlgorithm>
            }
            ActiveConsensusAlgo::Bft => {
                // The pluggable BFT engine (§4.G) is an external collaborator:
                // `core-consensus` provides the host/engine seam
                // (`BftHostImpl`, `BftConsensus`) for whatever concrete
                // `BftEngine` gets linked in, but this build links none, so
                // selecting this algorithm fails fast instead of silently
                // falling back to benchmark consensus.
                return Err(ProtocolError::new(
                    ProtocolErrorKind::Consensus,
                    Box::new(std::io::Error::new(
                        std::io::ErrorKind::Other,
                        "no pluggable BFT engine is linked into this build",
                    )),
                ));
            }
        };

        self.network.run(shutdown.clone());

        let consensus_task = {
            let consensus = Arc::clone(&consensus);
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = shutdown.cancelled() => Ok(()),
                    result = consensus.run() => result,
                }
            })
        };

        wait_for_shutdown_signal().await;
        log::info!(target: "run", "shutdown signal received, tearing down");
        shutdown.cancel();

        match consensus_task.await {
            Ok(result) => result,
            Err(err) => Err(ProtocolError::new(ProtocolErrorKind::Consensus, Box::new(err))),
        }
    }
}

/// Blocks until SIGINT/SIGTERM (or, on Windows, Ctrl-C) is observed.
#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(stream) => stream,
        Err(err) => {
            log::error!(target: "run", "failed to install SIGINT handler: {}", err);
            return;
        }
    };
    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(stream) => stream,
        Err(err) => {
            log::error!(target: "run", "failed to install SIGTERM handler: {}", err);
            return;
        }
    };
    tokio::select! {
        _ = sigint.recv() => {}
        _ = sigterm.recv() => {}
    }
}

#[cfg(windows)]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
