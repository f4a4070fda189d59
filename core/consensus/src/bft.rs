use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use common_crypto::{NodeAddress, PrivateKey};
use protocol::traits::{instance_id, BlockStorage, ConsensusAlgorithm, ConsensusContext};
use protocol::types::{BlockHeight, BlockPair, BlockProof, CommitteeMember, TimestampSeconds, VirtualChainId};
use protocol::ProtocolResult;

/// Signs the opaque quorum certificate the pluggable engine attaches to a
/// committed block pair. The core never interprets `BlockProof::Bft::opaque`
/// itself - only the engine that produced it does.
pub trait BlockPairSigner: Send + Sync {
    fn sign(&self, block_pair: &BlockPair) -> Bytes;
}

pub struct Ed25519BlockPairSigner {
    key: Arc<PrivateKey>,
}

impl Ed25519BlockPairSigner {
    pub fn new(key: Arc<PrivateKey>) -> Self {
        Ed25519BlockPairSigner { key }
    }
}

impl BlockPairSigner for Ed25519BlockPairSigner {
    fn sign(&self, block_pair: &BlockPair) -> Bytes {
        Bytes::from(self.key.sign(block_pair.hash().as_bytes()))
    }
}

/// Everything a pluggable BFT engine needs from the host process to run one
/// chain instance (§4.G): a stable handle, the deterministic committee for a
/// reference time, proposal/validation hooks reusing the shared consensus
/// context, and a way to persist what it commits. The engine implementation
/// itself lives outside this crate - this trait is the whole seam.
#[async_trait]
pub trait BftHost: Send + Sync {
    fn instance_id(&self) -> u64;

    async fn committee(&self, reference_time: TimestampSeconds) -> ProtocolResult<Vec<CommitteeMember>>;

    async fn propose(&self) -> ProtocolResult<BlockPair>;

    async fn validate(&self, block_pair: &BlockPair) -> ProtocolResult<()>;

    fn sign(&self, block_pair: &BlockPair) -> Bytes;

    async fn on_commit(&self, block_pair: BlockPair, proof: BlockProof) -> ProtocolResult<()>;
}

/// Drives a chain instance to completion; supplied by the pluggable engine.
/// The core hands it a `BftHost` and otherwise stays out of the way.
#[async_trait]
pub trait BftEngine: Send + Sync {
    async fn run(&self, host: Arc<dyn BftHost>) -> ProtocolResult<()>;
}

pub struct BftHostImpl {
    network_type:     u16,
    virtual_chain_id: VirtualChainId,
    signer:           Arc<dyn BlockPairSigner>,
    context:          Arc<dyn ConsensusContext>,
    storage:          Arc<dyn BlockStorage>,
    height:           AtomicU64,
}

impl BftHostImpl {
    pub fn new(
        network_type: u16,
        virtual_chain_id: VirtualChainId,
        signer: Arc<dyn BlockPairSigner>,
        context: Arc<dyn ConsensusContext>,
        storage: Arc<dyn BlockStorage>,
    ) -> Arc<Self> {
        Arc::new(BftHostImpl { network_type, virtual_chain_id, signer, context, storage, height: AtomicU64::new(0) })
    }

    pub fn current_height(&self) -> BlockHeight {
        self.height.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BftHost for BftHostImpl {
    fn instance_id(&self) -> u64 {
        instance_id(self.network_type, self.virtual_chain_id)
    }

    async fn committee(&self, reference_time: TimestampSeconds) -> ProtocolResult<Vec<CommitteeMember>> {
        self.context.select_committee(reference_time).await
    }

    async fn propose(&self) -> ProtocolResult<BlockPair> {
        let transactions_block = self.context.request_new_transactions_block().await?;
        let results_block = self.context.request_new_results_block(&transactions_block).await?;
        Ok(BlockPair { transactions_block, results_block })
    }

    async fn validate(&self, block_pair: &BlockPair) -> ProtocolResult<()> {
        self.context.validate_transactions_block(&block_pair.transactions_block).await?;
        self.context
            .validate_results_block(&block_pair.transactions_block, &block_pair.results_block)
            .await
    }

    fn sign(&self, block_pair: &BlockPair) -> Bytes {
        self.signer.sign(block_pair)
    }

    async fn on_commit(&self, mut block_pair: BlockPair, proof: BlockProof) -> ProtocolResult<()> {
        block_pair.transactions_block.block_proof = proof;
        let height = block_pair.height();
        self.storage.commit_block(block_pair).await?;
        self.height.store(height, Ordering::SeqCst);
        Ok(())
    }
}

/// `ConsensusAlgorithm` facade over an opaque engine: `run` just hands the
/// engine its host and waits, `current_height` reads the host's own counter
/// since the engine never reports anything back through its return value.
pub struct BftConsensus {
    engine: Arc<dyn BftEngine>,
    host:   Arc<BftHostImpl>,
}

impl BftConsensus {
    pub fn new(engine: Arc<dyn BftEngine>, host: Arc<BftHostImpl>) -> Self {
        BftConsensus { engine, host }
    }
}

#[async_trait]
impl ConsensusAlgorithm for BftConsensus {
    async fn run(&self) -> ProtocolResult<()> {
        self.engine.run(Arc::clone(&self.host) as Arc<dyn BftHost>).await
    }

    fn current_height(&self) -> BlockHeight {
        self.host.current_height()
    }
}
