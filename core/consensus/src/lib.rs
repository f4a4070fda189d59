mod benchmark;
mod bft;
mod committee;
mod context;
mod error;

pub use benchmark::{
    register as register_benchmark_listener, BenchmarkConfig, BenchmarkConsensus, BenchmarkMessage, Quorum,
    QuorumTally, VoteStatus, BENCHMARK_TOPIC,
};
pub use bft::{BftConsensus, BftEngine, BftHost, BftHostImpl, BlockPairSigner, Ed25519BlockPairSigner};
pub use committee::{apply_committee_order, fisher_yates_order};
pub use context::{CommitteeSource, ConsensusContextConfig, ConsensusContextImpl};
pub use error::ConsensusError;
