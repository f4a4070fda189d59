mod consensus;
mod mempool;
mod network;
mod storage;
mod vm;

pub use consensus::{instance_id, ConsensusAlgorithm, ConsensusContext, NodeInfo};
pub use mempool::{MemPool, MemPoolAdapter};
pub use network::{Gossip, MessageHandler};
pub use storage::{BlockStorage, StateStorage};
pub use vm::{QueryResult, VirtualMachine};
