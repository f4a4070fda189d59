pub use common_crypto::{Hash, NodeAddress};

pub type BlockHeight = u64;
pub type TimestampNano = u64;
pub type TimestampSeconds = u64;
pub type VirtualChainId = u32;
