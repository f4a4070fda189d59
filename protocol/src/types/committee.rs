use common_crypto::NodeAddress;
use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitteeMember {
    pub address: NodeAddress,
    pub weight:  u64,
}
