use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use protocol::traits::StateStorage;
use protocol::types::{BlockHeight, ContractStateDiff};
use protocol::ProtocolResult;

type StateKey = (String, Bytes);

/// Height-indexed, snapshotted `(contract, key) -> value` store (§4.H).
/// Every write is recorded against the height it was committed at rather
/// than overwriting in place, so `read_at` can answer "what was this key
/// worth as of an older height" without replaying diffs. Bounded retention
/// is a future concern; every height ever committed is kept here.
#[derive(Default)]
pub struct InMemoryStateStorage {
    history: RwLock<HashMap<StateKey, BTreeMap<BlockHeight, Bytes>>>,
}

impl InMemoryStateStorage {
    pub fn new() -> Self {
        InMemoryStateStorage::default()
    }
}

#[async_trait]
impl StateStorage for InMemoryStateStorage {
    async fn commit_height(&self, height: BlockHeight, diffs: Vec<ContractStateDiff>) -> ProtocolResult<()> {
        let mut history = self.history.write();
        for diff in diffs {
            history
                .entry((diff.contract, diff.key))
                .or_insert_with(BTreeMap::new)
                .insert(height, diff.value);
        }
        Ok(())
    }

    async fn read_at(&self, height: BlockHeight, contract: &str, key: &Bytes) -> ProtocolResult<Option<Bytes>> {
        let history = self.history.read();
        let found = history
            .get(&(contract.to_owned(), key.clone()))
            .and_then(|versions| versions.range(..=height).next_back())
            .map(|(_, value)| value.clone());
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diff(contract: &str, key: &[u8], value: &[u8]) -> ContractStateDiff {
        ContractStateDiff {
            contract: contract.to_owned(),
            key:      Bytes::copy_from_slice(key),
            value:    Bytes::copy_from_slice(value),
        }
    }

    #[tokio::test]
    async fn reads_most_recent_write_at_or_before_height() {
        let store = InMemoryStateStorage::new();
        store
            .commit_height(1, vec![diff("token", b"alice", b"100")])
            .await
            .unwrap();
        store
            .commit_height(5, vec![diff("token", b"alice", b"150")])
            .await
            .unwrap();

        let key = Bytes::from_static(b"alice");
        assert_eq!(
            store.read_at(1, "token", &key).await.unwrap(),
            Some(Bytes::from_static(b"100"))
        );
        assert_eq!(
            store.read_at(3, "token", &key).await.unwrap(),
            Some(Bytes::from_static(b"100"))
        );
        assert_eq!(
            store.read_at(5, "token", &key).await.unwrap(),
            Some(Bytes::from_static(b"150"))
        );
        assert_eq!(
            store.read_at(10, "token", &key).await.unwrap(),
            Some(Bytes::from_static(b"150"))
        );
    }

    #[tokio::test]
    async fn read_before_first_write_is_none() {
        let store = InMemoryStateStorage::new();
        store
            .commit_height(5, vec![diff("token", b"alice", b"100")])
            .await
            .unwrap();

        let key = Bytes::from_static(b"alice");
        assert_eq!(store.read_at(1, "token", &key).await.unwrap(), None);
    }

    #[tokio::test]
    async fn distinct_contracts_do_not_collide_on_same_key() {
        let store = InMemoryStateStorage::new();
        store
            .commit_height(1, vec![diff("token", b"k", b"a"), diff("registry", b"k", b"b")])
            .await
            .unwrap();

        let key = Bytes::from_static(b"k");
        assert_eq!(
            store.read_at(1, "token", &key).await.unwrap(),
            Some(Bytes::from_static(b"a"))
        );
        assert_eq!(
            store.read_at(1, "registry", &key).await.unwrap(),
            Some(Bytes::from_static(b"b"))
        );
    }
}
