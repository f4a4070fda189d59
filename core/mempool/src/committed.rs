use std::collections::HashMap;

use common_crypto::Hash;
use parking_lot::RwLock;
use protocol::types::{BlockHeight, TimestampNano};

struct Entry {
    height:    BlockHeight,
    timestamp: TimestampNano,
}

/// Fingerprint -> (height, timestamp), retained for `TransactionExpirationWindow`
/// so `AddNewTransaction` can reject resubmission of an already-committed tx.
#[derive(Default)]
pub struct CommittedPool {
    entries: RwLock<HashMap<Hash, Entry>>,
}

impl CommittedPool {
    pub fn new() -> Self {
        CommittedPool::default()
    }

    pub fn contains(&self, fingerprint: &Hash) -> bool {
        self.entries.read().contains_key(fingerprint)
    }

    pub fn insert(&self, fingerprint: Hash, height: BlockHeight, timestamp: TimestampNano) {
        self.entries.write().insert(fingerprint, Entry { height, timestamp });
    }

    pub fn height_of(&self, fingerprint: &Hash) -> Option<BlockHeight> {
        self.entries.read().get(fingerprint).map(|e| e.height)
    }

    /// Drops entries older than `now - window`, silently (§4.D).
    pub fn sweep_expired(&self, now: TimestampNano, window_nanos: u64) {
        let cutoff = now.saturating_sub(window_nanos);
        self.entries.write().retain(|_, entry| entry.timestamp >= cutoff);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tracks_and_reports_membership() {
        let pool = CommittedPool::new();
        let fp = Hash::ZERO;
        assert!(!pool.contains(&fp));
        pool.insert(fp, 5, 100);
        assert!(pool.contains(&fp));
        assert_eq!(pool.height_of(&fp), Some(5));
    }

    #[test]
    fn sweep_drops_only_expired_entries() {
        let pool = CommittedPool::new();
        pool.insert(Hash::from_bytes([1u8; 32]), 1, 100);
        pool.insert(Hash::from_bytes([2u8; 32]), 2, 900);

        pool.sweep_expired(1_000, 500);

        assert!(!pool.contains(&Hash::from_bytes([1u8; 32])));
        assert!(pool.contains(&Hash::from_bytes([2u8; 32])));
    }
}
