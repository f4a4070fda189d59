use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use common_crypto::Hash;
use parking_lot::Mutex;
use protocol::types::{SignedTransaction, TimestampNano};
use tokio::sync::watch;

struct Entry {
    tx:          SignedTransaction,
    size_bytes:  u64,
    arrived_at:  TimestampNano,
}

/// Arrival-ordered pending pool, bounded in bytes (§4.D). `version` bumps on
/// every insert so callers blocked in `GetTransactionsForOrdering` can wake
/// as soon as something new lands, without polling.
pub struct PendingPool {
    order:       Mutex<VecDeque<Hash>>,
    entries:     Mutex<HashMap<Hash, Entry>>,
    total_bytes: Mutex<u64>,
    max_bytes:   u64,
    version:     AtomicU64,
    version_tx:  watch::Sender<u64>,
    version_rx:  watch::Receiver<u64>,
}

impl PendingPool {
    pub fn new(max_bytes: u64) -> Self {
        let (version_tx, version_rx) = watch::channel(0);
        PendingPool {
            order: Mutex::new(VecDeque::new()),
            entries: Mutex::new(HashMap::new()),
            total_bytes: Mutex::new(0),
            max_bytes,
            version: AtomicU64::new(0),
            version_tx,
            version_rx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version_rx.clone()
    }

    pub fn contains(&self, fingerprint: &Hash) -> bool {
        self.entries.lock().contains_key(fingerprint)
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Inserts `tx` if it isn't already present and the pool has room.
    /// Returns `false` on duplicate, `true` on a fresh insert; callers
    /// needing the "pool full" distinction should check `would_fit` first.
    pub fn would_fit(&self, size_bytes: u64) -> bool {
        *self.total_bytes.lock() + size_bytes <= self.max_bytes
    }

    pub fn insert(&self, tx: SignedTransaction, arrived_at: TimestampNano) -> bool {
        let fingerprint = tx.fingerprint();
        let size_bytes = (tx.payload.canonical_bytes().len() + tx.signature.len()) as u64;

        let mut entries = self.entries.lock();
        if entries.contains_key(&fingerprint) {
            return false;
        }
        let mut total = self.total_bytes.lock();
        if *total + size_bytes > self.max_bytes {
            return false;
        }
        *total += size_bytes;
        entries.insert(fingerprint, Entry { tx, size_bytes, arrived_at });
        drop(entries);
        drop(total);

        self.order.lock().push_back(fingerprint);
        let next = self.version.fetch_add(1, Ordering::SeqCst) + 1;
        let _ = self.version_tx.broadcast(next);
        true
    }

    pub fn remove(&self, fingerprint: &Hash) -> Option<SignedTransaction> {
        let removed = self.entries.lock().remove(fingerprint);
        if let Some(entry) = &removed {
            *self.total_bytes.lock() -= entry.size_bytes;
            self.order.lock().retain(|h| h != fingerprint);
        }
        removed.map(|entry| entry.tx)
    }

    /// Returns up to `max` transactions in arrival order, skipping any whose
    /// fingerprint fails `is_excluded` (the caller's committed-pool check).
    pub fn select_ordered(&self, max: usize, is_excluded: impl Fn(&Hash) -> bool) -> Vec<SignedTransaction> {
        let order = self.order.lock();
        let entries = self.entries.lock();
        let mut selected = Vec::with_capacity(max.min(order.len()));
        for fingerprint in order.iter() {
            if selected.len() >= max {
                break;
            }
            if is_excluded(fingerprint) {
                continue;
            }
            if let Some(entry) = entries.get(fingerprint) {
                selected.push(entry.tx.clone());
            }
        }
        selected
    }

    /// Removes every pending entry older than `now - window`, returning the
    /// fingerprints evicted so the caller can notify handlers of `EXPIRED`.
    pub fn sweep_expired(&self, now: TimestampNano, window_nanos: u64) -> Vec<Hash> {
        let cutoff = now.saturating_sub(window_nanos);
        let expired: Vec<Hash> = self
            .entries
            .lock()
            .iter()
            .filter(|(_, entry)| entry.arrived_at < cutoff)
            .map(|(fingerprint, _)| *fingerprint)
            .collect();
        for fingerprint in &expired {
            self.remove(fingerprint);
        }
        expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use protocol::types::TransactionPayload;

    fn tx(nonce: u8) -> SignedTransaction {
        SignedTransaction {
            payload: TransactionPayload {
                protocol_version: 1,
                chain_id: 1,
                timestamp: 1,
                expiry: 1_000_000,
                signer_pubkey: Bytes::from_static(b"pubkey"),
                contract_name: "token".into(),
                method_name: "transfer".into(),
                input_args: vec![Bytes::copy_from_slice(&[nonce])],
            },
            signature: Bytes::from_static(b"sig"),
        }
    }

    #[test]
    fn rejects_duplicate_insert() {
        let pool = PendingPool::new(1 << 20);
        assert!(pool.insert(tx(1), 1));
        assert!(!pool.insert(tx(1), 2));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn rejects_when_over_byte_budget() {
        let pool = PendingPool::new(1);
        assert!(!pool.insert(tx(1), 1));
        assert_eq!(pool.len(), 0);
    }

    #[test]
    fn select_ordered_respects_arrival_order_and_max() {
        let pool = PendingPool::new(1 << 20);
        pool.insert(tx(1), 1);
        pool.insert(tx(2), 2);
        pool.insert(tx(3), 3);

        let selected = pool.select_ordered(2, |_| false);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0], tx(1));
        assert_eq!(selected[1], tx(2));
    }

    #[test]
    fn select_ordered_skips_excluded_fingerprints() {
        let pool = PendingPool::new(1 << 20);
        pool.insert(tx(1), 1);
        pool.insert(tx(2), 2);
        let excluded = tx(1).fingerprint();

        let selected = pool.select_ordered(10, |fp| *fp == excluded);
        assert_eq!(selected, vec![tx(2)]);
    }

    #[test]
    fn sweep_expired_removes_old_entries_only() {
        let pool = PendingPool::new(1 << 20);
        pool.insert(tx(1), 100);
        pool.insert(tx(2), 900);

        let expired = pool.sweep_expired(1_000, 500);
        assert_eq!(expired.len(), 1);
        assert!(!pool.contains(&tx(1).fingerprint()));
        assert!(pool.contains(&tx(2).fingerprint()));
    }
}
