use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use common_logger::Metrics;
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// Per-peer outgoing queue (§4.B): unbounded logically, but capped at
/// `capacity` with drop-oldest eviction so one slow peer can't grow memory
/// without bound. Overflow is surfaced as a metric, never as an error.
pub struct SendQueue {
    inner:    Mutex<VecDeque<Vec<Bytes>>>,
    capacity: usize,
    wake_tx:  mpsc::Sender<()>,
    name:     String,
    metrics:  Arc<dyn Metrics>,
}

/// The consuming half, owned by the peer's outbound loop task.
pub struct SendQueueConsumer {
    queue:   Arc<SendQueue>,
    wake_rx: mpsc::Receiver<()>,
}

impl SendQueue {
    pub fn new(name: String, capacity: usize, metrics: Arc<dyn Metrics>) -> (Arc<Self>, SendQueueConsumer) {
        let (wake_tx, wake_rx) = mpsc::channel(1);
        let queue = Arc::new(SendQueue {
            inner: Mutex::new(VecDeque::new()),
            capacity,
            wake_tx,
            name,
            metrics,
        });
        let consumer = SendQueueConsumer {
            queue: Arc::clone(&queue),
            wake_rx,
        };
        (queue, consumer)
    }

    pub fn push(&self, payloads: Vec<Bytes>) {
        let mut guard = self.inner.lock();
        if guard.len() >= self.capacity {
            guard.pop_front();
            self.metrics.counter_inc(&format!("gossip.send_queue.dropped.{}", self.name), 1);
        }
        guard.push_back(payloads);
        self.metrics.gauge(&format!("gossip.send_queue.depth.{}", self.name), guard.len() as i64);
        drop(guard);
        let _ = self.wake_tx.clone().try_send(());
    }
}

impl SendQueueConsumer {
    /// Waits for and pops the next queued message. Drains all backlog
    /// before waiting again so a burst of `push` calls doesn't starve the
    /// outbound loop one item at a time.
    pub async fn pop(&mut self) -> Option<Vec<Bytes>> {
        loop {
            if let Some(item) = self.queue.inner.lock().pop_front() {
                return Some(item);
            }
            if self.wake_rx.recv().await.is_none() {
                return None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common_logger::LogMetrics;

    fn item(tag: &'static [u8]) -> Vec<Bytes> {
        vec![Bytes::from_static(tag)]
    }

    #[tokio::test]
    async fn pop_returns_pushed_items_in_order() {
        let (queue, mut consumer) = SendQueue::new("peer".into(), 8, Arc::new(LogMetrics));
        queue.push(item(b"a"));
        queue.push(item(b"b"));
        assert_eq!(consumer.pop().await, Some(item(b"a")));
        assert_eq!(consumer.pop().await, Some(item(b"b")));
    }

    #[tokio::test]
    async fn overflow_drops_oldest() {
        let (queue, mut consumer) = SendQueue::new("peer".into(), 2, Arc::new(LogMetrics));
        queue.push(item(b"a"));
        queue.push(item(b"b"));
        queue.push(item(b"c"));
        assert_eq!(consumer.pop().await, Some(item(b"b")));
        assert_eq!(consumer.pop().await, Some(item(b"c")));
    }
}
