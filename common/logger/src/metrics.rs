/// Counters/gauges for pool size, gossip send-queue depth, sync state
/// (§4.J). No specific backend is mandated, so components depend on this
/// trait object rather than a concrete metrics crate, and the default
/// implementation only logs at debug level.
pub trait Metrics: Send + Sync {
    fn gauge(&self, name: &str, value: i64);

    fn counter_inc(&self, name: &str, delta: u64);
}

/// Default, backend-less implementation: every call becomes a debug log
/// line under the `"metrics"` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogMetrics;

impl Metrics for LogMetrics {
    fn gauge(&self, name: &str, value: i64) {
        log::debug!(target: "metrics", "gauge {} = {}", name, value);
    }

    fn counter_inc(&self, name: &str, delta: u64) {
        log::debug!(target: "metrics", "counter {} += {}", name, delta);
    }
}
