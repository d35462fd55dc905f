use std::sync::Arc;
use std::time::Duration;

/// Label set attached to every consumer metric.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Labels {
    /// Subject filter of the subscription.
    pub subject: Arc<str>,
    /// Durable consumer name.
    pub consumer: Arc<str>,
}

impl Labels {
    pub fn new(subject: impl Into<Arc<str>>, consumer: impl Into<Arc<str>>) -> Self {
        Self {
            subject: subject.into(),
            consumer: consumer.into(),
        }
    }
}

/// Destination for consumer telemetry.
///
/// Called synchronously from fetch loops and dispatchers; implementations must
/// be cheap and must not block.
pub trait MetricsSink: Send + Sync + 'static {
    /// Gauge: slots currently in use, reported on every poll iteration.
    fn concurrency(&self, labels: &Labels, in_use: usize);

    /// Histogram: time between broker enqueue and the start of handling.
    fn message_lag(&self, labels: &Labels, lag: Duration);

    /// Counter: messages that went through the handler (any outcome).
    fn processed_inc(&self, labels: &Labels);

    /// Counter: failures, keyed by a stable category label.
    fn error_inc(&self, labels: &Labels, kind: &'static str);
}

/// Sink that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopMetrics;

impl MetricsSink for NoopMetrics {
    fn concurrency(&self, _labels: &Labels, _in_use: usize) {}
    fn message_lag(&self, _labels: &Labels, _lag: Duration) {}
    fn processed_inc(&self, _labels: &Labels) {}
    fn error_inc(&self, _labels: &Labels, _kind: &'static str) {}
}
