//! # Consumer telemetry.
//!
//! Every series is labeled with `{subject, consumer}`:
//!
//! | Series          | Kind      | Reported by                     |
//! |-----------------|-----------|---------------------------------|
//! | `concurrency`   | gauge     | fetch loop, every poll          |
//! | `message_lag`   | histogram | dispatcher, before handling     |
//! | `processed`     | counter   | dispatcher, after handling      |
//! | `errors{kind}`  | counter   | fetch loop and dispatcher       |
//!
//! Error kinds are the `as_label()` strings of the error types plus
//! `handler_panic`, `ack_failed`, `nack_failed` and `metadata_unavailable`.

mod memory;
mod sink;

pub use memory::{InMemoryMetrics, LagStats, Series};
pub use sink::{Labels, MetricsSink, NoopMetrics};

/// Shared handle to a metrics sink.
pub type MetricsRef = std::sync::Arc<dyn MetricsSink>;

/// Error kind: handler panicked.
pub const HANDLER_PANIC: &str = "handler_panic";
/// Error kind: ack failed or timed out.
pub const ACK_FAILED: &str = "ack_failed";
/// Error kind: nack failed or timed out.
pub const NACK_FAILED: &str = "nack_failed";
/// Error kind: enqueue timestamp could not be read.
pub const METADATA_UNAVAILABLE: &str = "metadata_unavailable";
