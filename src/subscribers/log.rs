//! # LogWriter: events to `tracing`.
//!
//! Forwards every [`Event`] to the `tracing` facade with structured fields.
//! Routine lifecycle events go out at `info`, per-message problems at `warn`
//! and subscription-fatal or shutdown problems at `error`. Install any
//! `tracing` subscriber (e.g. `tracing-subscriber`) to see them.
//!
//! ## Example output (fmt subscriber)
//! ```text
//! INFO  subscription bound stream="ORDERS" consumer="billing" subject="orders.*" attempts=1
//! WARN  handler failed stream="ORDERS" consumer="billing" reason="db busy"
//! WARN  message nacked stream="ORDERS" consumer="billing" reason="db busy"
//! ERROR fetch failed, subscription stopping stream="ORDERS" consumer="billing" reason="..."
//! INFO  drained
//! ```

use async_trait::async_trait;
use tracing::{error, info, warn};

use crate::events::{Event, EventKind};
use crate::subscribers::Subscribe;

/// Event writer subscriber.
#[derive(Default)]
pub struct LogWriter;

impl LogWriter {
    /// Name reported through [`Subscribe::name`].
    pub const NAME: &'static str = "LogWriter";

    /// Construct a new [`LogWriter`].
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for LogWriter {
    async fn on_event(&self, e: &Event) {
        let subject = e.subject.as_deref().unwrap_or("-");
        let stream = e.stream.as_deref().unwrap_or("-");
        let consumer = e.consumer.as_deref().unwrap_or("-");
        let reason = e.reason.as_deref().unwrap_or("");

        match e.kind {
            EventKind::SubscriptionStarting => {
                info!(seq = e.seq, stream, consumer, subject, "subscription starting");
            }
            EventKind::SubscriptionBound => {
                info!(seq = e.seq, stream, consumer, subject, attempts = e.attempt, "subscription bound");
            }
            EventKind::SubscriptionStopped => {
                info!(seq = e.seq, stream, consumer, subject, "subscription stopped");
            }
            EventKind::BindFailed => {
                error!(seq = e.seq, stream, consumer, subject, attempts = e.attempt, reason, "bind failed");
            }
            EventKind::FetchFailed => {
                error!(seq = e.seq, stream, consumer, subject, reason, "fetch failed, subscription stopping");
            }
            EventKind::HandlerFailed => {
                warn!(seq = e.seq, stream, consumer, subject, reason, "handler failed");
            }
            EventKind::HandlerFatal => {
                error!(seq = e.seq, stream, consumer, subject, reason, "handler failed, message dropped");
            }
            EventKind::HandlerPanicked => {
                error!(seq = e.seq, stream, consumer, subject, reason, "handler panicked");
            }
            EventKind::MessageNacked => {
                warn!(seq = e.seq, stream, consumer, subject, reason, "message nacked");
            }
            EventKind::AckFailed => {
                error!(seq = e.seq, stream, consumer, subject, reason, "ack failed");
            }
            EventKind::NackFailed => {
                warn!(seq = e.seq, stream, consumer, subject, reason, "nack failed");
            }
            EventKind::ShutdownRequested => {
                info!(seq = e.seq, reason, "shutdown requested");
            }
            EventKind::Drained => {
                info!(seq = e.seq, "drained");
            }
            EventKind::GraceExceeded => {
                error!(seq = e.seq, grace_ms = e.timeout_ms, busy = reason, "grace exceeded");
            }
            EventKind::SubscriberOverflow => {
                warn!(seq = e.seq, subscriber = e.subscriber, reason, "subscriber overflow");
            }
            EventKind::SubscriberPanicked => {
                error!(seq = e.seq, subscriber = e.subscriber, reason, "subscriber panicked");
            }
        }
    }

    fn name(&self) -> &'static str {
        Self::NAME
    }
}
