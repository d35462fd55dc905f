//! # Runtime events emitted by the consumer supervisor.
//!
//! The [`EventKind`] enum classifies event types across four categories:
//! - **Subscription lifecycle**: binding, fetch loop start/stop, fatal fetch errors
//! - **Message handling**: handler failures and panics, nack, settlement errors
//! - **Shutdown**: stop requested, drained, grace exceeded
//! - **Subscriber health**: panicking or overflowing event subscribers
//!
//! The [`Event`] struct carries the metadata: timestamp, subscription identity
//! (subject, stream, consumer), reason and attempt number.
//!
//! ## Ordering guarantees
//! Each event has a globally unique sequence number (`seq`) that increases monotonically.
//! Use `seq` to restore the exact order when events are delivered out of order.
//!
//! ## Example
//! ```rust
//! use consumervisor::{Event, EventKind};
//!
//! let ev = Event::new(EventKind::HandlerFailed)
//!     .with_names("orders.created", "ORDERS", "billing")
//!     .with_reason("db busy");
//!
//! assert_eq!(ev.kind, EventKind::HandlerFailed);
//! assert_eq!(ev.consumer.as_deref(), Some("billing"));
//! assert_eq!(ev.reason.as_deref(), Some("db busy"));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::broker::ConsumerBinding;

/// Global sequence counter for event ordering.
static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of runtime events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Subscriber events ===
    /// Subscriber panicked during event processing.
    ///
    /// Sets `subscriber`, `reason` (panic message).
    SubscriberPanicked,

    /// Subscriber dropped an event (queue full or worker closed).
    ///
    /// Sets `subscriber`, `reason` ("full" or "closed").
    SubscriberOverflow,

    // === Shutdown events ===
    /// Stop requested (OS signal, fatal subscription error or explicit `stop()`).
    ///
    /// Sets `reason` when the trigger is known.
    ShutdownRequested,

    /// Every in-flight message finished within the grace period.
    Drained,

    /// Grace period exceeded; some subscriptions still had messages in flight.
    ///
    /// Sets `timeout_ms` (grace) and `reason` (busy subscriptions).
    GraceExceeded,

    // === Subscription lifecycle ===
    /// Fetch loop for a subscription is starting (before bind).
    ///
    /// Sets subscription names.
    SubscriptionStarting,

    /// Durable consumer bound; the fetch loop starts pulling.
    ///
    /// Sets subscription names and `attempt` (bind attempts used).
    SubscriptionBound,

    /// Binding failed after every allowed attempt; the subscription is fatal.
    ///
    /// Sets subscription names, `attempt`, `reason`.
    BindFailed,

    /// Non-timeout fetch error; the subscription is fatal.
    ///
    /// Sets subscription names and `reason`.
    FetchFailed,

    /// Fetch loop exited and its in-flight messages have finished.
    ///
    /// Sets subscription names.
    SubscriptionStopped,

    // === Message handling ===
    /// Handler returned a transient error; the message will be nacked.
    ///
    /// Sets subscription names and `reason`.
    HandlerFailed,

    /// Handler returned a fatal error; the message is acked and dropped.
    ///
    /// Sets subscription names and `reason`.
    HandlerFatal,

    /// Handler panicked; the panic was contained.
    ///
    /// Sets subscription names and `reason` (panic message).
    HandlerPanicked,

    /// Message was negatively acknowledged for redelivery.
    ///
    /// Sets subscription names and `reason`.
    MessageNacked,

    /// Acknowledgement failed or timed out.
    ///
    /// Sets subscription names and `reason`.
    AckFailed,

    /// Negative acknowledgement failed or timed out.
    ///
    /// Sets subscription names and `reason`.
    NackFailed,
}

/// Runtime event with optional metadata.
///
/// - `seq`: monotonic global sequence for ordering
/// - `at`: wall-clock timestamp (for logs)
/// - other optional fields are set depending on the [`EventKind`]
#[derive(Clone, Debug)]
pub struct Event {
    /// Globally unique, monotonically increasing sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,

    /// Subject filter of the subscription, if applicable.
    pub subject: Option<Arc<str>>,
    /// Stream name of the subscription, if applicable.
    pub stream: Option<Arc<str>>,
    /// Durable consumer name of the subscription, if applicable.
    pub consumer: Option<Arc<str>>,
    /// Name of the event subscriber (subscriber health events only).
    pub subscriber: Option<&'static str>,
    /// Human-readable reason (errors, overflow details, etc.).
    pub reason: Option<Arc<str>>,
    /// Attempt count (starting from 1).
    pub attempt: Option<u32>,
    /// Timeout in milliseconds (compact).
    pub timeout_ms: Option<u32>,
}

impl Event {
    /// Creates a new event of the given kind with current timestamp and next sequence number.
    pub fn new(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            subject: None,
            stream: None,
            consumer: None,
            subscriber: None,
            reason: None,
            attempt: None,
            timeout_ms: None,
        }
    }

    /// Attaches the identity of a subscription.
    #[inline]
    pub fn with_binding(self, binding: &ConsumerBinding) -> Self {
        self.with_names(
            binding.subject.as_str(),
            binding.stream.as_str(),
            binding.consumer.as_str(),
        )
    }

    /// Attaches subject, stream and consumer names.
    #[inline]
    pub fn with_names(
        mut self,
        subject: impl Into<Arc<str>>,
        stream: impl Into<Arc<str>>,
        consumer: impl Into<Arc<str>>,
    ) -> Self {
        self.subject = Some(subject.into());
        self.stream = Some(stream.into());
        self.consumer = Some(consumer.into());
        self
    }

    /// Attaches a human-readable reason.
    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    /// Attaches an attempt count.
    #[inline]
    pub fn with_attempt(mut self, n: u32) -> Self {
        self.attempt = Some(n);
        self
    }

    /// Attaches a timeout duration (stored as milliseconds).
    #[inline]
    pub fn with_timeout(mut self, d: Duration) -> Self {
        let ms = d.as_millis().min(u128::from(u32::MAX)) as u32;
        self.timeout_ms = Some(ms);
        self
    }

    /// Creates a subscriber overflow event.
    #[inline]
    pub fn subscriber_overflow(subscriber: &'static str, reason: &'static str) -> Self {
        let mut ev = Event::new(EventKind::SubscriberOverflow).with_reason(reason);
        ev.subscriber = Some(subscriber);
        ev
    }

    /// Creates a subscriber panic event.
    #[inline]
    pub fn subscriber_panicked(subscriber: &'static str, info: String) -> Self {
        let mut ev = Event::new(EventKind::SubscriberPanicked).with_reason(info);
        ev.subscriber = Some(subscriber);
        ev
    }

    #[inline]
    pub fn is_subscriber_overflow(&self) -> bool {
        matches!(self.kind, EventKind::SubscriberOverflow)
    }

    /// `stream/consumer` when the event belongs to a subscription.
    pub fn subscription_name(&self) -> Option<String> {
        match (&self.stream, &self.consumer) {
            (Some(stream), Some(consumer)) => Some(format!("{stream}/{consumer}")),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seq_is_monotonic() {
        let a = Event::new(EventKind::Drained);
        let b = Event::new(EventKind::Drained);
        assert!(b.seq > a.seq);
    }

    #[test]
    fn binding_sets_names() {
        let binding = ConsumerBinding {
            stream: "ORDERS".into(),
            consumer: "billing".into(),
            subject: "orders.*".into(),
        };
        let ev = Event::new(EventKind::SubscriptionBound)
            .with_binding(&binding)
            .with_attempt(2);

        assert_eq!(ev.subject.as_deref(), Some("orders.*"));
        assert_eq!(ev.subscription_name().as_deref(), Some("ORDERS/billing"));
        assert_eq!(ev.attempt, Some(2));
    }

    #[test]
    fn subscriber_events_carry_name() {
        let ev = Event::subscriber_overflow("audit", "full");
        assert!(ev.is_subscriber_overflow());
        assert_eq!(ev.subscriber, Some("audit"));
        assert!(ev.subscription_name().is_none());
    }
}
