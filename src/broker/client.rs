//! # Broker client abstraction.
//!
//! The consumer core never speaks a wire protocol itself; it drives a
//! [`BrokerClient`] that knows how to bind a durable pull consumer, fetch one
//! message at a time, and settle (ack/nack) it through an opaque [`AckHandle`].
//! Connection management and reconnect policy belong to the client.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;

use crate::error::BrokerError;
use crate::subscriptions::Message;

/// Which durable consumer of which stream to pull from, and its subject filter.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConsumerBinding {
    /// Stream name.
    pub stream: String,
    /// Durable consumer name.
    pub consumer: String,
    /// Subject filter.
    pub subject: String,
}

/// Opaque token used to settle one delivered message.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AckHandle(Arc<str>);

impl AckHandle {
    /// Wraps a broker-specific identifier (reply subject, delivery tag...).
    pub fn new(id: impl Into<Arc<str>>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One fetched message together with its settlement handle.
#[derive(Clone, Debug)]
pub struct WorkUnit {
    /// Message content.
    pub message: Message,
    /// Handle used to ack/nack this delivery.
    pub handle: AckHandle,
}

/// # Pull-consumer broker client.
///
/// Implementations must be safe to share across the fetch loop and every
/// dispatcher of every subscription.
#[async_trait]
pub trait BrokerClient: Send + Sync + 'static {
    /// Binds the durable consumer before the first fetch.
    ///
    /// The default implementation accepts every binding.
    async fn bind(&self, binding: &ConsumerBinding) -> Result<(), BrokerError> {
        let _ = binding;
        Ok(())
    }

    /// Fetches exactly one message, waiting at most `timeout`.
    ///
    /// Must return [`BrokerError::Timeout`] when nothing arrives in time.
    async fn fetch_one(
        &self,
        binding: &ConsumerBinding,
        timeout: Duration,
    ) -> Result<WorkUnit, BrokerError>;

    /// Marks the delivery as processed.
    async fn ack(&self, handle: &AckHandle) -> Result<(), BrokerError>;

    /// Asks the broker to redeliver the message.
    async fn nack(&self, handle: &AckHandle) -> Result<(), BrokerError>;

    /// Time the message was stored by the broker.
    fn enqueued_at(&self, handle: &AckHandle) -> Result<SystemTime, BrokerError>;
}

/// Shared handle to a broker client.
pub type BrokerRef = Arc<dyn BrokerClient>;
