//! # Subscription definition.
//!
//! [`SubscriptionDefinition`] declares one pull subscription: which stream and
//! durable consumer to bind, the subject it filters on, how many messages may
//! be handled at once, and the handler. It is immutable once built and maps to
//! exactly one fetch loop and one slot pool.
//!
//! Build it with [`SubscriptionDefinition::builder`]; `build()` reports every
//! missing field at once.
//!
//! ## Example
//! ```rust
//! use std::time::Duration;
//! use consumervisor::{HandlerContext, HandlerError, HandlerFn, Message, SubscriptionDefinition};
//!
//! let def = SubscriptionDefinition::builder()
//!     .stream("ORDERS")
//!     .consumer("billing")
//!     .subject("orders.created")
//!     .max_concurrency(16)
//!     .poll_interval(Duration::from_millis(5))
//!     .handler(HandlerFn::arc(|_ctx: HandlerContext, _msg: Message| async {
//!         Ok::<_, HandlerError>(())
//!     }))
//!     .build()
//!     .unwrap();
//!
//! assert_eq!(def.max_concurrency(), 16);
//! ```

use std::fmt;
use std::time::Duration;

use crate::broker::ConsumerBinding;
use crate::error::ConfigError;
use crate::subscriptions::handler::HandlerRef;

/// Default number of messages one subscription handles concurrently.
pub const DEFAULT_MAX_CONCURRENCY: usize = 250;

/// Declarative registration of one pull subscription.
#[derive(Clone)]
pub struct SubscriptionDefinition {
    binding: ConsumerBinding,
    max_concurrency: usize,
    handler: HandlerRef,
    poll_interval: Option<Duration>,
    fetch_timeout: Option<Duration>,
}

impl fmt::Debug for SubscriptionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriptionDefinition")
            .field("binding", &self.binding)
            .field("max_concurrency", &self.max_concurrency)
            .field("poll_interval", &self.poll_interval)
            .field("fetch_timeout", &self.fetch_timeout)
            .finish_non_exhaustive()
    }
}

impl SubscriptionDefinition {
    /// Starts building a definition.
    pub fn builder() -> SubscriptionBuilder {
        SubscriptionBuilder::default()
    }

    /// Subject filter.
    pub fn subject(&self) -> &str {
        &self.binding.subject
    }

    /// Stream name.
    pub fn stream(&self) -> &str {
        &self.binding.stream
    }

    /// Durable consumer name.
    pub fn consumer(&self) -> &str {
        &self.binding.consumer
    }

    /// Broker binding (stream, consumer, subject).
    pub fn binding(&self) -> &ConsumerBinding {
        &self.binding
    }

    /// Maximum number of messages handled at once.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// The handler.
    pub fn handler(&self) -> &HandlerRef {
        &self.handler
    }

    /// Per-subscription capacity poll interval, if overridden.
    pub fn poll_interval(&self) -> Option<Duration> {
        self.poll_interval
    }

    /// Per-subscription fetch timeout, if overridden.
    pub fn fetch_timeout(&self) -> Option<Duration> {
        self.fetch_timeout
    }

    /// `stream/consumer`, used in logs and errors.
    pub fn display_name(&self) -> String {
        format!("{}/{}", self.binding.stream, self.binding.consumer)
    }
}

/// Builder for [`SubscriptionDefinition`].
#[derive(Default)]
pub struct SubscriptionBuilder {
    subject: Option<String>,
    stream: Option<String>,
    consumer: Option<String>,
    max_concurrency: Option<usize>,
    handler: Option<HandlerRef>,
    poll_interval: Option<Duration>,
    fetch_timeout: Option<Duration>,
}

impl SubscriptionBuilder {
    /// Sets the subject filter.
    pub fn subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Sets the stream name.
    pub fn stream(mut self, stream: impl Into<String>) -> Self {
        self.stream = Some(stream.into());
        self
    }

    /// Sets the durable consumer name.
    pub fn consumer(mut self, consumer: impl Into<String>) -> Self {
        self.consumer = Some(consumer.into());
        self
    }

    /// Sets the concurrency bound (default [`DEFAULT_MAX_CONCURRENCY`]).
    pub fn max_concurrency(mut self, n: usize) -> Self {
        self.max_concurrency = Some(n);
        self
    }

    /// Sets the handler.
    pub fn handler(mut self, handler: HandlerRef) -> Self {
        self.handler = Some(handler);
        self
    }

    /// Overrides the capacity poll interval for this subscription.
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Overrides the fetch timeout for this subscription.
    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }

    /// Validates and builds the definition.
    ///
    /// Every problem is collected into one [`ConfigError::InvalidSubscription`].
    pub fn build(self) -> Result<SubscriptionDefinition, ConfigError> {
        let mut problems = Vec::new();

        let stream = non_empty(self.stream, "stream", &mut problems);
        let subject = non_empty(self.subject, "subject", &mut problems);
        let consumer = non_empty(self.consumer, "consumer name", &mut problems);
        if self.handler.is_none() {
            problems.push("handler is missing".to_string());
        }
        let max_concurrency = self.max_concurrency.unwrap_or(DEFAULT_MAX_CONCURRENCY);
        if max_concurrency == 0 {
            problems.push("max concurrency must be greater than 0".to_string());
        }
        if self.poll_interval.is_some_and(|d| d.is_zero()) {
            problems.push("poll interval must be greater than 0".to_string());
        }
        if self.fetch_timeout.is_some_and(|d| d.is_zero()) {
            problems.push("fetch timeout must be greater than 0".to_string());
        }

        match (stream, subject, consumer, self.handler) {
            (Some(stream), Some(subject), Some(consumer), Some(handler)) if problems.is_empty() => {
                Ok(SubscriptionDefinition {
                    binding: ConsumerBinding {
                        stream,
                        consumer,
                        subject,
                    },
                    max_concurrency,
                    handler,
                    poll_interval: self.poll_interval,
                    fetch_timeout: self.fetch_timeout,
                })
            }
            _ => Err(ConfigError::InvalidSubscription { problems }),
        }
    }
}

fn non_empty(value: Option<String>, field: &str, problems: &mut Vec<String>) -> Option<String> {
    match value {
        Some(v) if !v.trim().is_empty() => Some(v),
        _ => {
            problems.push(format!("{field} is missing"));
            None
        }
    }
}
