//! Error types used by the consumer runtime, brokers and handlers.
//!
//! - [`ConfigError`] - invalid configuration, reported synchronously at build time.
//! - [`BrokerError`] - failures reported by a [`BrokerClient`](crate::BrokerClient).
//! - [`HandlerError`] - the outcome a message handler reports for one message.
//! - [`RuntimeError`] - failures of the supervisor itself (start/stop/run).
//!
//! Every enum provides `as_label()`, a short stable snake_case tag used for
//! metrics, log fields and retry categories.

use std::time::Duration;
use thiserror::Error;

use crate::policies::Categorized;

/// # Configuration errors.
///
/// Raised by builders and constructors; never produced at runtime.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// One or more required subscription fields are missing or invalid.
    ///
    /// All problems found are reported together.
    #[error("invalid subscription: {}", problems.join("; "))]
    InvalidSubscription {
        /// Human-readable list of problems.
        problems: Vec<String>,
    },

    /// A retry policy was configured with zero attempts.
    #[error("max attempts must be greater than 0")]
    ZeroAttempts,

    /// A slot pool was configured with zero capacity.
    #[error("max concurrency must be greater than 0")]
    ZeroConcurrency,

    /// A runtime duration that must be positive was zero.
    #[error("{field} must be greater than 0")]
    ZeroDuration {
        /// Name of the `Config` field.
        field: &'static str,
    },

    /// Two subscriptions share the same stream/consumer pair.
    #[error("duplicate subscription: stream={stream} consumer={consumer}")]
    DuplicateSubscription {
        /// Stream name.
        stream: String,
        /// Durable consumer name.
        consumer: String,
    },
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::InvalidSubscription { .. } => "config_invalid_subscription",
            ConfigError::ZeroAttempts => "config_zero_attempts",
            ConfigError::ZeroConcurrency => "config_zero_concurrency",
            ConfigError::ZeroDuration { .. } => "config_zero_duration",
            ConfigError::DuplicateSubscription { .. } => "config_duplicate_subscription",
        }
    }
}

/// # Errors reported by a broker client.
///
/// [`BrokerError::Timeout`] is the expected steady-state answer of an idle
/// subscription and is never treated as a failure by the fetch loop.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BrokerError {
    /// No message became available within the fetch timeout.
    #[error("fetch timed out after {timeout:?}")]
    Timeout {
        /// The fetch timeout that elapsed.
        timeout: Duration,
    },

    /// The broker could not be reached.
    #[error("broker unavailable: {reason}")]
    Unavailable {
        /// Underlying reason.
        reason: String,
    },

    /// The stream/consumer binding is invalid (missing consumer, bad filter...).
    #[error("consumer binding failed: {reason}")]
    Binding {
        /// Underlying reason.
        reason: String,
    },

    /// Acknowledging or negatively acknowledging a message failed.
    #[error("acknowledgement failed: {reason}")]
    Ack {
        /// Underlying reason.
        reason: String,
    },

    /// Message metadata (e.g. the enqueue timestamp) is not available.
    #[error("message metadata unavailable: {reason}")]
    Metadata {
        /// Underlying reason.
        reason: String,
    },

    /// The connection has been closed.
    #[error("broker connection closed")]
    Closed,
}

impl BrokerError {
    /// Label of [`BrokerError::Binding`]; used by the default bind retry deny-list.
    pub const BINDING: &'static str = "broker_binding";

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use consumervisor::BrokerError;
    ///
    /// let err = BrokerError::Unavailable { reason: "connection refused".into() };
    /// assert_eq!(err.as_label(), "broker_unavailable");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            BrokerError::Timeout { .. } => "broker_timeout",
            BrokerError::Unavailable { .. } => "broker_unavailable",
            BrokerError::Binding { .. } => Self::BINDING,
            BrokerError::Ack { .. } => "broker_ack",
            BrokerError::Metadata { .. } => "broker_metadata",
            BrokerError::Closed => "broker_closed",
        }
    }

    /// True for [`BrokerError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, BrokerError::Timeout { .. })
    }
}

impl Categorized for BrokerError {
    fn category(&self) -> &'static str {
        self.as_label()
    }
}

/// Kind tag of a [`HandlerError`], compared directly instead of by type identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandlerErrorKind {
    /// Redelivery is likely to succeed later (message is nacked).
    Transient,
    /// Redelivery will not help (message is acked and dropped).
    Fatal,
}

/// # Errors returned by message handlers.
///
/// The variant decides what happens to the message:
/// - [`HandlerError::Transient`] → nack (the broker redelivers it later);
/// - [`HandlerError::Fatal`] → ack anyway, so a poison message is not redelivered forever.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HandlerError {
    /// Temporary failure; the message should be redelivered.
    #[error("transient failure: {reason}")]
    Transient {
        /// The underlying error message.
        reason: String,
    },

    /// Non-recoverable failure; the message is dropped.
    #[error("fatal failure: {reason}")]
    Fatal {
        /// The underlying error message.
        reason: String,
    },
}

impl HandlerError {
    /// Shorthand for [`HandlerError::Transient`].
    pub fn transient(reason: impl Into<String>) -> Self {
        HandlerError::Transient {
            reason: reason.into(),
        }
    }

    /// Shorthand for [`HandlerError::Fatal`].
    pub fn fatal(reason: impl Into<String>) -> Self {
        HandlerError::Fatal {
            reason: reason.into(),
        }
    }

    /// Returns the inspectable kind tag.
    pub fn kind(&self) -> HandlerErrorKind {
        match self {
            HandlerError::Transient { .. } => HandlerErrorKind::Transient,
            HandlerError::Fatal { .. } => HandlerErrorKind::Fatal,
        }
    }

    /// Returns a short stable label (snake_case) for use in logs/metrics.
    ///
    /// # Example
    /// ```
    /// use consumervisor::HandlerError;
    ///
    /// assert_eq!(HandlerError::transient("db busy").as_label(), "handler_transient");
    /// assert_eq!(HandlerError::fatal("bad payload").as_label(), "handler_fatal");
    /// ```
    pub fn as_label(&self) -> &'static str {
        match self {
            HandlerError::Transient { .. } => "handler_transient",
            HandlerError::Fatal { .. } => "handler_fatal",
        }
    }

    /// Returns the underlying reason without the variant prefix.
    pub fn reason(&self) -> &str {
        match self {
            HandlerError::Transient { reason } | HandlerError::Fatal { reason } => reason,
        }
    }

    /// Indicates whether redelivery may succeed.
    pub fn is_transient(&self) -> bool {
        self.kind() == HandlerErrorKind::Transient
    }
}

impl Categorized for HandlerError {
    fn category(&self) -> &'static str {
        self.as_label()
    }
}

/// # Errors produced by the consumer supervisor.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// `start` was called while the subscriptions were already running.
    #[error("consumer supervisor already started")]
    AlreadyStarted,

    /// Stopping did not drain all in-flight messages within the grace period.
    #[error("drain timeout {grace:?} exceeded; busy: {busy:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Subscriptions (as `stream/consumer`) that still had messages in flight.
        busy: Vec<String>,
    },

    /// A subscription stopped because of a fatal broker error.
    #[error("subscription {subscription} failed: {error}")]
    SubscriptionFailed {
        /// Subscription as `stream/consumer`.
        subscription: String,
        /// The broker error that ended it.
        error: BrokerError,
    },

    /// Installing OS signal listeners failed.
    #[error("signal listener failed: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::AlreadyStarted => "runtime_already_started",
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::SubscriptionFailed { .. } => "runtime_subscription_failed",
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_subscription_lists_every_problem() {
        let err = ConfigError::InvalidSubscription {
            problems: vec!["stream is missing".into(), "handler is missing".into()],
        };
        assert_eq!(
            err.to_string(),
            "invalid subscription: stream is missing; handler is missing"
        );
    }

    #[test]
    fn handler_error_kind_is_explicit() {
        assert_eq!(
            HandlerError::transient("x").kind(),
            HandlerErrorKind::Transient
        );
        assert_eq!(HandlerError::fatal("x").kind(), HandlerErrorKind::Fatal);
        assert_eq!(HandlerError::fatal("bad json").reason(), "bad json");
    }

    #[test]
    fn only_timeout_is_timeout() {
        assert!(
            BrokerError::Timeout {
                timeout: Duration::from_millis(5)
            }
            .is_timeout()
        );
        assert!(!BrokerError::Closed.is_timeout());
        assert_eq!(
            BrokerError::Binding { reason: "x".into() }.category(),
            BrokerError::BINDING
        );
    }
}
