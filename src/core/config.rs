//! # Global runtime configuration.
//!
//! Provides [`Config`], the settings shared by every subscription of a
//! [`ConsumerSupervisor`](crate::ConsumerSupervisor). Per-subscription
//! overrides (`poll_interval`, `fetch_timeout`) live on the
//! [`SubscriptionDefinition`](crate::SubscriptionDefinition).
//!
//! ## Sentinel values
//! - `grace = 0s` → `stop()` waits for in-flight messages without a deadline

use std::time::Duration;

use crate::error::{BrokerError, ConfigError};
use crate::policies::RetryPolicy;

/// Global configuration for the consumer runtime.
///
/// ## Field semantics
/// - `poll_interval`: sleep between capacity checks while the pool is full
/// - `fetch_timeout`: upper bound of one `fetch_one` call
/// - `ack_timeout`: upper bound of one ack/nack call
/// - `grace`: drain deadline on stop (`0s` = unbounded)
/// - `bus_capacity`: event bus ring buffer size (min 1; clamped by Bus)
/// - `bind_attempts`, `bind_delay`: startup bind retry
///
/// All fields are public. Prefer the helper accessors over sentinel checks.
#[derive(Clone, Debug)]
pub struct Config {
    /// How long a fetch loop sleeps when every slot is taken.
    pub poll_interval: Duration,

    /// Maximum wait of a single fetch; a timeout is not an error.
    pub fetch_timeout: Duration,

    /// Maximum wait of a single ack or nack.
    ///
    /// Exceeding it counts as a settlement failure; the slot is released anyway.
    pub ack_timeout: Duration,

    /// Maximum time `stop()` waits for in-flight messages.
    ///
    /// - `Duration::ZERO` = wait until every pool is idle
    /// - `> 0` = give up and return `RuntimeError::GraceExceeded`
    pub grace: Duration,

    /// Capacity of the event bus broadcast channel ring buffer.
    pub bus_capacity: usize,

    /// Attempts made to bind each durable consumer at startup.
    pub bind_attempts: u32,

    /// Delay between bind attempts.
    pub bind_delay: Duration,
}

impl Config {
    /// Returns the drain deadline as an `Option` (`None` = unbounded).
    #[inline]
    pub fn grace_limit(&self) -> Option<Duration> {
        if self.grace.is_zero() {
            None
        } else {
            Some(self.grace)
        }
    }

    /// Returns a bus capacity clamped to a minimum of 1.
    #[inline]
    pub fn bus_capacity_clamped(&self) -> usize {
        self.bus_capacity.max(1)
    }

    /// Builds the retry policy used to bind consumers at startup.
    ///
    /// A [`BrokerError::Binding`] (consumer missing or misconfigured) is not retried.
    pub fn bind_retry(&self) -> Result<RetryPolicy<BrokerError>, ConfigError> {
        Ok(RetryPolicy::new(self.bind_attempts)?
            .with_delay(self.bind_delay)
            .deny([BrokerError::BINDING]))
    }

    /// Checks that every duration the fetch path depends on is positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let required = [
            ("poll_interval", self.poll_interval),
            ("fetch_timeout", self.fetch_timeout),
            ("ack_timeout", self.ack_timeout),
        ];
        if let Some((field, _)) = required.iter().find(|(_, d)| d.is_zero()) {
            return Err(ConfigError::ZeroDuration { field: *field });
        }
        self.bind_retry().map(|_| ())
    }
}

impl Default for Config {
    /// Default configuration:
    ///
    /// - `poll_interval = 10ms`
    /// - `fetch_timeout = 5s`
    /// - `ack_timeout = 5s`
    /// - `grace = 0s` (wait for every in-flight message)
    /// - `bus_capacity = 1024`
    /// - `bind_attempts = 3`, `bind_delay = 500ms`
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(10),
            fetch_timeout: Duration::from_secs(5),
            ack_timeout: Duration::from_secs(5),
            grace: Duration::ZERO,
            bus_capacity: 1024,
            bind_attempts: 3,
            bind_delay: Duration::from_millis(500),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = Config::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.grace_limit(), None);
        assert_eq!(cfg.poll_interval, Duration::from_millis(10));
    }

    #[test]
    fn zero_durations_are_rejected() {
        let cfg = Config {
            fetch_timeout: Duration::ZERO,
            ..Config::default()
        };
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::ZeroDuration {
                field: "fetch_timeout"
            })
        );

        let cfg = Config {
            bind_attempts: 0,
            ..Config::default()
        };
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroAttempts));
    }

    #[tokio::test]
    async fn bind_retry_gives_up_on_binding_errors() {
        let cfg = Config {
            bind_delay: Duration::ZERO,
            ..Config::default()
        };
        let policy = cfg.bind_retry().unwrap();

        let out = policy
            .run(|| async {
                Err::<(), _>(BrokerError::Binding {
                    reason: "consumer not found".into(),
                })
            })
            .await;
        assert_eq!(out.report.number_of_attempts(), 1);

        let out = policy
            .run(|| async {
                Err::<(), _>(BrokerError::Unavailable {
                    reason: "no responders".into(),
                })
            })
            .await;
        assert_eq!(out.report.number_of_attempts(), 3);
    }
}
