//! # Bounded retry executor.
//!
//! [`RetryPolicy`] runs a fallible async operation up to `max_attempts` times,
//! strictly sequentially, sleeping a fixed delay between attempts. Whether a
//! failure is worth another attempt is decided by, in order:
//! 1. the optional condition (`false` stops);
//! 2. the deny-list of error categories (a match stops);
//! 3. the allow-list (when non-empty, a category absent from it stops).
//!
//! Categories are the explicit tags returned by [`Categorized::category`].
//!
//! ## Flow
//! ```text
//! attempt 1 ──► Ok ──────────────────────────► report{success}
//!     │
//!     └─► Err ─► retryable? ── no ───────────► report{failure}
//!                    │
//!                   yes ─► sleep(delay) ─► attempt 2 ─► ... ─► attempt max
//! ```
//!
//! # Example
//! ```rust
//! use consumervisor::{BrokerError, RetryPolicy};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let policy = RetryPolicy::<BrokerError>::new(3)?.deny([BrokerError::BINDING]);
//!
//! let retried = policy
//!     .run(|| async { Err::<(), _>(BrokerError::Binding { reason: "no such consumer".into() }) })
//!     .await;
//!
//! assert_eq!(retried.report.number_of_attempts(), 1);
//! assert!(!retried.report.succeeded());
//! # Ok(())
//! # }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::{select, time};
use tokio_util::sync::CancellationToken;

use crate::error::ConfigError;

/// An error carrying an explicit, directly comparable category tag.
pub trait Categorized {
    /// Returns the stable category of this error (e.g. `"broker_unavailable"`).
    fn category(&self) -> &'static str;
}

type Condition<E> = Arc<dyn Fn(&E) -> bool + Send + Sync>;

/// Bounded retry policy for operations failing with `E`.
pub struct RetryPolicy<E> {
    max_attempts: u32,
    delay: Duration,
    condition: Option<Condition<E>>,
    deny: HashSet<&'static str>,
    allow: HashSet<&'static str>,
}

impl<E> Clone for RetryPolicy<E> {
    fn clone(&self) -> Self {
        Self {
            max_attempts: self.max_attempts,
            delay: self.delay,
            condition: self.condition.clone(),
            deny: self.deny.clone(),
            allow: self.allow.clone(),
        }
    }
}

impl<E> fmt::Debug for RetryPolicy<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_attempts", &self.max_attempts)
            .field("delay", &self.delay)
            .field("condition", &self.condition.is_some())
            .field("deny", &self.deny)
            .field("allow", &self.allow)
            .finish()
    }
}

impl<E> Default for RetryPolicy<E> {
    /// A single attempt, no delay, every category retryable.
    fn default() -> Self {
        Self {
            max_attempts: 1,
            delay: Duration::ZERO,
            condition: None,
            deny: HashSet::new(),
            allow: HashSet::new(),
        }
    }
}

impl<E> RetryPolicy<E>
where
    E: Categorized + fmt::Display,
{
    /// Creates a policy allowing up to `max_attempts` attempts.
    ///
    /// Returns [`ConfigError::ZeroAttempts`] when `max_attempts == 0`.
    pub fn new(max_attempts: u32) -> Result<Self, ConfigError> {
        if max_attempts == 0 {
            return Err(ConfigError::ZeroAttempts);
        }
        Ok(Self {
            max_attempts,
            ..Self::default()
        })
    }

    /// Sets the delay slept between two attempts (default: zero).
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Sets a condition over the error; returning `false` stops retrying.
    pub fn with_condition(mut self, f: impl Fn(&E) -> bool + Send + Sync + 'static) -> Self {
        self.condition = Some(Arc::new(f));
        self
    }

    /// Adds categories that are never retried (checked before the allow-list).
    pub fn deny(mut self, categories: impl IntoIterator<Item = &'static str>) -> Self {
        self.deny.extend(categories);
        self
    }

    /// Restricts retries to these categories.
    ///
    /// While the allow-list is empty every category not denied is retryable.
    pub fn allow(mut self, categories: impl IntoIterator<Item = &'static str>) -> Self {
        self.allow.extend(categories);
        self
    }

    /// Returns the configured maximum number of attempts.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Returns the inter-attempt delay.
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Runs `op` until it succeeds, a failure is not retryable, or attempts run out.
    pub async fn run<T, F, Fut>(&self, op: F) -> Retried<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_inner(None, op).await
    }

    /// Like [`run`](Self::run), but cancellation aborts the inter-attempt sleep.
    ///
    /// On cancellation the last failure is returned and no further attempt is made.
    pub async fn run_cancellable<T, F, Fut>(&self, token: &CancellationToken, op: F) -> Retried<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_inner(Some(token), op).await
    }

    async fn run_inner<T, F, Fut>(&self, token: Option<&CancellationToken>, mut op: F) -> Retried<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut report = RetryReport {
            max_attempts: self.max_attempts,
            success: false,
            attempts: Vec::with_capacity(self.max_attempts as usize),
        };

        let mut index = 0;
        loop {
            index += 1;
            let err = match op().await {
                Ok(value) => {
                    report.attempts.push(RetryAttempt { index, error: None });
                    report.success = true;
                    return Retried {
                        report,
                        result: Ok(value),
                    };
                }
                Err(err) => err,
            };
            report.attempts.push(RetryAttempt {
                index,
                error: Some(err.to_string()),
            });

            if index >= self.max_attempts || !self.should_retry(&err) {
                return Retried {
                    report,
                    result: Err(err),
                };
            }

            if !self.delay.is_zero() {
                match token {
                    Some(token) => {
                        let sleep = time::sleep(self.delay);
                        tokio::pin!(sleep);
                        select! {
                            _ = &mut sleep => {}
                            _ = token.cancelled() => {
                                return Retried { report, result: Err(err) };
                            }
                        }
                    }
                    None => time::sleep(self.delay).await,
                }
            } else if token.is_some_and(CancellationToken::is_cancelled) {
                return Retried {
                    report,
                    result: Err(err),
                };
            }
        }
    }

    fn should_retry(&self, err: &E) -> bool {
        if let Some(condition) = &self.condition
            && !condition(err)
        {
            return false;
        }

        let category = err.category();
        if self.deny.contains(category) {
            return false;
        }
        self.allow.is_empty() || self.allow.contains(category)
    }
}

/// One attempt recorded by [`RetryPolicy::run`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryAttempt {
    /// 1-based attempt index.
    pub index: u32,
    /// Error text, `None` for the succeeding attempt.
    pub error: Option<String>,
}

/// Diagnostic summary of a retried operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryReport {
    max_attempts: u32,
    success: bool,
    attempts: Vec<RetryAttempt>,
}

impl RetryReport {
    /// True if the last attempt succeeded.
    pub fn succeeded(&self) -> bool {
        self.success
    }

    /// Number of attempts actually made.
    pub fn number_of_attempts(&self) -> usize {
        self.attempts.len()
    }

    /// Configured maximum number of attempts.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Attempts in execution order.
    pub fn attempts(&self) -> &[RetryAttempt] {
        &self.attempts
    }
}

impl fmt::Display for RetryReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "max_attempts={} success={} attempts=[",
            self.max_attempts, self.success
        )?;
        for (i, attempt) in self.attempts.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            match &attempt.error {
                Some(err) => write!(f, "{}:{err:?}", attempt.index)?,
                None => write!(f, "{}:ok", attempt.index)?,
            }
        }
        f.write_str("]")
    }
}

/// Result of [`RetryPolicy::run`]: the final result plus the attempt report.
#[derive(Debug)]
pub struct Retried<T, E> {
    /// Diagnostic report.
    pub report: RetryReport,
    /// Result of the last attempt.
    pub result: Result<T, E>,
}
