//! Retry and failure-classification policies.
//!
//! ## Contents
//! - [`RetryPolicy`] bounded sequential retries with category allow/deny lists
//! - [`classify`] maps a handler result (or recovered panic) to an [`Outcome`]
//! - [`Settlement`] ack or nack, derived from the [`Outcome`]
//!
//! ## Quick wiring
//! ```text
//! Config::bind_retry() ─► RetryPolicy<BrokerError> ─► FetchLoop startup (bind)
//! Dispatcher ─► catch_unwind(handler) ─► classify() ─► Outcome::settlement() ─► ack/nack
//! ```

mod classify;
mod retry;

pub use classify::{Outcome, PANIC_DETAIL, Settlement, classify, panic_message};
pub use retry::{Categorized, Retried, RetryAttempt, RetryPolicy, RetryReport};
