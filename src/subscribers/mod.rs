//! # Event subscribers.
//!
//! ```text
//!   FetchLoop / Dispatcher / Supervisor ── publish(Event) ──► Bus
//!                                                              │
//!                                                  event listener (supervisor)
//!                                                              │
//!                                                        SubscriberSet
//!                                                 ┌────────────┼──────────┐
//!                                                 ▼            ▼          ▼
//!                                             LogWriter     Custom       ...
//! ```
//!
//! - [`Subscribe`] trait for custom subscribers
//! - [`SubscriberSet`] bounded, panic-isolated fan-out
//! - [`LogWriter`] forwards events to `tracing`

mod log;
mod subscribe;
mod subscriber_set;

pub use log::LogWriter;
pub use subscribe::Subscribe;
pub use subscriber_set::SubscriberSet;
