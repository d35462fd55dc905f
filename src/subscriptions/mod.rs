//! # Subscriptions: handlers, messages and definitions.
//!
//! - [`Handler`] - trait for async message handlers
//! - [`HandlerFn`] - closure-backed handler
//! - [`HandlerRef`] - shared reference to a handler (`Arc<dyn Handler>`)
//! - [`Message`], [`HandlerContext`], [`TraceContext`] - what a handler sees
//! - [`SubscriptionDefinition`] - declarative registration input

mod definition;
mod handler;
mod handler_fn;
mod message;

pub use definition::{DEFAULT_MAX_CONCURRENCY, SubscriptionBuilder, SubscriptionDefinition};
pub use handler::{Handler, HandlerRef};
pub use handler_fn::HandlerFn;
pub use message::{
    CORRELATION_HEADER, HandlerContext, Headers, Message, TRACEPARENT_HEADER, TraceContext,
};
