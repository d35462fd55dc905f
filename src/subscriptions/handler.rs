//! # Message handler abstraction.
//!
//! A [`Handler`] processes one [`Message`] and reports a [`HandlerError`] kind
//! that decides between redelivery and drop. Handlers run concurrently (up to
//! the subscription's `max_concurrency`) and must not assume completion order.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::subscriptions::message::{HandlerContext, Message};

/// # Asynchronous message handler.
///
/// # Example
/// ```
/// use async_trait::async_trait;
/// use consumervisor::{Handler, HandlerContext, HandlerError, Message};
///
/// struct Audit;
///
/// #[async_trait]
/// impl Handler for Audit {
///     async fn handle(&self, _ctx: HandlerContext, msg: Message) -> Result<(), HandlerError> {
///         if msg.payload().is_empty() {
///             return Err(HandlerError::fatal("empty payload"));
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    /// Handles one message.
    ///
    /// Return [`HandlerError::Transient`] to have the message redelivered,
    /// [`HandlerError::Fatal`] to drop it. Panics are caught and treated as fatal.
    async fn handle(&self, ctx: HandlerContext, msg: Message) -> Result<(), HandlerError>;
}

/// Shared handle to a handler.
pub type HandlerRef = Arc<dyn Handler>;
