//! # Function-backed handler (`HandlerFn`)
//!
//! [`HandlerFn`] wraps a closure `F: Fn(HandlerContext, Message) -> Fut`,
//! producing a fresh future per message. Shared state goes into the closure
//! explicitly (`Arc<...>`).
//!
//! ## Example
//! ```rust
//! use consumervisor::{HandlerContext, HandlerError, HandlerFn, HandlerRef, Message};
//!
//! let h: HandlerRef = HandlerFn::arc(|_ctx: HandlerContext, msg: Message| async move {
//!     if msg.payload().is_empty() {
//!         return Err(HandlerError::transient("payload not ready"));
//!     }
//!     Ok(())
//! });
//! # let _ = h;
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::HandlerError;
use crate::subscriptions::handler::Handler;
use crate::subscriptions::message::{HandlerContext, Message};

/// Function-backed handler implementation.
#[derive(Debug)]
pub struct HandlerFn<F> {
    f: F,
}

impl<F> HandlerFn<F> {
    /// Creates a new function-backed handler.
    pub fn new(f: F) -> Self {
        Self { f }
    }

    /// Creates the handler and returns it as a shared handle.
    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

#[async_trait]
impl<F, Fut> Handler for HandlerFn<F>
where
    F: Fn(HandlerContext, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    async fn handle(&self, ctx: HandlerContext, msg: Message) -> Result<(), HandlerError> {
        (self.f)(ctx, msg).await
    }
}
