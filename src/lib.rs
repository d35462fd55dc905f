//! # consumervisor
//!
//! **Consumervisor** is a bounded-concurrency pull consumer for message brokers
//! with durable consumers (JetStream-style).
//!
//! A fetch loop per subscription pulls one message per free slot, hands it to
//! a dispatcher that runs the user handler under a fault barrier, and settles
//! the message according to what happened: transient failures are nacked for
//! redelivery, everything else (success, fatal error, panic) is acked. Stopping
//! drains every in-flight message before returning.
//!
//! ## Architecture
//! ### Overview
//! ```text
//!   ┌──────────────────────┐   ┌──────────────────────┐
//!   │SubscriptionDefinition│   │SubscriptionDefinition│   ...
//!   │ stream/consumer/subj │   │ stream/consumer/subj │
//!   └──────────┬───────────┘   └──────────┬───────────┘
//!              ▼                          ▼
//! ┌──────────────────────────────────────────────────────────────┐
//! │  ConsumerSupervisor                                          │
//! │  - one SlotPool per subscription (max_concurrency)           │
//! │  - Bus (broadcast events) → SubscriberSet → LogWriter, ...   │
//! │  - MetricsSink (concurrency, lag, processed, errors)         │
//! └──────────┬──────────────────────────┬────────────────────────┘
//!            ▼                          ▼
//!     ┌──────────────┐           ┌──────────────┐
//!     │  FetchLoop   │           │  FetchLoop   │
//!     │ bind, reserve│           │ bind, reserve│
//!     │ fetch_one    │           │ fetch_one    │
//!     └──┬───────┬───┘           └──────┬───────┘
//!        ▼       ▼                      ▼
//!  Dispatcher  Dispatcher    ...   Dispatcher      (≤ max_concurrency live each)
//!     │
//!     ├─► catch_unwind(Handler::handle)
//!     ├─► classify → Outcome → ack | nack   (BrokerClient)
//!     └─► drop(Slot)
//! ```
//!
//! ### Message lifecycle
//! ```text
//! Received ──► Handling ──┬─► Succeeded ─────► Acknowledged ──────────┐
//!                         ├─► FatalFailed ───► Acknowledged ──────────┤
//!                         └─► TransientFailed ► NegativelyAcknowledged┴─► Done (slot released)
//! ```
//!
//! ## Features
//! | Area              | Description                                              | Key types / traits                                   |
//! |-------------------|----------------------------------------------------------|------------------------------------------------------|
//! | **Supervision**   | Start, stop with drain, run until signal or fatal error. | [`ConsumerSupervisor`], [`SupervisorBuilder`]        |
//! | **Subscriptions** | Declarative subscriptions and async handlers.            | [`SubscriptionDefinition`], [`Handler`], [`HandlerFn`] |
//! | **Broker**        | Pluggable pull-consumer client, in-memory broker.        | [`BrokerClient`], [`MemoryBroker`]                   |
//! | **Backpressure**  | Fixed-capacity RAII slots.                               | [`SlotPool`], [`Slot`]                               |
//! | **Policies**      | Bounded retry with category filters, failure classes.    | [`RetryPolicy`], [`Outcome`], [`classify`]           |
//! | **Events**        | Runtime events and subscribers (tracing-backed log).     | [`Event`], [`Subscribe`], [`LogWriter`]              |
//! | **Metrics**       | Labeled gauges, histograms and counters.                 | [`MetricsSink`], [`InMemoryMetrics`]                 |
//! | **Errors**        | Typed errors with stable labels.                         | [`ConfigError`], [`BrokerError`], [`HandlerError`], [`RuntimeError`] |
//! | **Configuration** | Central runtime settings.                                | [`Config`]                                           |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use consumervisor::{
//!     Config, ConsumerSupervisor, FatalShutdown, HandlerContext, HandlerError, HandlerFn,
//!     Headers, MemoryBroker, Message, SubscriptionDefinition,
//! };
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = Arc::new(MemoryBroker::new());
//!     broker.add_consumer("ORDERS", "billing", "orders.*");
//!     broker.publish("orders.created", Headers::new(), b"{\"id\":1}".to_vec());
//!
//!     let billing = SubscriptionDefinition::builder()
//!         .stream("ORDERS")
//!         .consumer("billing")
//!         .subject("orders.*")
//!         .max_concurrency(8)
//!         .handler(HandlerFn::arc(|_ctx: HandlerContext, msg: Message| async move {
//!             if msg.payload().is_empty() {
//!                 return Err(HandlerError::fatal("empty order"));
//!             }
//!             Ok(())
//!         }))
//!         .build()?;
//!
//!     let cfg = Config {
//!         fetch_timeout: Duration::from_millis(50),
//!         ..Config::default()
//!     };
//!     // A LogWriter is included by default; `with_subscribers` adds more.
//!     let sup = ConsumerSupervisor::builder(cfg, broker.clone())
//!         .subscribe(billing)
//!         .build()?;
//!
//!     sup.start(&CancellationToken::new(), Arc::new(|_: FatalShutdown| {}))?;
//!     while broker.acked().is_empty() {
//!         tokio::time::sleep(Duration::from_millis(5)).await;
//!     }
//!     sup.stop().await?;
//!     Ok(())
//! }
//! ```

mod broker;
mod core;
mod error;
mod events;
mod metrics;
mod policies;
mod pool;
mod subscribers;
mod subscriptions;

// ---- Public re-exports ----

pub use broker::{AckHandle, BrokerClient, BrokerRef, ConsumerBinding, MemoryBroker, WorkUnit};
pub use core::{Config, ConsumerSupervisor, FatalCallback, FatalShutdown, SupervisorBuilder};
pub use error::{BrokerError, ConfigError, HandlerError, HandlerErrorKind, RuntimeError};
pub use events::{Bus, Event, EventKind};
pub use metrics::{
    ACK_FAILED, HANDLER_PANIC, InMemoryMetrics, Labels, LagStats, METADATA_UNAVAILABLE, MetricsRef,
    MetricsSink, NACK_FAILED, NoopMetrics, Series,
};
pub use policies::{
    Categorized, Outcome, PANIC_DETAIL, Retried, RetryAttempt, RetryPolicy, RetryReport,
    Settlement, classify, panic_message,
};
pub use pool::{Slot, SlotPool};
pub use subscribers::{LogWriter, Subscribe, SubscriberSet};
pub use subscriptions::{
    CORRELATION_HEADER, DEFAULT_MAX_CONCURRENCY, Handler, HandlerContext, HandlerFn, HandlerRef,
    Headers, Message, SubscriptionBuilder, SubscriptionDefinition, TRACEPARENT_HEADER,
    TraceContext,
};
