//! # FetchLoop: one long-lived pull loop per subscription.
//!
//! ```text
//!  Starting ──► Binding (RetryPolicy, cancellable) ──x──► BindFailed ──► on_fatal ──► Stopped
//!                  │
//!                  ▼
//!  ┌──► cancelled? ──yes──────────────────────────────────────────────► Stopping
//!  │        │ no
//!  │    concurrency gauge
//!  │    try_acquire slot ──none──► sleep(poll_interval) | cancelled ───┘
//!  │        │ slot
//!  │    fetch_one(fetch_timeout)
//!  │        ├─ Ok(unit)  ──► spawn Dispatcher(unit, slot) ─────────┐
//!  │        ├─ Timeout   ──► drop slot ────────────────────────────┤
//!  │        └─ other err ──► FetchFailed ──► on_fatal ──► Stopping │
//!  └──────────────────────────────────────────────────────────────┘
//!
//!  Stopping ──► pool.await_idle() ──► SubscriptionStopped
//! ```
//!
//! ## Rules
//! - Cancellation is checked before every reservation; a fetch already in
//!   progress is never aborted (the broker bounds it by `fetch_timeout`), and a
//!   unit it returns is still dispatched.
//! - Reserving before fetching means a unit is never fetched without a slot
//!   to run it in.
//! - `on_fatal` is invoked at most once per loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug_span};

use crate::broker::{BrokerRef, ConsumerBinding};
use crate::core::config::Config;
use crate::core::dispatcher::Dispatcher;
use crate::error::{BrokerError, RuntimeError};
use crate::events::{Bus, Event, EventKind};
use crate::metrics::{Labels, MetricsRef};
use crate::policies::RetryPolicy;
use crate::pool::SlotPool;
use crate::subscriptions::SubscriptionDefinition;

/// Report handed to the fatal callback when a subscription cannot continue.
#[derive(Clone, Debug, PartialEq)]
pub struct FatalShutdown {
    /// The subscription that stopped.
    pub binding: ConsumerBinding,
    /// What stopped it.
    pub error: BrokerError,
}

impl FatalShutdown {
    /// `stream/consumer` of the failed subscription.
    pub fn subscription(&self) -> String {
        format!("{}/{}", self.binding.stream, self.binding.consumer)
    }
}

impl From<FatalShutdown> for RuntimeError {
    fn from(fatal: FatalShutdown) -> Self {
        RuntimeError::SubscriptionFailed {
            subscription: fatal.subscription(),
            error: fatal.error,
        }
    }
}

/// Callback invoked when a subscription hits an unrecoverable broker error.
pub type FatalCallback = Arc<dyn Fn(FatalShutdown) + Send + Sync>;

pub(crate) struct FetchLoop {
    binding: ConsumerBinding,
    labels: Labels,
    pool: SlotPool,
    broker: BrokerRef,
    metrics: MetricsRef,
    bus: Bus,
    dispatcher: Arc<Dispatcher>,
    poll_interval: Duration,
    fetch_timeout: Duration,
    bind_retry: RetryPolicy<BrokerError>,
}

impl FetchLoop {
    pub(crate) fn new(
        def: &SubscriptionDefinition,
        pool: SlotPool,
        broker: BrokerRef,
        metrics: MetricsRef,
        bus: Bus,
        cfg: &Config,
        bind_retry: RetryPolicy<BrokerError>,
    ) -> Self {
        let dispatcher = Dispatcher::new(
            def,
            Arc::clone(&broker),
            Arc::clone(&metrics),
            bus.clone(),
            cfg.ack_timeout,
        );
        Self {
            binding: def.binding().clone(),
            labels: Labels::new(def.subject(), def.consumer()),
            pool,
            broker,
            metrics,
            bus,
            dispatcher: Arc::new(dispatcher),
            poll_interval: def.poll_interval().unwrap_or(cfg.poll_interval),
            fetch_timeout: def.fetch_timeout().unwrap_or(cfg.fetch_timeout),
            bind_retry,
        }
    }

    /// Binds, then pulls until cancelled or a fatal broker error occurs.
    ///
    /// Returns only after every message dispatched by this loop has settled.
    pub(crate) async fn run(self, token: CancellationToken, on_fatal: FatalCallback) {
        self.publish(Event::new(EventKind::SubscriptionStarting));

        if self.bind(&token, &on_fatal).await {
            self.pull(&token, &on_fatal).await;
        }

        self.pool.await_idle().await;
        self.publish(Event::new(EventKind::SubscriptionStopped));
    }

    /// Returns `true` when the loop may start pulling.
    async fn bind(&self, token: &CancellationToken, on_fatal: &FatalCallback) -> bool {
        let broker = &self.broker;
        let binding = &self.binding;
        let retried = self
            .bind_retry
            .run_cancellable(token, move || broker.bind(binding))
            .await;
        let attempts = retried.report.number_of_attempts() as u32;

        match retried.result {
            Ok(()) => {
                self.publish(Event::new(EventKind::SubscriptionBound).with_attempt(attempts));
                true
            }
            Err(_) if token.is_cancelled() => false,
            Err(err) => {
                self.metrics.error_inc(&self.labels, err.as_label());
                self.publish(
                    Event::new(EventKind::BindFailed)
                        .with_attempt(attempts)
                        .with_reason(retried.report.to_string()),
                );
                self.fail(err, on_fatal);
                false
            }
        }
    }

    async fn pull(&self, token: &CancellationToken, on_fatal: &FatalCallback) {
        loop {
            if token.is_cancelled() {
                return;
            }
            self.metrics.concurrency(&self.labels, self.pool.in_use());

            let slot = match self.pool.try_acquire() {
                Some(slot) => slot,
                None => {
                    select! {
                        _ = token.cancelled() => return,
                        _ = time::sleep(self.poll_interval) => {}
                    }
                    continue;
                }
            };

            let fetched = self
                .broker
                .fetch_one(&self.binding, self.fetch_timeout)
                .instrument(debug_span!(
                    "fetch",
                    messaging.source = %self.binding.subject,
                    messaging.source_group = %self.binding.consumer,
                ))
                .await;

            match fetched {
                Ok(unit) => {
                    let dispatcher = Arc::clone(&self.dispatcher);
                    let cancel = token.clone();
                    tokio::spawn(async move {
                        dispatcher.dispatch(unit, slot, cancel).await;
                    });
                }
                Err(err) if err.is_timeout() => drop(slot),
                Err(err) => {
                    drop(slot);
                    self.metrics.error_inc(&self.labels, err.as_label());
                    self.publish(Event::new(EventKind::FetchFailed).with_reason(err.to_string()));
                    self.fail(err, on_fatal);
                    return;
                }
            }
        }
    }

    fn fail(&self, error: BrokerError, on_fatal: &FatalCallback) {
        on_fatal(FatalShutdown {
            binding: self.binding.clone(),
            error,
        });
    }

    fn publish(&self, ev: Event) {
        self.bus.publish(ev.with_binding(&self.binding));
    }
}
