//! # Dispatcher: runs the handler for one fetched message and settles it.
//!
//! ```text
//! dispatch(unit, slot)
//!   ├─► message_lag (or metadata_unavailable)
//!   ├─► span "consume" { messaging.source, messaging.source_group, payload size, trace ids }
//!   ├─► catch_unwind(handler.handle(ctx, msg))
//!   │        ├─ Ok(())        → Success
//!   │        ├─ Transient     → HandlerFailed,   errors{handler_transient}
//!   │        ├─ Fatal         → HandlerFatal,    errors{handler_fatal}
//!   │        └─ panic         → HandlerPanicked, errors{handler_panic}
//!   ├─► processed_inc
//!   ├─► ack | nack  (bounded by ack_timeout; failures → event + errors{ack_failed|nack_failed})
//!   └─► slot dropped (released exactly once, whatever happened above)
//! ```
//!
//! Nothing here returns an error: every failure is observed, counted and
//! published, and the dispatch completes.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use futures::FutureExt;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info_span};

use crate::broker::{AckHandle, BrokerRef, ConsumerBinding, WorkUnit};
use crate::events::{Bus, Event, EventKind};
use crate::metrics::{
    ACK_FAILED, HANDLER_PANIC, Labels, METADATA_UNAVAILABLE, MetricsRef, NACK_FAILED,
};
use crate::policies::{Outcome, Settlement, classify, panic_message};
use crate::pool::Slot;
use crate::subscriptions::{HandlerContext, HandlerRef, SubscriptionDefinition, TraceContext};

/// Per-subscription message dispatcher, shared by every in-flight message.
pub(crate) struct Dispatcher {
    binding: ConsumerBinding,
    labels: Labels,
    consumer: Arc<str>,
    handler: HandlerRef,
    broker: BrokerRef,
    metrics: MetricsRef,
    bus: Bus,
    ack_timeout: Duration,
}

impl Dispatcher {
    pub(crate) fn new(
        def: &SubscriptionDefinition,
        broker: BrokerRef,
        metrics: MetricsRef,
        bus: Bus,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            binding: def.binding().clone(),
            labels: Labels::new(def.subject(), def.consumer()),
            consumer: Arc::from(def.consumer()),
            handler: Arc::clone(def.handler()),
            broker,
            metrics,
            bus,
            ack_timeout,
        }
    }

    /// Handles and settles one message, holding `slot` until the very end.
    pub(crate) async fn dispatch(
        &self,
        unit: WorkUnit,
        slot: Slot,
        cancel: CancellationToken,
    ) -> Outcome {
        let _slot = slot;
        let WorkUnit { message, handle } = unit;
        self.record_lag(&handle);

        let trace = TraceContext::from_message(&message);
        let span = info_span!(
            "consume",
            messaging.source = %message.subject(),
            messaging.source_group = %self.consumer,
            messaging.message.payload_size = message.payload().len(),
            trace_id = trace.trace_id.as_deref(),
            correlation_id = trace.correlation_id.as_deref(),
            outcome = tracing::field::Empty,
        );

        let ctx = HandlerContext {
            cancel,
            trace,
            consumer: Arc::clone(&self.consumer),
        };
        let handler = Arc::clone(&self.handler);
        let result = AssertUnwindSafe(async move { handler.handle(ctx, message).await })
            .catch_unwind()
            .instrument(span.clone())
            .await;

        let failure = match &result {
            Ok(Ok(())) => None,
            Ok(Err(err)) if err.is_transient() => {
                Some((EventKind::HandlerFailed, err.as_label(), err.reason().to_string()))
            }
            Ok(Err(err)) => Some((EventKind::HandlerFatal, err.as_label(), err.reason().to_string())),
            Err(panic) => Some((EventKind::HandlerPanicked, HANDLER_PANIC, panic_message(&**panic))),
        };
        let outcome = classify(result);

        self.metrics.processed_inc(&self.labels);
        if let Some((kind, label, reason)) = failure {
            span.record("outcome", label);
            self.metrics.error_inc(&self.labels, label);
            self.publish(Event::new(kind).with_reason(reason));
        } else {
            span.record("outcome", "success");
        }

        self.settle(&handle, &outcome).instrument(span).await;
        outcome
    }

    fn record_lag(&self, handle: &AckHandle) {
        match self.broker.enqueued_at(handle) {
            Ok(enqueued) => {
                let lag = SystemTime::now()
                    .duration_since(enqueued)
                    .unwrap_or_default();
                self.metrics.message_lag(&self.labels, lag);
            }
            Err(_) => self.metrics.error_inc(&self.labels, METADATA_UNAVAILABLE),
        }
    }

    async fn settle(&self, handle: &AckHandle, outcome: &Outcome) {
        let settlement = outcome.settlement();
        let (res, failed_kind, failed_label) = match settlement {
            Settlement::Ack => (
                time::timeout(self.ack_timeout, self.broker.ack(handle)).await,
                EventKind::AckFailed,
                ACK_FAILED,
            ),
            Settlement::Nack => (
                time::timeout(self.ack_timeout, self.broker.nack(handle)).await,
                EventKind::NackFailed,
                NACK_FAILED,
            ),
        };

        let reason = match res {
            Ok(Ok(())) => {
                if settlement == Settlement::Nack {
                    let detail = outcome.detail().unwrap_or_default().to_string();
                    self.publish(Event::new(EventKind::MessageNacked).with_reason(detail));
                }
                return;
            }
            Ok(Err(err)) => err.to_string(),
            Err(_elapsed) => format!("timed out after {:?}", self.ack_timeout),
        };
        self.metrics.error_inc(&self.labels, failed_label);
        self.publish(Event::new(failed_kind).with_reason(reason));
    }

    fn publish(&self, ev: Event) {
        self.bus.publish(ev.with_binding(&self.binding));
    }
}
