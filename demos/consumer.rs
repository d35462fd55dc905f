//! # Demo: consumer
//!
//! Two subscriptions on an in-memory broker, one flaky handler and one strict one.
//!
//! Shows how to:
//! - Declare subscriptions with [`SubscriptionDefinition::builder`].
//! - Return transient errors (nack, redelivered) and fatal errors (acked, logged).
//! - Attach [`LogWriter`] and read back [`InMemoryMetrics`].
//!
//! ## Flow
//! ```text
//! MemoryBroker.publish() ──► FetchLoop(ORDERS/billing)  ──► Dispatcher ──► ack | nack
//!                        └─► FetchLoop(ORDERS/audit)    ──► Dispatcher ──► ack
//!                                 │
//!                                 └─► Bus ──► LogWriter ──► tracing
//! ```
//!
//! ## Run
//! ```bash
//! RUST_LOG=info cargo run --example consumer
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use consumervisor::{
    Config, ConsumerSupervisor, FatalShutdown, HandlerContext, HandlerError, HandlerFn, Headers,
    InMemoryMetrics, Labels, LogWriter, MemoryBroker, Message, Subscribe, SubscriptionDefinition,
    CORRELATION_HEADER,
};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let broker = Arc::new(MemoryBroker::new());
    broker.add_consumer("ORDERS", "billing", "orders.created");
    broker.add_consumer("ORDERS", "audit", "orders.>");

    for id in 0..10 {
        let mut headers = Headers::new();
        headers.insert(CORRELATION_HEADER.to_string(), vec![format!("order-{id}")]);
        broker.publish("orders.created", headers, format!("{{\"id\":{id}}}"));
    }
    broker.publish("orders.cancelled", Headers::new(), Vec::new());

    // Every third first delivery fails transiently and comes back.
    let seen = Arc::new(AtomicUsize::new(0));
    let billing = SubscriptionDefinition::builder()
        .stream("ORDERS")
        .consumer("billing")
        .subject("orders.created")
        .max_concurrency(4)
        .handler(HandlerFn::arc(move |ctx: HandlerContext, msg: Message| {
            let seen = seen.clone();
            async move {
                let n = seen.fetch_add(1, Ordering::Relaxed);
                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_millis(20)) => {}
                    _ = ctx.cancel.cancelled() => return Err(HandlerError::transient("cancelled")),
                }
                if n % 3 == 0 && n < 10 {
                    return Err(HandlerError::transient(format!(
                        "billing backend busy for {}",
                        msg.header(CORRELATION_HEADER).unwrap_or("<none>")
                    )));
                }
                Ok(())
            }
        }))
        .build()?;

    let audit = SubscriptionDefinition::builder()
        .stream("ORDERS")
        .consumer("audit")
        .subject("orders.>")
        .max_concurrency(1)
        .handler(HandlerFn::arc(|_ctx: HandlerContext, msg: Message| async move {
            if msg.payload().is_empty() {
                return Err(HandlerError::fatal(format!("empty payload on {}", msg.subject())));
            }
            Ok(())
        }))
        .build()?;

    let metrics = Arc::new(InMemoryMetrics::new());
    let subs: Vec<Arc<dyn Subscribe>> = vec![Arc::new(LogWriter::new())];
    let cfg = Config {
        fetch_timeout: Duration::from_millis(200),
        grace: Duration::from_secs(5),
        ..Config::default()
    };

    let sup = ConsumerSupervisor::builder(cfg, broker.clone())
        .with_metrics(metrics.clone())
        .with_subscribers(subs)
        .subscribe(billing)
        .subscribe(audit)
        .build()?;

    sup.start(
        &CancellationToken::new(),
        Arc::new(|fatal: FatalShutdown| {
            tracing::error!(subscription = %fatal.subscription(), error = %fatal.error, "fatal");
        }),
    )?;

    // 10 billing acks plus 11 audit acks; redelivered messages are acked once.
    let settle = async {
        while broker.acked().len() < 21 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    };
    if tokio::time::timeout(Duration::from_secs(10), settle).await.is_err() {
        tracing::warn!(busy = ?sup.busy(), "demo did not settle in time");
    }
    sup.stop().await?;

    for labels in [
        Labels::new("orders.created", "billing"),
        Labels::new("orders.>", "audit"),
    ] {
        let series = metrics.snapshot(&labels);
        println!(
            "{}/{}: processed={} errors={} peak_concurrency={} max_lag={:?}",
            labels.subject,
            labels.consumer,
            series.processed,
            series.error_total(),
            series.peak_concurrency,
            series.lag.max
        );
    }
    println!("acked={} nacked={}", broker.acked().len(), broker.nacked().len());
    Ok(())
}
