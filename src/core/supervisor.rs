//! # ConsumerSupervisor: owns the subscriptions, their pools and the shutdown path.
//!
//! ## High-level architecture
//! ```text
//! SupervisorBuilder::build():
//!   - Config::validate(), bind RetryPolicy
//!   - one SlotPool per SubscriptionDefinition (duplicates rejected)
//!   - Bus + SubscriberSet + event listener (Bus ─► SubscriberSet::emit)
//!
//! start(parent, on_fatal):
//!   token = parent.child_token()
//!   def[0]        def[1]   ...   def[N-1]
//!     │             │               │
//!     └──► FetchLoop::new(def, pool, broker, metrics, bus)      (one per definition)
//!               └──► loops.spawn(fetch_loop.run(token, on_fatal))
//!
//! stop():
//!   Bus.publish(ShutdownRequested)
//!   token.cancel()                       → loops stop reserving/fetching
//!   join loops, await every pool idle    (bounded by Config::grace when > 0)
//!     ├─ all idle      → Bus.publish(Drained)        → Ok(())
//!     └─ grace elapsed → Bus.publish(GraceExceeded)  → Err(GraceExceeded { busy })
//!
//! run():
//!   start() ─► select { OS signal | first FatalShutdown } ─► stop()
//! ```
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use consumervisor::{
//!     Config, ConsumerSupervisor, FatalShutdown, HandlerContext, HandlerError, HandlerFn,
//!     MemoryBroker, Message, SubscriptionDefinition,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let broker = Arc::new(MemoryBroker::new());
//!     broker.add_consumer("ORDERS", "billing", "orders.*");
//!
//!     let def = SubscriptionDefinition::builder()
//!         .stream("ORDERS")
//!         .consumer("billing")
//!         .subject("orders.*")
//!         .handler(HandlerFn::arc(|_ctx: HandlerContext, _msg: Message| async {
//!             Ok::<_, HandlerError>(())
//!         }))
//!         .build()?;
//!
//!     let cfg = Config {
//!         fetch_timeout: Duration::from_millis(100),
//!         ..Config::default()
//!     };
//!     let sup = ConsumerSupervisor::builder(cfg, broker)
//!         .subscribe(def)
//!         .build()?;
//!
//!     sup.start(&tokio_util::sync::CancellationToken::new(), Arc::new(|_: FatalShutdown| {}))?;
//!     sup.stop().await?;
//!     Ok(())
//! }
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::{select, sync::mpsc, task::JoinHandle, time};
use tokio_util::sync::CancellationToken;

use super::builder::SupervisorBuilder;
use super::fetch_loop::{FatalCallback, FatalShutdown, FetchLoop};
use super::shutdown;
use crate::{
    broker::BrokerRef,
    core::Config,
    error::{BrokerError, RuntimeError},
    events::{Bus, Event, EventKind},
    metrics::MetricsRef,
    policies::RetryPolicy,
    pool::SlotPool,
    subscriptions::SubscriptionDefinition,
};

/// A subscription definition together with the pool that bounds it.
pub(super) struct Registered {
    pub(super) def: SubscriptionDefinition,
    pub(super) pool: SlotPool,
}

struct Running {
    token: CancellationToken,
    loops: Vec<JoinHandle<()>>,
}

/// Runs one fetch loop per subscription and drains them on stop.
pub struct ConsumerSupervisor {
    cfg: Config,
    bus: Bus,
    broker: BrokerRef,
    metrics: MetricsRef,
    subscriptions: Vec<Registered>,
    bind_retry: RetryPolicy<BrokerError>,
    running: Mutex<Option<Running>>,
    /// Loops cancelled but not yet joined; held by whichever `stop` is draining.
    stopping: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl ConsumerSupervisor {
    /// Starts building a supervisor.
    pub fn builder(cfg: Config, broker: BrokerRef) -> SupervisorBuilder {
        SupervisorBuilder::new(cfg, broker)
    }

    pub(super) fn new_internal(
        cfg: Config,
        bus: Bus,
        broker: BrokerRef,
        metrics: MetricsRef,
        subscriptions: Vec<Registered>,
        bind_retry: RetryPolicy<BrokerError>,
    ) -> Self {
        Self {
            cfg,
            bus,
            broker,
            metrics,
            subscriptions,
            bind_retry,
            running: Mutex::new(None),
            stopping: tokio::sync::Mutex::new(Vec::new()),
        }
    }

    /// Spawns one fetch loop per subscription.
    ///
    /// Loops run under a child of `parent`; cancelling `parent` stops them too,
    /// but only [`stop`](Self::stop) waits for the drain. `on_fatal` is called
    /// once for every subscription that hits an unrecoverable broker error.
    pub fn start(
        &self,
        parent: &CancellationToken,
        on_fatal: FatalCallback,
    ) -> Result<(), RuntimeError> {
        let mut running = self.lock_running();
        if running.is_some() {
            return Err(RuntimeError::AlreadyStarted);
        }

        let token = parent.child_token();
        let mut loops = Vec::with_capacity(self.subscriptions.len());
        for reg in &self.subscriptions {
            let fetch_loop = FetchLoop::new(
                &reg.def,
                reg.pool.clone(),
                Arc::clone(&self.broker),
                Arc::clone(&self.metrics),
                self.bus.clone(),
                &self.cfg,
                self.bind_retry.clone(),
            );
            loops.push(tokio::spawn(fetch_loop.run(token.clone(), Arc::clone(&on_fatal))));
        }

        *running = Some(Running { token, loops });
        Ok(())
    }

    /// Cancels every fetch loop and waits for in-flight messages to settle.
    ///
    /// Idempotent: a repeated or concurrent call waits for the same loops to
    /// exit and every pool to go idle. With `Config::grace > 0` the wait is
    /// bounded and [`RuntimeError::GraceExceeded`] lists the subscriptions
    /// still busy.
    ///
    /// Dropping the returned future (for example under an outer `timeout`)
    /// does not abort anything: the loops stay cancelled and keep draining,
    /// and the next `stop` picks up the wait where this one left off.
    pub async fn stop(&self) -> Result<(), RuntimeError> {
        self.drain(None).await
    }

    async fn drain(&self, trigger: Option<&'static str>) -> Result<(), RuntimeError> {
        let mut loops = self.stopping.lock().await;
        let taken = self.lock_running().take();
        if let Some(Running { token, loops: started }) = taken {
            let mut ev = Event::new(EventKind::ShutdownRequested);
            if let Some(name) = trigger {
                ev = ev.with_reason(name);
            }
            self.bus.publish(ev);
            token.cancel();
            loops.extend(started);
        }

        let drain = async {
            // Popped only once joined, so a dropped drain leaves the rest for the next caller.
            while let Some(handle) = loops.last_mut() {
                let _ = handle.await;
                loops.pop();
            }
            for reg in &self.subscriptions {
                reg.pool.await_idle().await;
            }
        };

        let Some(grace) = self.cfg.grace_limit() else {
            drain.await;
            self.bus.publish(Event::new(EventKind::Drained));
            return Ok(());
        };

        if time::timeout(grace, drain).await.is_ok() {
            self.bus.publish(Event::new(EventKind::Drained));
            return Ok(());
        }

        let busy = self.busy();
        self.bus.publish(
            Event::new(EventKind::GraceExceeded)
                .with_timeout(grace)
                .with_reason(busy.join(", ")),
        );
        Err(RuntimeError::GraceExceeded { grace, busy })
    }

    /// Starts, waits for a termination signal or the first fatal subscription
    /// error, then stops.
    ///
    /// A fatal error is returned as [`RuntimeError::SubscriptionFailed`] after
    /// the drain; otherwise the result of [`stop`](Self::stop) is returned.
    pub async fn run(&self) -> Result<(), RuntimeError> {
        let (tx, mut fatal_rx) = mpsc::unbounded_channel::<FatalShutdown>();
        let on_fatal: FatalCallback = Arc::new(move |fatal| {
            let _ = tx.send(fatal);
        });
        self.start(&CancellationToken::new(), on_fatal)?;

        let (trigger, name) = select! {
            signal = shutdown::wait_for_signal() => match signal {
                Ok(name) => (Ok(()), Some(name)),
                Err(err) => (Err(RuntimeError::Signal(err)), None),
            },
            Some(fatal) = fatal_rx.recv() => (Err(RuntimeError::from(fatal)), Some("fatal")),
        };

        let stopped = self.drain(name).await;
        trigger.and(stopped)
    }

    /// True between a successful `start` and the next `stop`.
    pub fn is_running(&self) -> bool {
        self.lock_running().is_some()
    }

    /// Registered subscriptions, in registration order.
    pub fn subscriptions(&self) -> impl Iterator<Item = &SubscriptionDefinition> {
        self.subscriptions.iter().map(|reg| &reg.def)
    }

    /// Subscriptions (as `stream/consumer`) that currently hold slots.
    pub fn busy(&self) -> Vec<String> {
        self.subscriptions
            .iter()
            .filter(|reg| reg.pool.in_use() > 0)
            .map(|reg| reg.def.display_name())
            .collect()
    }

    fn lock_running(&self) -> MutexGuard<'_, Option<Running>> {
        self.running.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use tokio::sync::Semaphore;

    use crate::broker::MemoryBroker;
    use crate::error::{ConfigError, HandlerError};
    use crate::metrics::{HANDLER_PANIC, InMemoryMetrics, Labels};
    use crate::subscriptions::{HandlerContext, HandlerFn, HandlerRef, Headers, Message};

    fn cfg() -> Config {
        Config {
            fetch_timeout: Duration::from_millis(20),
            poll_interval: Duration::from_millis(5),
            bind_delay: Duration::from_millis(1),
            ..Config::default()
        }
    }

    fn broker() -> Arc<MemoryBroker> {
        let broker = Arc::new(MemoryBroker::new().without_redelivery());
        broker.add_consumer("ORDERS", "billing", "orders.*");
        broker
    }

    fn def(handler: HandlerRef, max_concurrency: usize) -> SubscriptionDefinition {
        SubscriptionDefinition::builder()
            .stream("ORDERS")
            .consumer("billing")
            .subject("orders.*")
            .max_concurrency(max_concurrency)
            .handler(handler)
            .build()
            .unwrap()
    }

    fn ignore_fatal() -> FatalCallback {
        Arc::new(|_: FatalShutdown| {})
    }

    fn labels() -> Labels {
        Labels::new("orders.*", "billing")
    }

    async fn wait_until(mut cond: impl FnMut() -> bool) {
        time::timeout(Duration::from_secs(5), async {
            while !cond() {
                time::sleep(Duration::from_millis(2)).await;
            }
        })
        .await
        .expect("condition not reached in time");
    }

    /// Handler that records liveness and blocks until the test hands out a permit.
    struct Gated {
        gate: Arc<Semaphore>,
        started: Arc<AtomicUsize>,
        live: Arc<AtomicUsize>,
        peak: Arc<AtomicUsize>,
    }

    impl Gated {
        fn new() -> Self {
            Self {
                gate: Arc::new(Semaphore::new(0)),
                started: Arc::new(AtomicUsize::new(0)),
                live: Arc::new(AtomicUsize::new(0)),
                peak: Arc::new(AtomicUsize::new(0)),
            }
        }

        fn handler(&self) -> HandlerRef {
            let (gate, started, live, peak) = (
                Arc::clone(&self.gate),
                Arc::clone(&self.started),
                Arc::clone(&self.live),
                Arc::clone(&self.peak),
            );
            HandlerFn::arc(move |_ctx: HandlerContext, _msg: Message| {
                let (gate, started, live, peak) = (
                    Arc::clone(&gate),
                    Arc::clone(&started),
                    Arc::clone(&live),
                    Arc::clone(&peak),
                );
                async move {
                    started.fetch_add(1, Ordering::SeqCst);
                    let now = live.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    if let Ok(permit) = gate.acquire().await {
                        permit.forget();
                    }
                    live.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, HandlerError>(())
                }
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn capacity_one_serializes_handlers() {
        let broker = broker();
        let gated = Gated::new();
        let sup = ConsumerSupervisor::builder(cfg(), broker.clone())
            .subscribe(def(gated.handler(), 1))
            .build()
            .unwrap();

        broker.publish("orders.created", Headers::new(), b"1".to_vec());
        broker.publish("orders.created", Headers::new(), b"2".to_vec());
        sup.start(&CancellationToken::new(), ignore_fatal()).unwrap();

        wait_until(|| gated.started.load(Ordering::SeqCst) == 1).await;
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(gated.started.load(Ordering::SeqCst), 1);
        assert_eq!(broker.pending("ORDERS", "billing"), 1);

        gated.gate.add_permits(1);
        wait_until(|| gated.started.load(Ordering::SeqCst) == 2).await;
        gated.gate.add_permits(1);

        sup.stop().await.unwrap();
        assert_eq!(gated.peak.load(Ordering::SeqCst), 1);
        assert_eq!(broker.acked().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn live_dispatchers_never_exceed_capacity() {
        let broker = broker();
        let gated = Gated::new();
        let sup = ConsumerSupervisor::builder(cfg(), broker.clone())
            .subscribe(def(gated.handler(), 3))
            .build()
            .unwrap();

        for i in 0..10u8 {
            broker.publish("orders.created", Headers::new(), vec![i]);
        }
        sup.start(&CancellationToken::new(), ignore_fatal()).unwrap();

        wait_until(|| gated.started.load(Ordering::SeqCst) == 3).await;
        gated.gate.add_permits(10);
        wait_until(|| broker.acked().len() == 10).await;

        sup.stop().await.unwrap();
        assert!(gated.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn transient_failure_is_nacked_and_counted_once() {
        let broker = broker();
        let metrics = Arc::new(InMemoryMetrics::new());
        let sup = ConsumerSupervisor::builder(cfg(), broker.clone())
            .with_metrics(metrics.clone())
            .subscribe(def(
                HandlerFn::arc(|_ctx: HandlerContext, _msg: Message| async {
                    Err::<(), _>(HandlerError::transient("db busy"))
                }),
                4,
            ))
            .build()
            .unwrap();

        broker.publish("orders.created", Headers::new(), b"1".to_vec());
        sup.start(&CancellationToken::new(), ignore_fatal()).unwrap();
        wait_until(|| broker.nacked().len() == 1).await;
        sup.stop().await.unwrap();

        assert!(broker.acked().is_empty());
        let series = metrics.snapshot(&labels());
        assert_eq!(series.errors_of("handler_transient"), 1);
        assert_eq!(series.error_total(), 1);
        assert_eq!(series.processed, 1);
    }

    #[tokio::test]
    async fn panic_is_acked_and_loop_keeps_running() {
        let broker = broker();
        let metrics = Arc::new(InMemoryMetrics::new());
        let sup = ConsumerSupervisor::builder(cfg(), broker.clone())
            .with_metrics(metrics.clone())
            .subscribe(def(
                HandlerFn::arc(|_ctx: HandlerContext, msg: Message| async move {
                    if msg.payload() == b"boom" {
                        panic!("boom");
                    }
                    Ok::<_, HandlerError>(())
                }),
                4,
            ))
            .build()
            .unwrap();

        broker.publish("orders.created", Headers::new(), b"boom".to_vec());
        sup.start(&CancellationToken::new(), ignore_fatal()).unwrap();
        wait_until(|| broker.acked().len() == 1).await;

        broker.publish("orders.created", Headers::new(), b"fine".to_vec());
        wait_until(|| broker.acked().len() == 2).await;
        assert!(sup.is_running());
        sup.stop().await.unwrap();

        assert!(broker.nacked().is_empty());
        assert_eq!(metrics.snapshot(&labels()).errors_of(HANDLER_PANIC), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn stop_waits_for_in_flight_and_fetches_nothing_after() {
        let broker = broker();
        let finished = Arc::new(AtomicUsize::new(0));
        let started = Arc::new(AtomicUsize::new(0));
        let (f, s) = (Arc::clone(&finished), Arc::clone(&started));
        let handler = HandlerFn::arc(move |_ctx: HandlerContext, _msg: Message| {
            let (f, s) = (Arc::clone(&f), Arc::clone(&s));
            async move {
                s.fetch_add(1, Ordering::SeqCst);
                time::sleep(Duration::from_millis(100)).await;
                f.fetch_add(1, Ordering::SeqCst);
                Ok::<_, HandlerError>(())
            }
        });
        let sup = ConsumerSupervisor::builder(cfg(), broker.clone())
            .subscribe(def(handler, 3))
            .build()
            .unwrap();

        for i in 0..5u8 {
            broker.publish("orders.created", Headers::new(), vec![i]);
        }
        sup.start(&CancellationToken::new(), ignore_fatal()).unwrap();
        wait_until(|| started.load(Ordering::SeqCst) == 3).await;

        sup.stop().await.unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 3);
        assert_eq!(broker.acked().len(), 3);
        assert!(sup.busy().is_empty());

        let fetches = broker.fetch_count();
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(broker.fetch_count(), fetches);
        assert_eq!(broker.pending("ORDERS", "billing"), 2);
        assert!(!sup.is_running());
    }

    #[tokio::test]
    async fn fetch_error_is_fatal_exactly_once() {
        let broker = broker();
        broker.fail_next_fetch(BrokerError::Unavailable {
            reason: "connection closed".into(),
        });
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        let sup = ConsumerSupervisor::builder(cfg(), broker.clone())
            .subscribe(def(
                HandlerFn::arc(|_ctx: HandlerContext, _msg: Message| async {
                    Ok::<_, HandlerError>(())
                }),
                4,
            ))
            .build()
            .unwrap();

        sup.start(
            &CancellationToken::new(),
            Arc::new(move |fatal: FatalShutdown| sink.lock().unwrap().push(fatal)),
        )
        .unwrap();
        wait_until(|| calls.lock().unwrap().len() == 1).await;
        time::sleep(Duration::from_millis(50)).await;

        assert_eq!(calls.lock().unwrap().len(), 1);
        assert_eq!(broker.fetch_count(), 1);
        assert_eq!(calls.lock().unwrap()[0].subscription(), "ORDERS/billing");
        sup.stop().await.unwrap();
    }

    #[tokio::test]
    async fn run_returns_first_fatal_error() {
        let broker = broker();
        broker.fail_next_fetch(BrokerError::Closed);
        let sup = ConsumerSupervisor::builder(cfg(), broker.clone())
            .subscribe(def(
                HandlerFn::arc(|_ctx: HandlerContext, _msg: Message| async {
                    Ok::<_, HandlerError>(())
                }),
                4,
            ))
            .build()
            .unwrap();

        let err = sup.run().await.unwrap_err();
        assert_eq!(err.as_label(), "runtime_subscription_failed");
        assert!(err.to_string().contains("ORDERS/billing"));
        assert!(!sup.is_running());
    }

    #[tokio::test]
    async fn start_twice_is_rejected_and_stop_is_idempotent() {
        let sup = ConsumerSupervisor::builder(cfg(), broker())
            .subscribe(def(
                HandlerFn::arc(|_ctx: HandlerContext, _msg: Message| async {
                    Ok::<_, HandlerError>(())
                }),
                4,
            ))
            .build()
            .unwrap();
        let token = CancellationToken::new();

        sup.start(&token, ignore_fatal()).unwrap();
        assert!(matches!(
            sup.start(&token, ignore_fatal()),
            Err(RuntimeError::AlreadyStarted)
        ));

        sup.stop().await.unwrap();
        sup.stop().await.unwrap();
        sup.start(&token, ignore_fatal()).unwrap();
        sup.stop().await.unwrap();
    }

    #[tokio::test]
    async fn grace_exceeded_lists_busy_subscriptions() {
        let broker = broker();
        let cfg = Config {
            grace: Duration::from_millis(50),
            ..cfg()
        };
        let sup = ConsumerSupervisor::builder(cfg, broker.clone())
            .subscribe(def(
                HandlerFn::arc(|_ctx: HandlerContext, _msg: Message| async {
                    time::sleep(Duration::from_secs(30)).await;
                    Ok::<_, HandlerError>(())
                }),
                4,
            ))
            .build()
            .unwrap();

        broker.publish("orders.created", Headers::new(), b"slow".to_vec());
        sup.start(&CancellationToken::new(), ignore_fatal()).unwrap();
        wait_until(|| !sup.busy().is_empty()).await;

        match sup.stop().await {
            Err(RuntimeError::GraceExceeded { grace, busy }) => {
                assert_eq!(grace, Duration::from_millis(50));
                assert_eq!(busy, vec!["ORDERS/billing".to_string()]);
            }
            other => panic!("unexpected stop result: {other:?}"),
        }
    }

    fn slow_handler(finished: &Arc<AtomicUsize>) -> HandlerRef {
        let finished = Arc::clone(finished);
        HandlerFn::arc(move |_ctx: HandlerContext, _msg: Message| {
            let finished = Arc::clone(&finished);
            async move {
                time::sleep(Duration::from_millis(100)).await;
                finished.fetch_add(1, Ordering::SeqCst);
                Ok::<_, HandlerError>(())
            }
        })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_stops_both_wait_for_the_drain() {
        let broker = broker();
        let finished = Arc::new(AtomicUsize::new(0));
        let sup = ConsumerSupervisor::builder(cfg(), broker.clone())
            .subscribe(def(slow_handler(&finished), 1))
            .build()
            .unwrap();
        let mut rx = sup.bus.subscribe();

        broker.publish("orders.created", Headers::new(), b"1".to_vec());
        broker.publish("orders.created", Headers::new(), b"2".to_vec());
        sup.start(&CancellationToken::new(), ignore_fatal()).unwrap();
        wait_until(|| !sup.busy().is_empty() && broker.pending("ORDERS", "billing") == 1).await;

        let first = async {
            sup.stop().await.unwrap();
            finished.load(Ordering::SeqCst)
        };
        let second = async {
            sup.stop().await.unwrap();
            finished.load(Ordering::SeqCst)
        };
        assert_eq!(tokio::join!(first, second), (1, 1));

        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind);
        }
        assert!(kinds.contains(&EventKind::SubscriptionStopped));

        let fetches = broker.fetch_count();
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(broker.fetch_count(), fetches);
        assert_eq!(broker.pending("ORDERS", "billing"), 1);
    }

    #[tokio::test]
    async fn dropped_stop_does_not_abort_loops() {
        let broker = broker();
        let finished = Arc::new(AtomicUsize::new(0));
        let sup = ConsumerSupervisor::builder(cfg(), broker.clone())
            .subscribe(def(slow_handler(&finished), 1))
            .build()
            .unwrap();
        let mut rx = sup.bus.subscribe();

        broker.publish("orders.created", Headers::new(), b"1".to_vec());
        sup.start(&CancellationToken::new(), ignore_fatal()).unwrap();
        wait_until(|| broker.pending("ORDERS", "billing") == 0).await;

        assert!(time::timeout(Duration::from_millis(10), sup.stop()).await.is_err());
        assert!(!sup.is_running());

        sup.stop().await.unwrap();
        assert_eq!(finished.load(Ordering::SeqCst), 1);
        assert_eq!(broker.acked().len(), 1);

        let mut kinds = Vec::new();
        while let Ok(ev) = rx.try_recv() {
            kinds.push(ev.kind);
        }
        assert!(kinds.contains(&EventKind::SubscriptionStopped));
        assert_eq!(
            kinds.iter().filter(|k| **k == EventKind::ShutdownRequested).count(),
            1
        );
    }

    #[tokio::test]
    async fn builder_rejects_duplicates_and_bad_config() {
        let handler = || {
            HandlerFn::arc(|_ctx: HandlerContext, _msg: Message| async {
                Ok::<_, HandlerError>(())
            })
        };

        let err = ConsumerSupervisor::builder(cfg(), broker())
            .subscribe(def(handler(), 1))
            .subscribe(def(handler(), 2))
            .build()
            .err()
            .unwrap();
        assert_eq!(
            err,
            ConfigError::DuplicateSubscription {
                stream: "ORDERS".into(),
                consumer: "billing".into(),
            }
        );

        let bad = Config {
            poll_interval: Duration::ZERO,
            ..cfg()
        };
        let err = ConsumerSupervisor::builder(bad, broker()).build().err().unwrap();
        assert_eq!(err.as_label(), "config_zero_duration");
    }
}
