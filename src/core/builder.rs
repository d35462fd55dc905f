use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;

use super::supervisor::{ConsumerSupervisor, Registered};
use crate::{
    broker::BrokerRef,
    core::Config,
    error::ConfigError,
    events::Bus,
    metrics::{MetricsRef, NoopMetrics},
    pool::SlotPool,
    subscribers::{LogWriter, Subscribe, SubscriberSet},
    subscriptions::SubscriptionDefinition,
};

/// Builder for [`ConsumerSupervisor`].
pub struct SupervisorBuilder {
    cfg: Config,
    broker: BrokerRef,
    metrics: MetricsRef,
    subscribers: Vec<Arc<dyn Subscribe>>,
    definitions: Vec<SubscriptionDefinition>,
}

impl SupervisorBuilder {
    /// Creates a builder for the given configuration and broker client.
    pub fn new(cfg: Config, broker: BrokerRef) -> Self {
        Self {
            cfg,
            broker,
            metrics: Arc::new(NoopMetrics),
            subscribers: Vec::new(),
            definitions: Vec::new(),
        }
    }

    /// Sets the metrics sink (default: [`NoopMetrics`]).
    pub fn with_metrics(mut self, metrics: MetricsRef) -> Self {
        self.metrics = metrics;
        self
    }

    /// Sets event subscribers.
    ///
    /// Subscribers receive runtime events through dedicated workers with
    /// bounded queues. A [`LogWriter`] is always part of the set; it is added
    /// at build time unless one is already listed here.
    pub fn with_subscribers(mut self, subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        self.subscribers = subscribers;
        self
    }

    /// Registers a subscription.
    pub fn subscribe(mut self, def: SubscriptionDefinition) -> Self {
        self.definitions.push(def);
        self
    }

    /// Validates the configuration and builds the supervisor.
    ///
    /// Creates one slot pool per subscription, the event bus, the subscriber
    /// workers and the event listener; must be called inside a Tokio runtime.
    pub fn build(self) -> Result<Arc<ConsumerSupervisor>, ConfigError> {
        self.cfg.validate()?;
        let bind_retry = self.cfg.bind_retry()?;

        let mut seen = HashSet::new();
        let mut subscriptions = Vec::with_capacity(self.definitions.len());
        for def in self.definitions {
            if !seen.insert((def.stream().to_string(), def.consumer().to_string())) {
                return Err(ConfigError::DuplicateSubscription {
                    stream: def.stream().to_string(),
                    consumer: def.consumer().to_string(),
                });
            }
            let pool = SlotPool::new(def.max_concurrency())?;
            subscriptions.push(Registered { def, pool });
        }

        let mut subscribers = self.subscribers;
        if !subscribers.iter().any(|s| s.name() == LogWriter::NAME) {
            subscribers.push(Arc::new(LogWriter::new()));
        }

        let bus = Bus::new(self.cfg.bus_capacity_clamped());
        let subs = SubscriberSet::new(subscribers, bus.clone());
        spawn_event_listener(&bus, subs);

        Ok(Arc::new(ConsumerSupervisor::new_internal(
            self.cfg,
            bus,
            self.broker,
            self.metrics,
            subscriptions,
            bind_retry,
        )))
    }
}

/// Forwards bus events to the subscriber set until every publisher is gone.
fn spawn_event_listener(bus: &Bus, subs: SubscriberSet) {
    let mut rx = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(ev) => subs.emit(ev),
                Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        subs.shutdown().await;
    });
}
