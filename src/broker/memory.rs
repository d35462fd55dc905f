//! # In-process broker.
//!
//! [`MemoryBroker`] is a small JetStream-like broker living in memory: durable
//! consumers are declared with a subject filter, published messages are routed
//! to every matching consumer, nacked messages are redelivered, and faults can
//! be injected for fetch, bind and settlement. Used by tests and the demo.
//!
//! ## Subject filters
//! Tokens are separated by `.`; `*` matches one token, a trailing `>` matches
//! one or more tokens.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tokio::sync::Notify;
use tokio::time::{self, Instant};

use crate::broker::client::{AckHandle, BrokerClient, ConsumerBinding, WorkUnit};
use crate::error::BrokerError;
use crate::subscriptions::{Headers, Message};

type ConsumerKey = (String, String);

#[derive(Clone)]
struct Stored {
    handle: AckHandle,
    message: Message,
    enqueued_at: SystemTime,
}

struct ConsumerQueue {
    filter: String,
    ready: VecDeque<Stored>,
}

#[derive(Default)]
struct State {
    consumers: HashMap<ConsumerKey, ConsumerQueue>,
    in_flight: HashMap<AckHandle, (ConsumerKey, Stored)>,
    next_id: u64,
    fetches: usize,
    acked: Vec<AckHandle>,
    nacked: Vec<AckHandle>,
    fetch_faults: VecDeque<BrokerError>,
    bind_faults: VecDeque<BrokerError>,
    settle_fault: Option<BrokerError>,
}

/// In-memory pull broker.
pub struct MemoryBroker {
    state: Mutex<State>,
    arrived: Notify,
    redeliver: bool,
}

impl Default for MemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBroker {
    /// Creates an empty broker that redelivers nacked messages.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            arrived: Notify::new(),
            redeliver: true,
        }
    }

    /// Drops nacked messages instead of redelivering them.
    pub fn without_redelivery(mut self) -> Self {
        self.redeliver = false;
        self
    }

    /// Declares a durable consumer on `stream` filtering `subject`.
    pub fn add_consumer(&self, stream: &str, consumer: &str, subject: &str) {
        self.lock().consumers.insert(
            (stream.to_string(), consumer.to_string()),
            ConsumerQueue {
                filter: subject.to_string(),
                ready: VecDeque::new(),
            },
        );
    }

    /// Publishes a message; returns one handle per consumer that received it.
    pub fn publish(&self, subject: &str, headers: Headers, payload: impl Into<Vec<u8>>) -> Vec<AckHandle> {
        self.publish_at(subject, headers, payload, SystemTime::now())
    }

    /// Publishes a message with an explicit enqueue timestamp.
    pub fn publish_at(
        &self,
        subject: &str,
        headers: Headers,
        payload: impl Into<Vec<u8>>,
        enqueued_at: SystemTime,
    ) -> Vec<AckHandle> {
        let payload: Vec<u8> = payload.into();
        let message = Message::new(subject, headers, payload);
        let mut handles = Vec::new();
        {
            let mut guard = self.lock();
            let state = &mut *guard;
            for ((stream, consumer), queue) in state.consumers.iter_mut() {
                if !subject_matches(&queue.filter, subject) {
                    continue;
                }
                state.next_id += 1;
                let handle = AckHandle::new(format!("{stream}.{consumer}.{}", state.next_id));
                queue.ready.push_back(Stored {
                    handle: handle.clone(),
                    message: message.clone(),
                    enqueued_at,
                });
                handles.push(handle);
            }
        }
        self.arrived.notify_waiters();
        handles
    }

    /// Makes the next fetch (of any consumer) fail with `err`.
    pub fn fail_next_fetch(&self, err: BrokerError) {
        self.lock().fetch_faults.push_back(err);
    }

    /// Makes the next bind fail with `err`.
    pub fn fail_next_bind(&self, err: BrokerError) {
        self.lock().bind_faults.push_back(err);
    }

    /// Makes every ack/nack fail with `err` until cleared with `None`.
    pub fn fail_settlements(&self, err: Option<BrokerError>) {
        self.lock().settle_fault = err;
    }

    /// Number of `fetch_one` calls so far.
    pub fn fetch_count(&self) -> usize {
        self.lock().fetches
    }

    /// Handles acked so far, in order.
    pub fn acked(&self) -> Vec<AckHandle> {
        self.lock().acked.clone()
    }

    /// Handles nacked so far, in order.
    pub fn nacked(&self) -> Vec<AckHandle> {
        self.lock().nacked.clone()
    }

    /// Messages waiting to be fetched by `stream/consumer`.
    pub fn pending(&self, stream: &str, consumer: &str) -> usize {
        self.lock()
            .consumers
            .get(&(stream.to_string(), consumer.to_string()))
            .map_or(0, |q| q.ready.len())
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn settle(&self, handle: &AckHandle, ack: bool) -> Result<(), BrokerError> {
        let requeued = {
            let mut guard = self.lock();
            let state = &mut *guard;
            if let Some(err) = &state.settle_fault {
                return Err(err.clone());
            }
            let (key, stored) = state.in_flight.remove(handle).ok_or_else(|| BrokerError::Ack {
                reason: format!("unknown or already settled delivery {}", handle.as_str()),
            })?;

            if ack {
                state.acked.push(handle.clone());
                false
            } else {
                state.nacked.push(handle.clone());
                match state.consumers.get_mut(&key) {
                    Some(queue) if self.redeliver => {
                        queue.ready.push_back(stored);
                        true
                    }
                    _ => false,
                }
            }
        };
        if requeued {
            self.arrived.notify_waiters();
        }
        Ok(())
    }
}

#[async_trait]
impl BrokerClient for MemoryBroker {
    async fn bind(&self, binding: &ConsumerBinding) -> Result<(), BrokerError> {
        let mut state = self.lock();
        if let Some(err) = state.bind_faults.pop_front() {
            return Err(err);
        }
        let key = (binding.stream.clone(), binding.consumer.clone());
        match state.consumers.get(&key) {
            Some(queue) if queue.filter == binding.subject => Ok(()),
            Some(queue) => Err(BrokerError::Binding {
                reason: format!(
                    "consumer {}/{} filters {:?}, not {:?}",
                    binding.stream, binding.consumer, queue.filter, binding.subject
                ),
            }),
            None => Err(BrokerError::Binding {
                reason: format!("consumer {}/{} not found", binding.stream, binding.consumer),
            }),
        }
    }

    async fn fetch_one(
        &self,
        binding: &ConsumerBinding,
        timeout: Duration,
    ) -> Result<WorkUnit, BrokerError> {
        let deadline = Instant::now() + timeout;
        let key = (binding.stream.clone(), binding.consumer.clone());
        {
            let mut state = self.lock();
            state.fetches += 1;
            if let Some(err) = state.fetch_faults.pop_front() {
                return Err(err);
            }
        }

        loop {
            let arrived = self.arrived.notified();
            tokio::pin!(arrived);
            arrived.as_mut().enable();

            {
                let mut guard = self.lock();
                let state = &mut *guard;
                let queue = state.consumers.get_mut(&key).ok_or_else(|| BrokerError::Binding {
                    reason: format!("consumer {}/{} not found", key.0, key.1),
                })?;
                if let Some(stored) = queue.ready.pop_front() {
                    let unit = WorkUnit {
                        message: stored.message.clone(),
                        handle: stored.handle.clone(),
                    };
                    state.in_flight.insert(stored.handle.clone(), (key, stored));
                    return Ok(unit);
                }
            }

            if time::timeout_at(deadline, arrived).await.is_err() {
                return Err(BrokerError::Timeout { timeout });
            }
        }
    }

    async fn ack(&self, handle: &AckHandle) -> Result<(), BrokerError> {
        self.settle(handle, true)
    }

    async fn nack(&self, handle: &AckHandle) -> Result<(), BrokerError> {
        self.settle(handle, false)
    }

    fn enqueued_at(&self, handle: &AckHandle) -> Result<SystemTime, BrokerError> {
        self.lock()
            .in_flight
            .get(handle)
            .map(|(_, stored)| stored.enqueued_at)
            .ok_or_else(|| BrokerError::Metadata {
                reason: format!("no in-flight delivery {}", handle.as_str()),
            })
    }
}

/// NATS-style subject matching (`*` one token, trailing `>` the rest).
fn subject_matches(filter: &str, subject: &str) -> bool {
    let mut filter_tokens = filter.split('.');
    let mut subject_tokens = subject.split('.');
    loop {
        match (filter_tokens.next(), subject_tokens.next()) {
            (Some(">"), Some(_)) => return filter_tokens.next().is_none(),
            (Some("*"), Some(_)) => {}
            (Some(f), Some(s)) if f == s => {}
            (None, None) => return true,
            _ => return false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(subject: &str) -> ConsumerBinding {
        ConsumerBinding {
            stream: "ORDERS".into(),
            consumer: "billing".into(),
            subject: subject.into(),
        }
    }

    #[test]
    fn subject_wildcards() {
        assert!(subject_matches("orders.created", "orders.created"));
        assert!(subject_matches("orders.*", "orders.created"));
        assert!(!subject_matches("orders.*", "orders.created.eu"));
        assert!(subject_matches("orders.>", "orders.created.eu"));
        assert!(!subject_matches("orders.>", "orders"));
        assert!(!subject_matches("orders.created", "orders.deleted"));
    }

    #[tokio::test]
    async fn bind_checks_consumer_and_filter() {
        let broker = MemoryBroker::new();
        broker.add_consumer("ORDERS", "billing", "orders.*");

        assert!(broker.bind(&binding("orders.*")).await.is_ok());
        let err = broker.bind(&binding("orders.created")).await.unwrap_err();
        assert_eq!(err.as_label(), BrokerError::BINDING);
    }

    #[tokio::test]
    async fn fetch_times_out_when_empty() {
        let broker = MemoryBroker::new();
        broker.add_consumer("ORDERS", "billing", "orders.*");

        let err = broker
            .fetch_one(&binding("orders.*"), Duration::from_millis(20))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert_eq!(broker.fetch_count(), 1);
    }

    #[tokio::test]
    async fn fetch_wakes_on_publish() {
        let broker = std::sync::Arc::new(MemoryBroker::new());
        broker.add_consumer("ORDERS", "billing", "orders.*");

        let publisher = std::sync::Arc::clone(&broker);
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(20)).await;
            publisher.publish("orders.created", Headers::new(), b"1".to_vec());
        });

        let unit = broker
            .fetch_one(&binding("orders.*"), Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(unit.message.payload(), b"1");
        assert!(broker.enqueued_at(&unit.handle).is_ok());
    }

    #[tokio::test]
    async fn nack_redelivers_and_ack_settles() {
        let broker = MemoryBroker::new();
        broker.add_consumer("ORDERS", "billing", "orders.*");
        broker.publish("orders.created", Headers::new(), b"1".to_vec());

        let b = binding("orders.*");
        let first = broker.fetch_one(&b, Duration::from_millis(50)).await.unwrap();
        broker.nack(&first.handle).await.unwrap();
        assert_eq!(broker.pending("ORDERS", "billing"), 1);

        let again = broker.fetch_one(&b, Duration::from_millis(50)).await.unwrap();
        assert_eq!(again.handle, first.handle);
        broker.ack(&again.handle).await.unwrap();

        assert_eq!(broker.acked(), vec![first.handle.clone()]);
        assert_eq!(broker.nacked(), vec![first.handle.clone()]);
        assert!(broker.ack(&first.handle).await.is_err());
        assert!(broker.enqueued_at(&first.handle).is_err());
    }

    #[tokio::test]
    async fn without_redelivery_drops_nacked() {
        let broker = MemoryBroker::new().without_redelivery();
        broker.add_consumer("ORDERS", "billing", "orders.*");
        broker.publish("orders.created", Headers::new(), b"1".to_vec());

        let unit = broker
            .fetch_one(&binding("orders.*"), Duration::from_millis(50))
            .await
            .unwrap();
        broker.nack(&unit.handle).await.unwrap();
        assert_eq!(broker.pending("ORDERS", "billing"), 0);
    }

    #[tokio::test]
    async fn injected_faults_are_consumed_once() {
        let broker = MemoryBroker::new();
        broker.add_consumer("ORDERS", "billing", "orders.*");
        broker.fail_next_fetch(BrokerError::Closed);

        let b = binding("orders.*");
        assert_eq!(
            broker.fetch_one(&b, Duration::from_millis(10)).await.unwrap_err(),
            BrokerError::Closed
        );
        assert!(
            broker
                .fetch_one(&b, Duration::from_millis(10))
                .await
                .unwrap_err()
                .is_timeout()
        );
    }
}
