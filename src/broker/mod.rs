//! Broker boundary: the client trait the core drives, and an in-process broker.
//!
//! ## Contents
//! - [`BrokerClient`] bind / fetch one / ack / nack / enqueue timestamp
//! - [`ConsumerBinding`], [`WorkUnit`], [`AckHandle`] data exchanged with the client
//! - [`MemoryBroker`] in-memory implementation with fault injection

mod client;
mod memory;

pub use client::{AckHandle, BrokerClient, BrokerRef, ConsumerBinding, WorkUnit};
pub use memory::MemoryBroker;
