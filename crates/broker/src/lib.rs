//! Broker gateway: the narrow contract the chat coordinator consumes, plus
//! the JetStream adapter behind it and an in-process implementation for
//! tests.
//!
//! History replay and live delivery are deliberately separate operations —
//! the broker's replay cursor and live cursor cannot share a subscription,
//! so the coordinator sequences one before the other.

pub mod error;
pub mod gateway;
pub mod memory;
pub mod nats;
pub mod subscription;

mod history;

pub use {
    error::{Error, Result},
    gateway::{Broker, MessageSink},
    memory::MemoryBroker,
    nats::NatsBroker,
    subscription::LiveSubscription,
};
