//! Publish/subscribe abstraction over the message broker.
//!
//! Grounded on `original_source/internal/base/mq/event_bus.go`'s
//! `RocketMqBasedEventBus`: a `RunMode` (`Consumer`/`Producer`/`Mixed`)
//! restricting which of `publish`/`subscribe` is legal, a `topic[:tag]`
//! listener table, and explicit per-message ack with redelivery after an
//! invisibility window. The broker itself is `rdkafka` rather than
//! RocketMQ — no RocketMQ client crate exists in the Rust ecosystem; the
//! substitution is grounded on `other_examples/manifests/kd17290-url-shorterner`
//! and `estuary-flow`, both of which reach for `rdkafka` for the same kind
//! of topic/partition pub-sub role. `MessageGroup`/ordering maps to a
//! partition key, `invisibleDuration` maps to manual offset commit delay.

mod inmemory;
mod kafka;

pub use inmemory::InMemoryEventBus;
pub use kafka::KafkaEventBus;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Minimum invisibility window the broker contract requires (spec §6).
pub const MIN_INVISIBLE_DURATION: Duration = Duration::from_secs(20);

#[derive(Debug, Error)]
pub enum EventBusError {
    #[error("cannot publish while running in consumer mode")]
    PublishInConsumerMode,
    #[error("cannot subscribe while running in producer mode")]
    SubscribeInProducerMode,
    #[error("broker transport error: {0}")]
    Transport(String),
    #[error("failed to serialize event body: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Which roles this bus instance is permitted to perform, mirroring the
/// Go original's `RunMode`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    ConsumerOnly,
    ProducerOnly,
    Mixed,
}

impl RunMode {
    pub fn can_publish(self) -> bool {
        matches!(self, RunMode::ProducerOnly | RunMode::Mixed)
    }

    pub fn can_subscribe(self) -> bool {
        matches!(self, RunMode::ConsumerOnly | RunMode::Mixed)
    }
}

/// One message to publish.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub topic: String,
    pub tag: Option<String>,
    pub keys: Option<String>,
    pub message_group: Option<String>,
    pub deliver_at: Option<DateTime<Utc>>,
    pub body: Vec<u8>,
}

impl Envelope {
    pub fn new(topic: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            topic: topic.into(),
            tag: None,
            keys: None,
            message_group: None,
            deliver_at: None,
            body,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_message_group(mut self, group: impl Into<String>) -> Self {
        self.message_group = Some(group.into());
        self
    }

    pub fn delayed_until(mut self, at: DateTime<Utc>) -> Self {
        self.deliver_at = Some(at);
        self
    }
}

/// A subscriber's handler. Returning `Ok(())` acks the message; returning
/// `Err` leaves it unacked so the broker redelivers after
/// `invisibleDuration`.
#[async_trait]
pub trait EventListener: Send + Sync {
    async fn process(&self, body: &[u8]) -> Result<(), EventBusError>;
}

#[async_trait]
pub trait EventBus: Send + Sync {
    async fn publish(&self, envelope: Envelope) -> Result<(), EventBusError>;

    async fn subscribe(
        &self,
        topic: &str,
        tag: Option<&str>,
        listener: std::sync::Arc<dyn EventListener>,
    ) -> Result<(), EventBusError>;
}

pub(crate) fn listener_key(topic: &str, tag: Option<&str>) -> String {
    match tag {
        Some(tag) => format!("{topic}:{tag}"),
        None => topic.to_string(),
    }
}
