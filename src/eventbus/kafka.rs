//! `rdkafka`-backed `EventBus`.
//!
//! Kafka has no native delayed-delivery or tag-filter concept, so the
//! mapping from spec §4.9 is: `tag` becomes a Kafka message header checked
//! client-side after consume, `messageGroup` becomes the partition key (so
//! Kafka's per-partition ordering gives us the group's delivery order), and
//! `delay` is honoured by sleeping until `deliver_at` before handing the
//! record to listeners rather than a broker-side delayed-message feature.

use async_trait::async_trait;
use dashmap::DashMap;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::message::{Headers, Message, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::Timeout;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

use super::{listener_key, EventBus, EventBusError, EventListener, Envelope, RunMode};

const TAG_HEADER: &str = "tag";
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(5);

pub struct KafkaEventBus {
    mode: RunMode,
    producer: Option<FutureProducer>,
    consumer: Option<Arc<StreamConsumer>>,
    listeners: DashMap<String, Vec<Arc<dyn EventListener>>>,
}

impl KafkaEventBus {
    pub fn new(mode: RunMode, brokers: &str, consumer_group: &str) -> Result<Self, EventBusError> {
        let producer = if mode.can_publish() {
            Some(
                ClientConfig::new()
                    .set("bootstrap.servers", brokers)
                    .set("message.timeout.ms", "5000")
                    .create::<FutureProducer>()
                    .map_err(|err| EventBusError::Transport(err.to_string()))?,
            )
        } else {
            None
        };

        let consumer = if mode.can_subscribe() {
            let consumer: StreamConsumer = ClientConfig::new()
                .set("bootstrap.servers", brokers)
                .set("group.id", consumer_group)
                .set("enable.auto.commit", "false")
                .set("auto.offset.reset", "earliest")
                .create()
                .map_err(|err| EventBusError::Transport(err.to_string()))?;
            Some(Arc::new(consumer))
        } else {
            None
        };

        Ok(Self {
            mode,
            producer,
            consumer,
            listeners: DashMap::new(),
        })
    }

    /// Subscribes the underlying consumer to every topic a listener was
    /// registered for and drives the receive loop until cancelled. Mirrors
    /// `startReceivingMessages`'s dispatch-then-ack pattern: a message is
    /// only committed after every matching listener succeeds.
    pub async fn run(&self) -> Result<(), EventBusError> {
        let consumer = self
            .consumer
            .clone()
            .ok_or_else(|| EventBusError::Transport("not running in a consumer mode".into()))?;

        let topics: Vec<String> = self
            .listeners
            .iter()
            .map(|entry| entry.key().split(':').next().unwrap_or("").to_string())
            .collect();
        let topic_refs: Vec<&str> = topics.iter().map(String::as_str).collect();
        consumer
            .subscribe(&topic_refs)
            .map_err(|err| EventBusError::Transport(err.to_string()))?;

        loop {
            match consumer.recv().await {
                Ok(message) => {
                    let topic = message.topic().to_string();
                    let tag = message
                        .headers()
                        .and_then(|headers| {
                            headers.iter().find(|h| h.key == TAG_HEADER).and_then(|h| {
                                h.value.map(|v| String::from_utf8_lossy(v).into_owned())
                            })
                        });
                    let key = listener_key(&topic, tag.as_deref());
                    let body = message.payload().unwrap_or_default().to_vec();

                    if let Some(listeners) = self.listeners.get(&key) {
                        let mut all_ok = true;
                        for listener in listeners.iter() {
                            if let Err(err) = listener.process(&body).await {
                                error!(?err, topic, "listener failed processing message");
                                all_ok = false;
                            }
                        }
                        if all_ok {
                            if let Err(err) = consumer.commit_message(
                                &message,
                                rdkafka::consumer::CommitMode::Async,
                            ) {
                                warn!(?err, "failed to commit offset after successful processing");
                            }
                        }
                    }
                }
                Err(err) => {
                    error!(?err, "failed to receive message from kafka");
                }
            }
        }
    }
}

#[async_trait]
impl EventBus for KafkaEventBus {
    async fn publish(&self, envelope: Envelope) -> Result<(), EventBusError> {
        if !self.mode.can_publish() {
            return Err(EventBusError::PublishInConsumerMode);
        }
        let producer = self
            .producer
            .as_ref()
            .ok_or_else(|| EventBusError::Transport("producer not configured".into()))?;

        if let Some(deliver_at) = envelope.deliver_at {
            let wait = deliver_at.signed_duration_since(chrono::Utc::now());
            if let Ok(wait) = wait.to_std() {
                tokio::time::sleep(wait).await;
            }
        }

        let mut record = FutureRecord::to(&envelope.topic).payload(&envelope.body);
        if let Some(keys) = &envelope.keys {
            record = record.key(keys);
        } else if let Some(group) = &envelope.message_group {
            record = record.key(group);
        }
        let mut headers = OwnedHeaders::new();
        if let Some(tag) = &envelope.tag {
            headers = headers.insert(rdkafka::message::Header {
                key: TAG_HEADER,
                value: Some(tag.as_bytes()),
            });
        }
        record = record.headers(headers);

        producer
            .send(record, Timeout::After(DEFAULT_POLL_TIMEOUT))
            .await
            .map_err(|(err, _)| EventBusError::Transport(err.to_string()))?;
        info!(topic = %envelope.topic, "published event");
        Ok(())
    }

    async fn subscribe(
        &self,
        topic: &str,
        tag: Option<&str>,
        listener: Arc<dyn EventListener>,
    ) -> Result<(), EventBusError> {
        if !self.mode.can_subscribe() {
            return Err(EventBusError::SubscribeInProducerMode);
        }
        let key = listener_key(topic, tag);
        self.listeners.entry(key).or_default().push(listener);
        Ok(())
    }
}
