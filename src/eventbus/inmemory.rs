//! In-process `EventBus` fake for tests, mirroring the teacher's in-memory
//! structures backing `enterprise/cache/lock.rs`'s unit tests. Delivers
//! synchronously and ignores delay/ordering — good enough to assert that a
//! resolver published exactly the events it should, without a broker.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;

use super::{listener_key, EventBus, EventBusError, EventListener, Envelope, RunMode};

pub struct InMemoryEventBus {
    mode: RunMode,
    listeners: DashMap<String, Vec<Arc<dyn EventListener>>>,
    published: Mutex<Vec<Envelope>>,
    publish_count: AtomicUsize,
}

impl InMemoryEventBus {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            listeners: DashMap::new(),
            published: Mutex::new(Vec::new()),
            publish_count: AtomicUsize::new(0),
        }
    }

    pub async fn published_envelopes(&self) -> Vec<Envelope> {
        self.published.lock().await.clone()
    }

    pub fn publish_count(&self) -> usize {
        self.publish_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EventBus for InMemoryEventBus {
    async fn publish(&self, envelope: Envelope) -> Result<(), EventBusError> {
        if !self.mode.can_publish() {
            return Err(EventBusError::PublishInConsumerMode);
        }
        self.publish_count.fetch_add(1, Ordering::SeqCst);
        let key = listener_key(&envelope.topic, envelope.tag.as_deref());
        if let Some(listeners) = self.listeners.get(&key) {
            for listener in listeners.iter() {
                listener.process(&envelope.body).await?;
            }
        }
        self.published.lock().await.push(envelope);
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

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize as Counter, Ordering as CounterOrdering};

    struct CountingListener {
        count: Arc<Counter>,
    }

    #[async_trait]
    impl EventListener for CountingListener {
        async fn process(&self, _body: &[u8]) -> Result<(), EventBusError> {
            self.count.fetch_add(1, CounterOrdering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn publish_in_consumer_only_mode_is_rejected() {
        let bus = InMemoryEventBus::new(RunMode::ConsumerOnly);
        let err = bus
            .publish(Envelope::new("shortlink", vec![]))
            .await
            .unwrap_err();
        assert!(matches!(err, EventBusError::PublishInConsumerMode));
    }

    #[tokio::test]
    async fn subscribe_in_producer_only_mode_is_rejected() {
        let bus = InMemoryEventBus::new(RunMode::ProducerOnly);
        let count = Arc::new(Counter::new(0));
        let err = bus
            .subscribe(
                "shortlink",
                Some("user_visit"),
                Arc::new(CountingListener { count }),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EventBusError::SubscribeInProducerMode));
    }

    #[tokio::test]
    async fn dispatches_to_matching_tag_listener_only() {
        let bus = InMemoryEventBus::new(RunMode::Mixed);
        let count = Arc::new(Counter::new(0));
        bus.subscribe(
            "shortlink",
            Some("user_visit"),
            Arc::new(CountingListener {
                count: count.clone(),
            }),
        )
        .await
        .unwrap();

        bus.publish(Envelope::new("shortlink", vec![1, 2, 3]).with_tag("user_visit"))
            .await
            .unwrap();
        bus.publish(Envelope::new("shortlink", vec![4, 5, 6]).with_tag("other_tag"))
            .await
            .unwrap();

        assert_eq!(count.load(CounterOrdering::SeqCst), 1);
        assert_eq!(bus.publish_count(), 2);
    }
}
