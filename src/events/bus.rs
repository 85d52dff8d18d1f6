// Event Bus - in-process ordered publish/consume
//
// One bounded channel per topic with a single consumer loop, so delivery
// order within a topic (and therefore per partition key) matches publish
// order. Delivery is at-least-once: a handler returning a transient error
// gets the same record redelivered up to the configured cap; non-transient
// handler errors are logged and the record is dropped. There is no
// dead-letter sink and no replay.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::envelope::{EventEnvelope, Topic};
use crate::error::{Result, WalletError};

#[derive(Debug, Clone)]
pub struct EventBusConfig {
    pub queue_capacity: usize,
    pub max_redeliveries: u32,
    pub redelivery_delay: Duration,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 256,
            max_redeliveries: 5,
            redelivery_delay: Duration::from_millis(200),
        }
    }
}

/// A consumer of one or more topics. Handlers must be safe under redelivery.
#[async_trait]
pub trait EventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &EventEnvelope) -> Result<()>;
}

/// Process-wide event bus. Construct once, subscribe consumers, then start.
pub struct EventBus {
    config: EventBusConfig,
    senders: HashMap<Topic, mpsc::Sender<EventEnvelope>>,
    receivers: Mutex<HashMap<Topic, mpsc::Receiver<EventEnvelope>>>,
    handlers: Mutex<HashMap<Topic, Vec<Arc<dyn EventHandler>>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        let mut senders = HashMap::new();
        let mut receivers = HashMap::new();

        for topic in Topic::ALL {
            let (tx, rx) = mpsc::channel::<EventEnvelope>(config.queue_capacity);
            senders.insert(topic, tx);
            receivers.insert(topic, rx);
        }

        Self {
            config,
            senders,
            receivers: Mutex::new(receivers),
            handlers: Mutex::new(HashMap::new()),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Register a handler for a topic. Must be called before `start`.
    pub fn subscribe(&self, topic: Topic, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.lock().expect("handler registry poisoned");
        handlers.entry(topic).or_default().push(handler);
    }

    /// Spawn the consumer loop for every topic that has handlers.
    pub fn start(&self) {
        let mut receivers = self.receivers.lock().expect("receiver registry poisoned");
        let handlers = self.handlers.lock().expect("handler registry poisoned");
        let mut tasks = self.tasks.lock().expect("task registry poisoned");

        for topic in Topic::ALL {
            let topic_handlers = handlers.get(&topic).cloned().unwrap_or_default();
            if topic_handlers.is_empty() {
                continue;
            }

            let Some(mut rx) = receivers.remove(&topic) else {
                continue;
            };

            let config = self.config.clone();
            let task = tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    for handler in &topic_handlers {
                        deliver(handler.as_ref(), &event, &config).await;
                    }
                }
                tracing::debug!("Consumer loop for {} stopped", topic.as_str());
            });
            tasks.push(task);
        }
    }

    /// Publish an envelope to its topic. Callers on the happy path log a
    /// failure here and continue; the durable write already committed.
    pub async fn publish(&self, envelope: EventEnvelope) -> Result<()> {
        let topic = envelope.event_type.topic();
        let sender = self
            .senders
            .get(&topic)
            .ok_or_else(|| WalletError::EventPublish(format!("No such topic: {}", topic.as_str())))?;

        tracing::debug!(
            "Publishing {} (key={}) to {}",
            envelope.event_type.as_str(),
            envelope.partition_key,
            topic.as_str()
        );

        sender
            .send(envelope)
            .await
            .map_err(|e| WalletError::EventPublish(format!("Topic channel closed: {}", e)))
    }

    /// Stop all consumer loops. In-flight records are dropped.
    pub fn shutdown(&self) {
        let mut tasks = self.tasks.lock().expect("task registry poisoned");
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

async fn deliver(handler: &dyn EventHandler, event: &EventEnvelope, config: &EventBusConfig) {
    let mut attempt: u32 = 0;
    loop {
        match handler.handle(event).await {
            Ok(()) => return,
            Err(e) if e.is_transient() && attempt < config.max_redeliveries => {
                attempt += 1;
                tracing::warn!(
                    "Handler {} failed on {} (attempt {}/{}), redelivering: {}",
                    handler.name(),
                    event.event_type.as_str(),
                    attempt,
                    config.max_redeliveries,
                    e
                );
                tokio::time::sleep(config.redelivery_delay).await;
            }
            Err(e) => {
                tracing::error!(
                    "Handler {} dropped {} ({}): {}",
                    handler.name(),
                    event.event_type.as_str(),
                    event.event_id,
                    e
                );
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::envelope::EventType;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl EventHandler for Recorder {
        fn name(&self) -> &'static str {
            "recorder"
        }

        async fn handle(&self, event: &EventEnvelope) -> Result<()> {
            self.seen
                .lock()
                .unwrap()
                .push(event.partition_key.clone());
            Ok(())
        }
    }

    struct FlakyOnce {
        failures_left: AtomicU32,
        deliveries: AtomicU32,
    }

    #[async_trait]
    impl EventHandler for FlakyOnce {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn handle(&self, _event: &EventEnvelope) -> Result<()> {
            self.deliveries.fetch_add(1, Ordering::SeqCst);
            if self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(WalletError::DatabaseError("connection reset".into()));
            }
            Ok(())
        }
    }

    fn user_event(key: &str) -> EventEnvelope {
        EventEnvelope::new(
            EventType::UserRegistered,
            key,
            &serde_json::json!({"userId": key, "username": key}),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_per_topic_order_is_preserved() {
        let bus = EventBus::new(EventBusConfig::default());
        let recorder = Arc::new(Recorder {
            seen: Mutex::new(Vec::new()),
        });
        bus.subscribe(Topic::UserEvents, recorder.clone());
        bus.start();

        for i in 0..20 {
            bus.publish(user_event(&format!("subject-{}", i)))
                .await
                .unwrap();
        }

        let expected: Vec<String> = (0..20).map(|i| format!("subject-{}", i)).collect();
        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if recorder.seen.lock().unwrap().len() == 20 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("events not consumed in time");

        assert_eq!(*recorder.seen.lock().unwrap(), expected);
        bus.shutdown();
    }

    #[tokio::test]
    async fn test_transient_failure_is_redelivered() {
        let bus = EventBus::new(EventBusConfig {
            redelivery_delay: Duration::from_millis(5),
            ..EventBusConfig::default()
        });
        let flaky = Arc::new(FlakyOnce {
            failures_left: AtomicU32::new(2),
            deliveries: AtomicU32::new(0),
        });
        bus.subscribe(Topic::UserEvents, flaky.clone());
        bus.start();

        bus.publish(user_event("subject-1")).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if flaky.deliveries.load(Ordering::SeqCst) >= 3 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("redelivery did not happen");

        // two transient failures, then success on the third delivery
        assert_eq!(flaky.deliveries.load(Ordering::SeqCst), 3);
        bus.shutdown();
    }

    #[tokio::test]
    async fn test_non_transient_failure_is_dropped() {
        struct AlwaysInvalid {
            deliveries: AtomicU32,
        }

        #[async_trait]
        impl EventHandler for AlwaysInvalid {
            fn name(&self) -> &'static str {
                "always-invalid"
            }

            async fn handle(&self, _event: &EventEnvelope) -> Result<()> {
                self.deliveries.fetch_add(1, Ordering::SeqCst);
                Err(WalletError::Internal("malformed payload".into()))
            }
        }

        let bus = EventBus::new(EventBusConfig {
            redelivery_delay: Duration::from_millis(5),
            ..EventBusConfig::default()
        });
        let handler = Arc::new(AlwaysInvalid {
            deliveries: AtomicU32::new(0),
        });
        bus.subscribe(Topic::UserEvents, handler.clone());
        bus.start();

        bus.publish(user_event("a")).await.unwrap();
        bus.publish(user_event("b")).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if handler.deliveries.load(Ordering::SeqCst) >= 2 {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("second event never delivered");

        // exactly one delivery per record: no retries for non-transient errors
        assert_eq!(handler.deliveries.load(Ordering::SeqCst), 2);
        bus.shutdown();
    }
}
