use super::publisher::EventPublisher;
use super::store::MessageStore;
use super::subscriber::{Handler, Subscription, SubscriptionInfo, TypedHandler};
use super::types::{DeadLetter, Message, Topic};
use super::worker::DeliveryWorker;
use crate::config::BusConfig;
use anyhow::{bail, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BusState {
    Registering,
    Running,
    Stopped,
}

/// Event Bus
///
/// Lifecycle: register subscriptions, `start`, publish, `shutdown`.
/// Subscriptions can only be added before `start`.
pub struct EventBus {
    store: Arc<dyn MessageStore>,
    publisher: Arc<EventPublisher>,
    config: BusConfig,
    subscriptions: Mutex<Vec<Subscription>>,
    state: Mutex<BusState>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    shutdown: watch::Sender<bool>,
}

impl EventBus {
    pub fn new(store: Arc<dyn MessageStore>, config: BusConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            publisher: Arc::new(EventPublisher::new(store.clone())),
            store,
            config,
            subscriptions: Mutex::new(Vec::new()),
            state: Mutex::new(BusState::Registering),
            workers: Mutex::new(Vec::new()),
            shutdown,
        }
    }

    pub fn publisher(&self) -> Arc<EventPublisher> {
        self.publisher.clone()
    }

    /// Persist `payload` on `topic`; every subscription receives it at least once
    pub async fn publish<T: Serialize>(&self, topic: &Topic<T>, payload: &T) -> Result<Message> {
        self.publisher.publish(topic, payload).await
    }

    /// Register `handler` under a stable subscription id
    pub async fn subscribe<T>(
        &self,
        topic: &Topic<T>,
        id: impl Into<String>,
        handler: Arc<dyn Handler<T>>,
    ) -> Result<()>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let id = id.into();
        let state = self.state.lock().await;
        if *state != BusState::Registering {
            bail!(
                "cannot subscribe '{}' to {}: the bus is already {:?}",
                id,
                topic.name(),
                *state
            );
        }

        let mut subscriptions = self.subscriptions.lock().await;
        if subscriptions
            .iter()
            .any(|s| s.topic == topic.name() && s.id == id)
        {
            bail!("subscription '{}' is already registered on {}", id, topic.name());
        }

        info!(topic = topic.name(), subscription = %id, "subscription registered");
        subscriptions.push(Subscription {
            topic: topic.name(),
            id,
            handler: Arc::new(TypedHandler::new(handler)),
        });
        Ok(())
    }

    /// Registrations in the order they were made
    pub async fn subscriptions(&self) -> Vec<SubscriptionInfo> {
        self.subscriptions
            .lock()
            .await
            .iter()
            .map(SubscriptionInfo::from)
            .collect()
    }

    /// Spawn one delivery worker per subscription
    ///
    /// A subscription that never committed starts at the newest message of
    /// its topic; otherwise it resumes after its committed offset.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        if *state != BusState::Registering {
            bail!("event bus cannot start from state {:?}", *state);
        }

        let subscriptions = self.subscriptions.lock().await.clone();
        let mut workers = self.workers.lock().await;

        for sub in subscriptions {
            let offset = match self.store.load_offset(sub.topic, &sub.id).await? {
                Some(offset) => offset,
                None => {
                    let latest = self.store.latest_id(sub.topic).await?;
                    self.store.commit_offset(sub.topic, &sub.id, latest).await?;
                    latest
                }
            };

            let worker = DeliveryWorker {
                store: self.store.clone(),
                handler: sub.handler.clone(),
                topic: sub.topic.to_string(),
                subscription: sub.id.clone(),
                config: self.config.clone(),
                offset,
            };
            let wake = self.publisher.subscribe();
            let shutdown = self.shutdown.subscribe();
            workers.push(tokio::spawn(worker.run(wake, shutdown)));
        }

        *state = BusState::Running;
        info!(workers = workers.len(), "event bus started");
        Ok(())
    }

    /// Stop all workers and wait for in-flight deliveries to finish
    pub async fn shutdown(&self) {
        {
            let mut state = self.state.lock().await;
            if *state == BusState::Stopped {
                return;
            }
            *state = BusState::Stopped;
        }

        self.shutdown.send_replace(true);

        let workers: Vec<JoinHandle<()>> = self.workers.lock().await.drain(..).collect();
        for result in futures_util::future::join_all(workers).await {
            if let Err(e) = result {
                tracing::error!("delivery worker panicked: {}", e);
            }
        }

        info!("event bus stopped");
    }

    pub async fn dead_letters<T>(&self, topic: &Topic<T>, subscription: &str) -> Result<Vec<DeadLetter>> {
        self.store.dead_letters(topic.name(), subscription).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_bus::memory::MemoryMessageStore;
    use crate::event_bus::types::Envelope;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Ping {
        n: u32,
    }

    const PING: Topic<Ping> = Topic::new("ping");

    /// Fails the first `failures` attempts of every message, then records it
    struct Flaky {
        failures: u32,
        calls: AtomicU32,
        seen: Mutex<Vec<(Ping, Envelope)>>,
    }

    impl Flaky {
        fn new(failures: u32) -> Arc<Self> {
            Arc::new(Self {
                failures,
                calls: AtomicU32::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl Handler<Ping> for Flaky {
        async fn handle(&self, event: Ping, envelope: &Envelope) -> Result<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if envelope.attempt <= self.failures {
                bail!("transient failure on attempt {}", envelope.attempt);
            }
            self.seen.lock().await.push((event, envelope.clone()));
            Ok(())
        }
    }

    fn fast_config() -> BusConfig {
        BusConfig {
            poll_interval_ms: 20,
            batch_size: 10,
            max_attempts: 3,
            min_backoff_ms: 1,
            max_backoff_ms: 5,
            ack_deadline_ms: 1000,
        }
    }

    async fn wait_until<F, Fut>(mut check: F)
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        for _ in 0..200 {
            if check().await {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("condition not reached in time");
    }

    #[tokio::test]
    async fn test_duplicate_subscription_rejected() {
        let bus = EventBus::new(Arc::new(MemoryMessageStore::new()), fast_config());

        bus.subscribe(&PING, "a", Flaky::new(0)).await.unwrap();
        assert!(bus.subscribe(&PING, "a", Flaky::new(0)).await.is_err());
        bus.subscribe(&PING, "b", Flaky::new(0)).await.unwrap();

        let ids: Vec<String> = bus.subscriptions().await.into_iter().map(|s| s.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_subscribe_after_start_rejected() {
        let bus = EventBus::new(Arc::new(MemoryMessageStore::new()), fast_config());
        bus.start().await.unwrap();

        assert!(bus.subscribe(&PING, "late", Flaky::new(0)).await.is_err());
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_every_subscription_receives_each_message() {
        let bus = EventBus::new(Arc::new(MemoryMessageStore::new()), fast_config());
        let first = Flaky::new(0);
        let second = Flaky::new(0);
        bus.subscribe(&PING, "first", first.clone()).await.unwrap();
        bus.subscribe(&PING, "second", second.clone()).await.unwrap();
        bus.start().await.unwrap();

        for n in 1..=3 {
            bus.publish(&PING, &Ping { n }).await.unwrap();
        }

        wait_until(|| async { first.seen.lock().await.len() == 3 && second.seen.lock().await.len() == 3 }).await;

        let order: Vec<u32> = first.seen.lock().await.iter().map(|(p, _)| p.n).collect();
        assert_eq!(order, vec![1, 2, 3]);
        bus.shutdown().await;
    }

    #[tokio::test]
    async fn test_failed_delivery_is_retried() {
        let bus = EventBus::new(Arc::new(MemoryMessageStore::new()), fast_config());
        let handler = Flaky::new(2);
        bus.subscribe(&PING, "flaky", handler.clone()).await.unwrap();
        bus.start().await.unwrap();

        let message = bus.publish(&PING, &Ping { n: 7 }).await.unwrap();

        wait_until(|| async { !handler.seen.lock().await.is_empty() }).await;
        bus.shutdown().await;

        let seen = handler.seen.lock().await;
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0, Ping { n: 7 });
        assert_eq!(seen[0].1.message_id, message.id);
        assert_eq!(seen[0].1.attempt, 3);
        assert!(seen[0].1.is_redelivery());
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_exhausted_message_is_dead_lettered_and_skipped() {
        let store = Arc::new(MemoryMessageStore::new());
        let bus = EventBus::new(store.clone(), fast_config());
        let handler = Flaky::new(u32::MAX);
        bus.subscribe(&PING, "broken", handler.clone()).await.unwrap();
        bus.start().await.unwrap();

        let message = bus.publish(&PING, &Ping { n: 1 }).await.unwrap();

        wait_until(|| async { !bus.dead_letters(&PING, "broken").await.unwrap().is_empty() }).await;
        wait_until(|| async {
            store.load_offset("ping", "broken").await.unwrap() == Some(message.id)
        })
        .await;
        bus.shutdown().await;

        let letters = bus.dead_letters(&PING, "broken").await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].message_id, message.id);
        assert_eq!(letters[0].attempts, 3);
        assert!(letters[0].error.contains("transient failure"));
        assert_eq!(handler.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_messages_published_while_down_are_delivered_after_restart() {
        let store = Arc::new(MemoryMessageStore::new());

        // First run registers the subscription and commits its starting offset
        let bus = EventBus::new(store.clone(), fast_config());
        bus.subscribe(&PING, "durable", Flaky::new(0)).await.unwrap();
        bus.start().await.unwrap();
        bus.shutdown().await;

        // Published with no worker running
        let publisher = EventPublisher::new(store.clone());
        publisher.publish(&PING, &Ping { n: 42 }).await.unwrap();

        let bus = EventBus::new(store.clone(), fast_config());
        let handler = Flaky::new(0);
        bus.subscribe(&PING, "durable", handler.clone()).await.unwrap();
        bus.start().await.unwrap();

        wait_until(|| async { !handler.seen.lock().await.is_empty() }).await;
        bus.shutdown().await;

        assert_eq!(handler.seen.lock().await[0].0, Ping { n: 42 });
    }

    #[tokio::test]
    async fn test_new_subscription_starts_at_latest_message() {
        let store = Arc::new(MemoryMessageStore::new());
        EventPublisher::new(store.clone())
            .publish(&PING, &Ping { n: 1 })
            .await
            .unwrap();

        let bus = EventBus::new(store.clone(), fast_config());
        let handler = Flaky::new(0);
        bus.subscribe(&PING, "fresh", handler.clone()).await.unwrap();
        bus.start().await.unwrap();

        bus.publish(&PING, &Ping { n: 2 }).await.unwrap();
        wait_until(|| async { !handler.seen.lock().await.is_empty() }).await;
        bus.shutdown().await;

        let seen: Vec<u32> = handler.seen.lock().await.iter().map(|(p, _)| p.n).collect();
        assert_eq!(seen, vec![2]);
    }

    #[tokio::test]
    async fn test_slow_handler_counts_as_failure() {
        struct Sleepy(AtomicU32);

        #[async_trait]
        impl Handler<Ping> for Sleepy {
            async fn handle(&self, _event: Ping, envelope: &Envelope) -> Result<()> {
                self.0.fetch_add(1, Ordering::SeqCst);
                if envelope.attempt == 1 {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
                Ok(())
            }
        }

        let config = BusConfig {
            ack_deadline_ms: 20,
            ..fast_config()
        };
        let bus = EventBus::new(Arc::new(MemoryMessageStore::new()), config);
        let handler = Arc::new(Sleepy(AtomicU32::new(0)));
        bus.subscribe(&PING, "sleepy", handler.clone()).await.unwrap();
        bus.start().await.unwrap();

        bus.publish(&PING, &Ping { n: 1 }).await.unwrap();
        wait_until(|| async { handler.0.load(Ordering::SeqCst) >= 2 }).await;
        bus.shutdown().await;

        assert!(bus.dead_letters(&PING, "sleepy").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let bus = EventBus::new(Arc::new(MemoryMessageStore::new()), fast_config());
        bus.subscribe(&PING, "a", Flaky::new(0)).await.unwrap();
        bus.start().await.unwrap();

        bus.shutdown().await;
        bus.shutdown().await;
        assert!(bus.start().await.is_err());
    }
}
