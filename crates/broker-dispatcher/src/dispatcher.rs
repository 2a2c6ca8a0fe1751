//! One background actor per topic: wakes on a tick or a publish nudge, reads
//! the tail for every subscribed consumer, and delivers concurrently bounded
//! by a fan-out semaphore (grounded on the connection-fanout pattern in
//! `rostra-client`'s request handler: `Semaphore::acquire_owned` per
//! concurrent unit of work, `tokio::sync::watch` for shutdown).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use broker_retry::{AttemptOutcome, BackoffConfig, run_with_backoff};
use broker_store::EventStore;
use broker_types::{Event, EventId};
use broker_webhook::DeliveryAdapter;
use tokio::sync::{Notify, Semaphore, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::consumer_registry::ConsumerRegistry;

type TopicKey = (String, String, String);

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub tick_interval: Duration,
    pub fan_out: usize,
    pub batch_max: usize,
    pub backoff: BackoffConfig,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self { tick_interval: Duration::from_secs(5), fan_out: 8, batch_max: 500, backoff: BackoffConfig::default() }
    }
}

struct TopicActor {
    notify: Arc<Notify>,
    task: JoinHandle<()>,
}

/// Owns one actor per topic that has at least one subscriber. Actors are
/// started lazily the first time a topic is nudged or discovered at
/// bootstrap, and all stopped together by [`DispatcherSupervisor::shutdown`].
pub struct DispatcherSupervisor {
    store: Arc<EventStore>,
    consumers: Arc<ConsumerRegistry>,
    adapter: Arc<dyn DeliveryAdapter>,
    config: DispatcherConfig,
    shutdown_tx: watch::Sender<bool>,
    actors: tokio::sync::Mutex<HashMap<TopicKey, TopicActor>>,
}

impl DispatcherSupervisor {
    pub fn new(store: Arc<EventStore>, consumers: Arc<ConsumerRegistry>, adapter: Arc<dyn DeliveryAdapter>, config: DispatcherConfig) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self { store, consumers, adapter, config, shutdown_tx, actors: tokio::sync::Mutex::new(HashMap::new()) })
    }

    /// Starts the actor for `(tenant, namespace, topic)` if it is not
    /// already running. Idempotent: a second call is a no-op.
    pub async fn ensure_running(self: &Arc<Self>, tenant: &str, namespace: &str, topic: &str) {
        let key: TopicKey = (tenant.to_string(), namespace.to_string(), topic.to_string());
        let mut actors = self.actors.lock().await;
        if actors.contains_key(&key) {
            return;
        }

        let notify = Arc::new(Notify::new());
        let mut shutdown_rx = self.shutdown_tx.subscribe();
        let task = {
            let supervisor = Arc::clone(self);
            let notify = Arc::clone(&notify);
            let key = key.clone();
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(supervisor.config.tick_interval);
                ticker.tick().await; // first tick fires immediately; skip it, the caller already nudges on create
                loop {
                    tokio::select! {
                        _ = ticker.tick() => {}
                        _ = notify.notified() => {}
                        changed = shutdown_rx.changed() => {
                            if changed.is_err() || *shutdown_rx.borrow() {
                                break;
                            }
                            continue;
                        }
                    }
                    if *shutdown_rx.borrow() {
                        break;
                    }
                    supervisor.dispatch_once(&key.0, &key.1, &key.2).await;
                }
                tracing::debug!(tenant = %key.0, namespace = %key.1, topic = %key.2, "dispatcher actor stopped");
            })
        };

        actors.insert(key, TopicActor { notify, task });
    }

    /// Wakes the topic's actor immediately instead of waiting for its next
    /// tick. Called synchronously after a publish so subscribers with an
    /// empty backlog see new events without the tick's latency.
    pub async fn nudge(self: &Arc<Self>, tenant: &str, namespace: &str, topic: &str) {
        self.ensure_running(tenant, namespace, topic).await;
        let key: TopicKey = (tenant.to_string(), namespace.to_string(), topic.to_string());
        if let Some(actor) = self.actors.lock().await.get(&key) {
            actor.notify.notify_one();
        }
    }

    /// Signals every actor to stop and waits for them to drain their
    /// current wake before returning.
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
        let mut actors = self.actors.lock().await;
        for (_, actor) in actors.drain() {
            let _ = actor.task.await;
        }
    }

    async fn dispatch_once(&self, tenant: &str, namespace: &str, topic: &str) {
        let subscribers = self.consumers.list_for_topic(topic).await;
        if subscribers.is_empty() {
            return;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.fan_out.max(1)));
        let mut deliveries: Vec<JoinHandle<()>> = Vec::with_capacity(subscribers.len());

        for consumer_lock in subscribers {
            let permit = Arc::clone(&semaphore).acquire_owned().await.expect("semaphore never closed");
            let store = Arc::clone(&self.store);
            let consumers = Arc::clone(&self.consumers);
            let adapter = Arc::clone(&self.adapter);
            let backoff = self.config.backoff;
            let batch_max = self.config.batch_max;
            let tenant = tenant.to_string();
            let namespace = namespace.to_string();
            let topic = topic.to_string();

            deliveries.push(tokio::spawn(async move {
                let _permit = permit;
                deliver_to_consumer(&store, &consumers, adapter.as_ref(), &backoff, batch_max, &tenant, &namespace, &topic, consumer_lock).await;
            }));
        }

        for handle in deliveries {
            if let Err(error) = handle.await {
                tracing::warn!(%error, "delivery task panicked");
            }
        }
    }
}

async fn deliver_to_consumer(
    store: &EventStore,
    consumers: &ConsumerRegistry,
    adapter: &dyn DeliveryAdapter,
    backoff: &BackoffConfig,
    batch_max: usize,
    tenant: &str,
    namespace: &str,
    topic: &str,
    consumer_lock: Arc<tokio::sync::RwLock<broker_types::Consumer>>,
) {
    let (consumer_id, callback, correlation_id, after_sequence) = {
        let guard = consumer_lock.read().await;
        let last_id = guard.topics.get(topic).cloned().flatten();
        let after_sequence = last_id.as_deref().and_then(|id| EventId::parse(id).ok()).map(|id| id.sequence).unwrap_or(0);
        (guard.id, ConsumerRegistry::callback_of(&guard).to_string(), guard.correlation_id.unwrap_or_else(Uuid::new_v4), after_sequence)
    };

    let events = match store.read_since(tenant, namespace, topic, after_sequence, Some(batch_max)) {
        Ok(events) => events,
        Err(error) => {
            tracing::warn!(%error, %consumer_id, topic, "failed to read backlog for consumer");
            return;
        }
    };
    if events.is_empty() {
        return;
    }

    let delivered = run_with_backoff(backoff, |_attempt| {
        let callback = callback.clone();
        let events = events.clone();
        async move {
            match adapter.deliver(consumer_id, &callback, correlation_id, &events).await {
                Ok(()) => AttemptOutcome::Succeeded,
                Err(error) => {
                    tracing::warn!(%error, %consumer_id, topic, "delivery attempt failed");
                    AttemptOutcome::Retryable
                }
            }
        }
    })
    .await;

    if delivered {
        let last_id = &last_event(&events).id;
        if let Err(error) = consumers.advance_cursor(consumer_id, topic, last_id).await {
            tracing::warn!(%error, %consumer_id, topic, "failed to persist delivery cursor");
        }
    } else {
        tracing::warn!(%consumer_id, topic, "delivery retries exhausted, removing consumer");
        if let Err(error) = consumers.remove(consumer_id).await {
            tracing::warn!(%error, %consumer_id, "failed to remove exhausted consumer");
        }
    }
}

fn last_event(events: &[Event]) -> &Event {
    events.last().expect("checked non-empty above")
}
