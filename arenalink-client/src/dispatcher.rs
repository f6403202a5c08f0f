//! Topic dispatcher
//!
//! Routes inbound messages to the subscribers of their topic and issues the
//! `query<Topic>` commands that make pull topics useful.
//!
//! # Subscriptions
//!
//! A subscriber is registered once and identified by the returned
//! [`SubscriberId`]. It can be attached to more topics later, detached from a
//! single topic, or removed entirely. Registering the same (topic,
//! subscriber) pair twice is a no-op, so every message is delivered at most
//! once per subscriber.
//!
//! # Pull Topics
//!
//! Subscribing to a pull topic (see [`Topic::is_pull`]) sends `query<Topic>`
//! so the subscriber gets the current state without waiting for the next
//! push. When a connection completes its handshake, every pull topic with at
//! least one subscriber is queried again. Queries from `subscribe` are held
//! back until the current connection is verified, so each subscribe results in
//! exactly one query.
//!
//! # Examples
//!
//! ```rust,no_run
//! use arenalink_client::ArenaClient;
//! use arenalink_core::Topic;
//! use serde_json::Value;
//!
//! # async fn example(client: &ArenaClient) {
//! let id = client
//!     .dispatcher()
//!     .subscribe([Topic::HallData], |topic: Topic, data: &Value| {
//!         println!("{}: {}", topic, data);
//!     })
//!     .await;
//!
//! client.dispatcher().unsubscribe(id).await;
//! # }
//! ```

use crate::connection::{ConnectionManager, Inbound};
use crate::metrics::ClientMetrics;
use arenalink_core::{Command, Envelope, Result, Topic};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// Receives the payloads of the topics it is subscribed to
///
/// Called on the dispatcher task in frame order; implementations should hand
/// heavy work off instead of blocking.
pub trait Subscriber: Send + Sync + 'static {
    fn on_data(&self, topic: Topic, data: &Value);
}

impl<F> Subscriber for F
where
    F: Fn(Topic, &Value) + Send + Sync + 'static,
{
    fn on_data(&self, topic: Topic, data: &Value) {
        self(topic, data)
    }
}

/// A payload forwarded to a channel subscriber
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub topic: Topic,
    pub data: Value,
}

impl Subscriber for mpsc::UnboundedSender<Delivery> {
    fn on_data(&self, topic: Topic, data: &Value) {
        // A dropped receiver just stops receiving
        let _ = self.send(Delivery {
            topic,
            data: data.clone(),
        });
    }
}

/// Registration handle returned by [`Dispatcher::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber-{}", self.0)
    }
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: HashMap<SubscriberId, Arc<dyn Subscriber>>,
    topics: BTreeMap<Topic, Vec<SubscriberId>>,
    /// The current connection's handshake has been seen
    synced: bool,
}

impl Registry {
    /// Attach `id` to each topic, returning the topics it was newly added to
    fn attach(&mut self, id: SubscriberId, topics: impl IntoIterator<Item = Topic>) -> Vec<Topic> {
        let mut added = Vec::new();
        for topic in topics {
            let subscribers = self.topics.entry(topic).or_default();
            if !subscribers.contains(&id) {
                subscribers.push(id);
                added.push(topic);
            }
        }
        added
    }

    fn detach(&mut self, id: SubscriberId, topic: Topic) -> bool {
        let Some(subscribers) = self.topics.get_mut(&topic) else {
            return false;
        };
        let before = subscribers.len();
        subscribers.retain(|s| *s != id);
        let removed = subscribers.len() != before;
        if subscribers.is_empty() {
            self.topics.remove(&topic);
        }
        removed
    }
}

/// Maps topics to subscribers
///
/// Cloning is cheap; clones share the same registry.
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<Mutex<Registry>>,
    connection: ConnectionManager,
    metrics: Option<Arc<ClientMetrics>>,
}

impl Dispatcher {
    /// Create a dispatcher that queries through `connection`
    ///
    /// Nothing is delivered until inbound messages are fed to it; see
    /// [`spawn`](Self::spawn).
    pub fn new(connection: ConnectionManager, metrics: Option<Arc<ClientMetrics>>) -> Self {
        Self {
            registry: Arc::new(Mutex::new(Registry::default())),
            connection,
            metrics,
        }
    }

    /// Create a dispatcher and spawn the task draining `inbound`
    ///
    /// The task ends when the session task closes the channel.
    pub fn spawn(
        connection: ConnectionManager,
        inbound: mpsc::UnboundedReceiver<Inbound>,
        metrics: Option<Arc<ClientMetrics>>,
    ) -> Self {
        let dispatcher = Self::new(connection, metrics);
        tokio::spawn(dispatcher.clone().run(inbound));
        dispatcher
    }

    async fn run(self, mut inbound: mpsc::UnboundedReceiver<Inbound>) {
        while let Some(message) = inbound.recv().await {
            self.handle(message).await;
        }
        tracing::debug!("Dispatcher stopped");
    }

    pub(crate) async fn handle(&self, inbound: Inbound) {
        match inbound {
            Inbound::Verified => self.resync().await,
            Inbound::Disconnected => {
                self.registry.lock().await.synced = false;
            }
            Inbound::Message(envelope) => self.deliver(envelope).await,
        }
    }

    /// Register `subscriber` for `topics`
    ///
    /// Sends `query<Topic>` for every pull topic in `topics` once the
    /// connection is verified.
    pub async fn subscribe(
        &self,
        topics: impl IntoIterator<Item = Topic>,
        subscriber: impl Subscriber,
    ) -> SubscriberId {
        let mut registry = self.registry.lock().await;
        let id = SubscriberId(registry.next_id);
        registry.next_id += 1;
        registry.handlers.insert(id, Arc::new(subscriber));

        let added = registry.attach(id, topics);
        tracing::debug!(subscriber = %id, topics = ?added, "Subscribed");
        if registry.synced {
            self.query_pull(&added);
        }
        id
    }

    /// Attach an existing subscriber to more topics
    ///
    /// Topics it already has are skipped and not queried again. Returns
    /// `false` if `id` is not registered.
    pub async fn subscribe_topics(
        &self,
        id: SubscriberId,
        topics: impl IntoIterator<Item = Topic>,
    ) -> bool {
        let mut registry = self.registry.lock().await;
        if !registry.handlers.contains_key(&id) {
            return false;
        }

        let added = registry.attach(id, topics);
        if registry.synced {
            self.query_pull(&added);
        }
        true
    }

    /// Remove a subscriber from every topic
    ///
    /// Returns `false` if `id` is not registered.
    pub async fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut registry = self.registry.lock().await;
        if registry.handlers.remove(&id).is_none() {
            return false;
        }

        registry.topics.retain(|_, subscribers| {
            subscribers.retain(|s| *s != id);
            !subscribers.is_empty()
        });
        tracing::debug!(subscriber = %id, "Unsubscribed");
        true
    }

    /// Remove a subscriber from one topic, keeping its other registrations
    pub async fn unsubscribe_topic(&self, id: SubscriberId, topic: Topic) -> bool {
        self.registry.lock().await.detach(id, topic)
    }

    /// Ask the server for the current state of `topic`
    pub fn query_data(&self, topic: Topic) -> Result<()> {
        self.connection.send_command(Command::query(topic))
    }

    /// Current subscribers of `topic`, in registration order
    pub async fn subscribers(&self, topic: Topic) -> Vec<SubscriberId> {
        self.registry
            .lock()
            .await
            .topics
            .get(&topic)
            .cloned()
            .unwrap_or_default()
    }

    /// Topics that currently have at least one subscriber
    pub async fn topics(&self) -> Vec<Topic> {
        self.registry.lock().await.topics.keys().copied().collect()
    }

    async fn resync(&self) {
        let mut registry = self.registry.lock().await;
        registry.synced = true;

        let subscribed: Vec<Topic> = registry.topics.keys().copied().collect();
        tracing::debug!(topics = ?subscribed, "Connection verified, refreshing pull topics");
        self.query_pull(&subscribed);
    }

    fn query_pull(&self, topics: &[Topic]) {
        for topic in topics.iter().filter(|topic| topic.is_pull()) {
            if let Err(e) = self.query_data(*topic) {
                tracing::warn!(topic = %topic, error = %e, "Failed to send query");
            }
        }
    }

    async fn deliver(&self, envelope: Envelope) {
        let Some(topic) = envelope.topic() else {
            tracing::debug!(cmd = %envelope.cmd, "Dropping message for unknown topic");
            if let Some(ref m) = self.metrics {
                m.record_dropped("unknown_topic");
            }
            return;
        };

        let handlers: Vec<Arc<dyn Subscriber>> = {
            let registry = self.registry.lock().await;
            registry
                .topics
                .get(&topic)
                .into_iter()
                .flatten()
                .filter_map(|id| registry.handlers.get(id).cloned())
                .collect()
        };
        // Lock released before calling subscribers

        tracing::trace!(topic = %topic, subscribers = handlers.len(), "Delivering");
        if let Some(ref m) = self.metrics {
            m.record_delivery(topic.as_str(), handlers.len() as u64);
        }
        for handler in handlers {
            handler.on_data(topic, &envelope.data);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Identity;
    use crate::connector::{Connector, Socket};
    use crate::reconnect::FixedDelay;
    use arenalink_core::Error;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Unreachable;

    #[async_trait]
    impl Connector for Unreachable {
        async fn open(&self, _address: &str) -> Result<Socket> {
            Err(Error::WebSocket("unreachable".to_string()))
        }
    }

    fn dispatcher() -> Dispatcher {
        let (connection, _inbound) = ConnectionManager::spawn(
            Identity::new("admin", "1"),
            Arc::new(Unreachable),
            Box::new(FixedDelay::default()),
            None,
        );
        Dispatcher::new(connection, None)
    }

    fn counter() -> (Arc<AtomicUsize>, impl Subscriber) {
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = Arc::clone(&count);
        let subscriber = move |_topic: Topic, _data: &Value| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        };
        (count, subscriber)
    }

    #[tokio::test]
    async fn test_delivery_to_topic_subscribers_only() {
        let dispatcher = dispatcher();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (other_count, other) = counter();

        dispatcher.subscribe([Topic::HallData], tx).await;
        dispatcher.subscribe([Topic::NewMatch], other).await;

        dispatcher
            .handle(Inbound::Message(Envelope::new("HallData", json!([{"id": "T1"}]))))
            .await;

        assert_eq!(
            rx.try_recv().unwrap(),
            Delivery {
                topic: Topic::HallData,
                data: json!([{"id": "T1"}]),
            }
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(other_count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_duplicate_registration_delivers_once() {
        let dispatcher = dispatcher();
        let (count, subscriber) = counter();

        let id = dispatcher
            .subscribe([Topic::HallData, Topic::HallData], subscriber)
            .await;
        assert!(dispatcher.subscribe_topics(id, [Topic::HallData]).await);
        assert_eq!(dispatcher.subscribers(Topic::HallData).await, vec![id]);

        dispatcher
            .handle(Inbound::Message(Envelope::new("HallData", json!(1))))
            .await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsubscribe_stops_delivery() {
        let dispatcher = dispatcher();
        let (count, subscriber) = counter();

        let id = dispatcher
            .subscribe([Topic::HallData, Topic::UpdateMatch], subscriber)
            .await;
        assert!(dispatcher.unsubscribe(id).await);
        assert!(!dispatcher.unsubscribe(id).await);

        dispatcher
            .handle(Inbound::Message(Envelope::new("HallData", json!([]))))
            .await;
        dispatcher
            .handle(Inbound::Message(Envelope::new("updateMatch", json!({}))))
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert!(dispatcher.topics().await.is_empty());
    }

    #[tokio::test]
    async fn test_unsubscribe_single_topic() {
        let dispatcher = dispatcher();
        let (count, subscriber) = counter();

        let id = dispatcher
            .subscribe([Topic::HallData, Topic::MatchStop], subscriber)
            .await;
        assert!(dispatcher.unsubscribe_topic(id, Topic::HallData).await);
        assert!(!dispatcher.unsubscribe_topic(id, Topic::HallData).await);

        dispatcher
            .handle(Inbound::Message(Envelope::new("HallData", json!([]))))
            .await;
        dispatcher
            .handle(Inbound::Message(Envelope::new("matchStop", Value::Null)))
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.topics().await, vec![Topic::MatchStop]);
    }

    #[tokio::test]
    async fn test_unknown_ids_are_noops() {
        let dispatcher = dispatcher();
        let (_, subscriber) = counter();
        let id = dispatcher.subscribe([Topic::HallData], subscriber).await;
        dispatcher.unsubscribe(id).await;

        assert!(!dispatcher.subscribe_topics(id, [Topic::QuickCheck]).await);
        assert!(!dispatcher.unsubscribe_topic(id, Topic::QuickCheck).await);
        assert!(dispatcher.subscribers(Topic::QuickCheck).await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_topic_dropped() {
        let dispatcher = dispatcher();
        let (count, subscriber) = counter();
        dispatcher.subscribe(Topic::ALL, subscriber).await;

        dispatcher
            .handle(Inbound::Message(Envelope::new("halldata", json!([]))))
            .await;
        dispatcher
            .handle(Inbound::Message(Envelope::new("somethingNew", json!([]))))
            .await;

        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_data_delivered_as_null() {
        let dispatcher = dispatcher();
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher.subscribe([Topic::Error], tx).await;

        dispatcher
            .handle(Inbound::Message(Envelope::new("error", Value::Null)))
            .await;
        assert_eq!(rx.try_recv().unwrap().data, Value::Null);
    }

    #[test]
    fn test_subscriber_id_display() {
        assert_eq!(SubscriberId(7).to_string(), "subscriber-7");
    }
}
