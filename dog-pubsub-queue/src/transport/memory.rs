use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::debug;
use uuid::Uuid;

use crate::{
    transport::{MessageStream, PubSubClient, Subscription, SubscriptionOptions, Topic},
    MessageAcker, QueueError, QueueResult, ReceivedMessage,
};

/// In-process pub/sub transport for testing and development.
///
/// Mirrors the delivery model of a hosted broker: topics fan out to every
/// attached subscription, consumers of one subscription compete for its
/// messages, unsettled deliveries are bounded by flow control, and a nack
/// puts the message back with its delivery attempt bumped. Messages published
/// before a subscription exists are not delivered to it.
#[derive(Clone, Default)]
pub struct MemoryPubSub {
    broker: Arc<Broker>,
}

#[derive(Default)]
struct Broker {
    topics: Mutex<HashMap<String, Arc<TopicState>>>,
    subscriptions: Mutex<HashMap<String, Arc<SubscriptionState>>>,
    fail_publish: AtomicBool,
    topic_handles: AtomicUsize,
    subscription_handles: AtomicUsize,
}

struct TopicState {
    name: String,
    published: Mutex<Vec<Bytes>>,
    subscriptions: Mutex<HashMap<String, Arc<SubscriptionState>>>,
}

#[derive(Clone)]
struct StoredMessage {
    id: String,
    data: Bytes,
    publish_time: DateTime<Utc>,
    delivery_attempt: u32,
}

#[derive(Default)]
struct DeliveryState {
    pending: VecDeque<StoredMessage>,
    in_flight: usize,
    dead_letters: Vec<StoredMessage>,
}

struct SubscriptionState {
    name: String,
    options: Mutex<SubscriptionOptions>,
    delivery: Mutex<DeliveryState>,
    notify: Notify,
    consumers: AtomicUsize,
    acked: AtomicUsize,
    nacked: AtomicUsize,
}

impl MemoryPubSub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every publish fail with a transport error until reset
    pub fn set_fail_publish(&self, fail: bool) {
        self.broker.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Payloads accepted by a topic, in publish order
    pub fn published(&self, topic: &str) -> Vec<Bytes> {
        self.broker
            .topics
            .lock()
            .get(topic)
            .map(|t| t.published.lock().clone())
            .unwrap_or_default()
    }

    /// Number of topic handles handed out
    pub fn topic_handles_created(&self) -> usize {
        self.broker.topic_handles.load(Ordering::SeqCst)
    }

    /// Number of subscription handles handed out
    pub fn subscription_handles_created(&self) -> usize {
        self.broker.subscription_handles.load(Ordering::SeqCst)
    }

    /// Options most recently applied to a subscription
    pub fn subscription_options(&self, subscription: &str) -> Option<SubscriptionOptions> {
        self.subscription_state(subscription).map(|s| *s.options.lock())
    }

    /// Consumers currently attached to a subscription
    pub fn consumer_count(&self, subscription: &str) -> usize {
        self.subscription_state(subscription)
            .map(|s| s.consumers.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Messages waiting for delivery
    pub fn pending_count(&self, subscription: &str) -> usize {
        self.subscription_state(subscription)
            .map(|s| s.delivery.lock().pending.len())
            .unwrap_or(0)
    }

    /// Messages delivered but not yet settled
    pub fn in_flight_count(&self, subscription: &str) -> usize {
        self.subscription_state(subscription)
            .map(|s| s.delivery.lock().in_flight)
            .unwrap_or(0)
    }

    pub fn acked_count(&self, subscription: &str) -> usize {
        self.subscription_state(subscription)
            .map(|s| s.acked.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn nacked_count(&self, subscription: &str) -> usize {
        self.subscription_state(subscription)
            .map(|s| s.nacked.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Payloads that exhausted their delivery attempts
    pub fn dead_letters(&self, subscription: &str) -> Vec<Bytes> {
        self.subscription_state(subscription)
            .map(|s| s.delivery.lock().dead_letters.iter().map(|m| m.data.clone()).collect())
            .unwrap_or_default()
    }

    fn subscription_state(&self, name: &str) -> Option<Arc<SubscriptionState>> {
        self.broker.subscriptions.lock().get(name).cloned()
    }
}

impl PubSubClient for MemoryPubSub {
    fn topic(&self, name: &str) -> Arc<dyn Topic> {
        self.broker.topic_handles.fetch_add(1, Ordering::SeqCst);

        let state = self
            .broker
            .topics
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| {
                Arc::new(TopicState {
                    name: name.to_string(),
                    published: Mutex::new(Vec::new()),
                    subscriptions: Mutex::new(HashMap::new()),
                })
            })
            .clone();

        Arc::new(MemoryTopic {
            broker: self.broker.clone(),
            state,
        })
    }
}

struct MemoryTopic {
    broker: Arc<Broker>,
    state: Arc<TopicState>,
}

#[async_trait]
impl Topic for MemoryTopic {
    fn name(&self) -> &str {
        &self.state.name
    }

    async fn publish(&self, data: Bytes) -> QueueResult<String> {
        if self.broker.fail_publish.load(Ordering::SeqCst) {
            return Err(QueueError::Transport(format!(
                "publish to topic {} rejected",
                self.state.name
            )));
        }

        let message = StoredMessage {
            id: Uuid::new_v4().to_string(),
            data: data.clone(),
            publish_time: Utc::now(),
            delivery_attempt: 0,
        };

        self.state.published.lock().push(data);
        let subscriptions: Vec<_> = self.state.subscriptions.lock().values().cloned().collect();
        for subscription in &subscriptions {
            subscription.enqueue(message.clone());
        }

        debug!(
            "Published message {} to topic {} ({} subscriptions)",
            message.id,
            self.state.name,
            subscriptions.len()
        );
        Ok(message.id)
    }

    fn subscription(&self, name: &str, options: SubscriptionOptions) -> Arc<dyn Subscription> {
        self.broker.subscription_handles.fetch_add(1, Ordering::SeqCst);

        let state = self
            .broker
            .subscriptions
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(SubscriptionState::new(name, options)))
            .clone();
        *state.options.lock() = options;

        self.state
            .subscriptions
            .lock()
            .entry(name.to_string())
            .or_insert_with(|| state.clone());

        Arc::new(MemorySubscription { state, options })
    }
}

struct MemorySubscription {
    state: Arc<SubscriptionState>,
    options: SubscriptionOptions,
}

impl Subscription for MemorySubscription {
    fn name(&self) -> &str {
        &self.state.name
    }

    fn options(&self) -> SubscriptionOptions {
        self.options
    }

    fn open(&self) -> QueueResult<MessageStream> {
        let consumer = ConsumerGuard::attach(self.state.clone());

        let stream = futures::stream::unfold(consumer, |consumer| async move {
            let message = consumer.state.next_delivery().await;
            let received = message.into_received(consumer.state.clone());
            Some((received, consumer))
        });

        Ok(Box::pin(stream))
    }
}

/// Counts a consumer as attached for as long as its stream lives
struct ConsumerGuard {
    state: Arc<SubscriptionState>,
}

impl ConsumerGuard {
    fn attach(state: Arc<SubscriptionState>) -> Self {
        state.consumers.fetch_add(1, Ordering::SeqCst);
        Self { state }
    }
}

impl Drop for ConsumerGuard {
    fn drop(&mut self) {
        self.state.consumers.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SubscriptionState {
    fn new(name: &str, options: SubscriptionOptions) -> Self {
        Self {
            name: name.to_string(),
            options: Mutex::new(options),
            delivery: Mutex::new(DeliveryState::default()),
            notify: Notify::new(),
            consumers: AtomicUsize::new(0),
            acked: AtomicUsize::new(0),
            nacked: AtomicUsize::new(0),
        }
    }

    fn enqueue(&self, message: StoredMessage) {
        self.delivery.lock().pending.push_back(message);
        self.notify.notify_waiters();
    }

    /// Take the next message if the flow-control window has room
    fn try_take(&self) -> Option<StoredMessage> {
        let max_messages = self.options.lock().flow_control.max_messages;
        let mut delivery = self.delivery.lock();
        if delivery.in_flight >= max_messages {
            return None;
        }
        let mut message = delivery.pending.pop_front()?;
        delivery.in_flight += 1;
        message.delivery_attempt += 1;
        Some(message)
    }

    async fn next_delivery(&self) -> StoredMessage {
        loop {
            // Register interest before checking so a concurrent notify is not lost
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(message) = self.try_take() {
                return message;
            }
            notified.await;
        }
    }

    fn settle(&self, message: StoredMessage, ack: bool) {
        let max_attempts = self.options.lock().max_delivery_attempts;
        {
            let mut delivery = self.delivery.lock();
            delivery.in_flight = delivery.in_flight.saturating_sub(1);

            if ack {
                self.acked.fetch_add(1, Ordering::SeqCst);
            } else {
                self.nacked.fetch_add(1, Ordering::SeqCst);
                if max_attempts.is_some_and(|max| message.delivery_attempt >= max) {
                    debug!(
                        "Dead-lettering message {} on {} after {} attempts",
                        message.id, self.name, message.delivery_attempt
                    );
                    delivery.dead_letters.push(message);
                } else {
                    delivery.pending.push_back(message);
                }
            }
        }
        self.notify.notify_waiters();
    }
}

impl StoredMessage {
    fn into_received(self, state: Arc<SubscriptionState>) -> ReceivedMessage {
        ReceivedMessage::new(
            self.id.clone(),
            self.data.clone(),
            self.delivery_attempt,
            self.publish_time,
            Box::new(MemoryAcker { state, message: self }),
        )
    }
}

struct MemoryAcker {
    state: Arc<SubscriptionState>,
    message: StoredMessage,
}

#[async_trait]
impl MessageAcker for MemoryAcker {
    async fn ack(&self) -> QueueResult<()> {
        self.state.settle(self.message.clone(), true);
        Ok(())
    }

    async fn nack(&self) -> QueueResult<()> {
        self.state.settle(self.message.clone(), false);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use std::time::Duration;

    fn setup(max_messages: usize) -> (MemoryPubSub, Arc<dyn Topic>, Arc<dyn Subscription>) {
        let pubsub = MemoryPubSub::new();
        let topic = pubsub.topic("t1");
        let subscription = topic.subscription("s1", SubscriptionOptions::new(max_messages));
        (pubsub, topic, subscription)
    }

    #[tokio::test]
    async fn test_publish_delivers_to_subscription() {
        let (pubsub, topic, subscription) = setup(10);
        let mut stream = subscription.open().unwrap();

        let id = topic.publish(Bytes::from_static(b"{\"a\":1}")).await.unwrap();
        let message = stream.next().await.unwrap();

        assert_eq!(message.id(), id);
        assert_eq!(&message.data()[..], b"{\"a\":1}");
        assert_eq!(message.delivery_attempt(), 1);
        assert_eq!(pubsub.in_flight_count("s1"), 1);

        message.ack().await.unwrap();
        assert_eq!(pubsub.in_flight_count("s1"), 0);
        assert_eq!(pubsub.acked_count("s1"), 1);
        assert_eq!(pubsub.published("t1").len(), 1);
    }

    #[tokio::test]
    async fn test_messages_before_subscription_are_not_delivered() {
        let pubsub = MemoryPubSub::new();
        let topic = pubsub.topic("t1");
        topic.publish(Bytes::from_static(b"1")).await.unwrap();

        topic.subscription("s1", SubscriptionOptions::new(1));
        assert_eq!(pubsub.pending_count("s1"), 0);
    }

    #[tokio::test]
    async fn test_flow_control_window() {
        let (pubsub, topic, subscription) = setup(1);
        let mut stream = subscription.open().unwrap();

        topic.publish(Bytes::from_static(b"1")).await.unwrap();
        topic.publish(Bytes::from_static(b"2")).await.unwrap();

        let first = stream.next().await.unwrap();
        let blocked = tokio::time::timeout(Duration::from_millis(50), stream.next()).await;
        assert!(blocked.is_err(), "second delivery must wait for the first to settle");
        assert_eq!(pubsub.pending_count("s1"), 1);

        first.ack().await.unwrap();
        let second = stream.next().await.unwrap();
        assert_eq!(&second.data()[..], b"2");
    }

    #[tokio::test]
    async fn test_nack_redelivers_with_next_attempt() {
        let (pubsub, topic, subscription) = setup(5);
        let mut stream = subscription.open().unwrap();

        let id = topic.publish(Bytes::from_static(b"x")).await.unwrap();
        stream.next().await.unwrap().nack().await.unwrap();

        let again = stream.next().await.unwrap();
        assert_eq!(again.id(), id);
        assert_eq!(again.delivery_attempt(), 2);
        assert_eq!(pubsub.nacked_count("s1"), 1);
    }

    #[tokio::test]
    async fn test_dead_letter_after_max_attempts() {
        let pubsub = MemoryPubSub::new();
        let topic = pubsub.topic("t1");
        let subscription = topic.subscription(
            "s1",
            SubscriptionOptions::new(5).with_max_delivery_attempts(Some(2)),
        );
        let mut stream = subscription.open().unwrap();

        topic.publish(Bytes::from_static(b"poison")).await.unwrap();
        stream.next().await.unwrap().nack().await.unwrap();
        stream.next().await.unwrap().nack().await.unwrap();

        assert_eq!(pubsub.pending_count("s1"), 0);
        assert_eq!(pubsub.dead_letters("s1"), vec![Bytes::from_static(b"poison")]);
    }

    #[tokio::test]
    async fn test_consumers_compete_and_detach_on_drop() {
        let (pubsub, topic, subscription) = setup(10);
        let mut a = subscription.open().unwrap();
        let b = subscription.open().unwrap();
        assert_eq!(pubsub.consumer_count("s1"), 2);

        topic.publish(Bytes::from_static(b"1")).await.unwrap();
        a.next().await.unwrap().ack().await.unwrap();
        assert_eq!(pubsub.pending_count("s1"), 0);

        drop(b);
        assert_eq!(pubsub.consumer_count("s1"), 1);
        drop(a);
        assert_eq!(pubsub.consumer_count("s1"), 0);
    }

    #[tokio::test]
    async fn test_failing_publish() {
        let (pubsub, topic, _subscription) = setup(1);
        pubsub.set_fail_publish(true);

        let result = topic.publish(Bytes::from_static(b"1")).await;
        assert!(matches!(result, Err(QueueError::Transport(_))));
        assert!(pubsub.published("t1").is_empty());
    }
}
