use std::collections::HashMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::{
    config::{PubSubQueueConfig, QueuePair},
    limiter::ConcurrencyLimiter,
    transport::{PubSubClient, Subscription, SubscriptionOptions, Topic},
    QueueError, QueueResult,
};

/// Resolves logical queue names to transport topics and subscriptions.
///
/// Handles are created on first use and cached for the adapter's lifetime,
/// so there is at most one topic and one subscription handle per queue.
/// Nothing here waits on consumption; creation is a local metadata step.
pub struct TransportAdapter {
    client: Arc<dyn PubSubClient>,
    pairs: HashMap<String, QueuePair>,
    limiter: ConcurrencyLimiter,
    max_delivery_attempts: Option<u32>,
    topics: DashMap<String, Arc<dyn Topic>>,
    subscriptions: DashMap<String, Arc<dyn Subscription>>,
}

impl TransportAdapter {
    pub fn new(client: Arc<dyn PubSubClient>, config: &PubSubQueueConfig) -> Self {
        Self {
            client,
            pairs: config.queue_pairs.clone(),
            limiter: ConcurrencyLimiter::new(config.concurrency.clone()),
            max_delivery_attempts: config.max_delivery_attempts,
            topics: DashMap::new(),
            subscriptions: DashMap::new(),
        }
    }

    /// Topic for `queue_name`, created once and cached
    pub fn resolve_topic(&self, queue_name: &str) -> QueueResult<Arc<dyn Topic>> {
        let pair = self
            .pairs
            .get(queue_name)
            .ok_or_else(|| QueueError::NoTopicConfigured(queue_name.to_string()))?;

        let topic = self
            .topics
            .entry(queue_name.to_string())
            .or_insert_with(|| {
                debug!("Creating topic handle {} for queue {}", pair.topic, queue_name);
                self.client.topic(&pair.topic)
            })
            .clone();

        Ok(topic)
    }

    /// Subscription for `queue_name`, created once with the queue's flow-control bound
    pub fn resolve_subscription(&self, queue_name: &str) -> QueueResult<Arc<dyn Subscription>> {
        let pair = self
            .pairs
            .get(queue_name)
            .ok_or_else(|| QueueError::NoSubscriptionConfigured(queue_name.to_string()))?;

        if let Some(subscription) = self.subscriptions.get(queue_name) {
            return Ok(subscription.clone());
        }

        // Resolve before taking the subscriptions entry lock
        let topic = self.resolve_topic(queue_name)?;

        let subscription = self
            .subscriptions
            .entry(queue_name.to_string())
            .or_insert_with(|| {
                let options = SubscriptionOptions::new(self.limiter.limit_for(queue_name))
                    .with_max_delivery_attempts(self.max_delivery_attempts);
                debug!(
                    "Creating subscription handle {} for queue {} (max in flight: {})",
                    pair.subscription, queue_name, options.flow_control.max_messages
                );
                topic.subscription(&pair.subscription, options)
            })
            .clone();

        Ok(subscription)
    }

    /// Drop every cached handle
    pub fn clear(&self) {
        self.topics.clear();
        self.subscriptions.clear();
    }

    pub fn cached_topics(&self) -> usize {
        self.topics.len()
    }

    pub fn cached_subscriptions(&self) -> usize {
        self.subscriptions.len()
    }
}
