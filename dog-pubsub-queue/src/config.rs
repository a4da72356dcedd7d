//! Strategy configuration.
//!
//! Built once at startup and handed to the strategy constructor. Values can
//! come from code (builder methods) or from environment variables:
//!
//! ```bash
//! export PUBSUB_QUEUE_CONCURRENCY=20
//! export PUBSUB_QUEUE_MAX_DELIVERY_ATTEMPTS=5
//! export PUBSUB_QUEUE_PAIRS="send-email=email-topic:email-sub,apply-collection-filters=filters-topic:filters-sub"
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::{QueueError, QueueResult};

pub const ENV_CONCURRENCY: &str = "PUBSUB_QUEUE_CONCURRENCY";
pub const ENV_MAX_DELIVERY_ATTEMPTS: &str = "PUBSUB_QUEUE_MAX_DELIVERY_ATTEMPTS";
pub const ENV_EVENT_CAPACITY: &str = "PUBSUB_QUEUE_EVENT_CAPACITY";
pub const ENV_PAIRS: &str = "PUBSUB_QUEUE_PAIRS";

/// Transport-level names backing one logical queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuePair {
    pub topic: String,
    pub subscription: String,
}

impl QueuePair {
    pub fn new(topic: impl Into<String>, subscription: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            subscription: subscription.into(),
        }
    }
}

/// In-flight bound per subscription
#[derive(Clone)]
pub enum Concurrency {
    /// Same bound for every queue
    Fixed(usize),

    /// Bound computed from the queue name
    PerQueue(Arc<dyn Fn(&str) -> usize + Send + Sync>),
}

impl fmt::Debug for Concurrency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed(n) => f.debug_tuple("Fixed").field(n).finish(),
            Self::PerQueue(_) => f.write_str("PerQueue(<fn>)"),
        }
    }
}

/// Configuration for the pub/sub job queue strategy
#[derive(Debug, Clone)]
pub struct PubSubQueueConfig {
    /// Flow-control policy; `None` uses the default bound
    pub concurrency: Option<Concurrency>,
    /// Logical queue name -> (topic, subscription)
    pub queue_pairs: HashMap<String, QueuePair>,
    /// Handed to the transport; the strategy itself never drops a message
    pub max_delivery_attempts: Option<u32>,
    /// Capacity of the lifecycle event broadcast
    pub event_capacity: usize,
}

impl Default for PubSubQueueConfig {
    fn default() -> Self {
        Self {
            concurrency: None,
            queue_pairs: HashMap::new(),
            max_delivery_attempts: None,
            event_capacity: 1000,
        }
    }
}

impl PubSubQueueConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map a logical queue to its topic and subscription
    pub fn with_queue(
        mut self,
        queue_name: impl Into<String>,
        topic: impl Into<String>,
        subscription: impl Into<String>,
    ) -> Self {
        self.queue_pairs
            .insert(queue_name.into(), QueuePair::new(topic, subscription));
        self
    }

    /// Uniform in-flight bound
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = Some(Concurrency::Fixed(limit));
        self
    }

    /// Per-queue in-flight bound
    pub fn with_concurrency_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> usize + Send + Sync + 'static,
    {
        self.concurrency = Some(Concurrency::PerQueue(Arc::new(f)));
        self
    }

    pub fn with_max_delivery_attempts(mut self, attempts: u32) -> Self {
        self.max_delivery_attempts = Some(attempts);
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    /// Look up the transport names for a queue
    pub fn pair(&self, queue_name: &str) -> Option<&QueuePair> {
        self.queue_pairs.get(queue_name)
    }

    /// Load configuration from the process environment
    pub fn from_env() -> QueueResult<Self> {
        Self::from_vars(std::env::vars())
    }

    /// Load configuration from key/value pairs; unknown keys are ignored
    pub fn from_vars<I, K, V>(vars: I) -> QueueResult<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();

        for (key, value) in vars {
            let value = value.as_ref().trim();
            match key.as_ref() {
                ENV_CONCURRENCY => {
                    config.concurrency = Some(Concurrency::Fixed(parse_number(ENV_CONCURRENCY, value)?));
                }
                ENV_MAX_DELIVERY_ATTEMPTS => {
                    config.max_delivery_attempts = Some(parse_number(ENV_MAX_DELIVERY_ATTEMPTS, value)?);
                }
                ENV_EVENT_CAPACITY => {
                    config.event_capacity = parse_number(ENV_EVENT_CAPACITY, value)?;
                }
                ENV_PAIRS => {
                    config.queue_pairs.extend(parse_pairs(value)?);
                }
                _ => {}
            }
        }

        if config.event_capacity == 0 {
            return Err(QueueError::InvalidConfig(format!("{} must be positive", ENV_EVENT_CAPACITY)));
        }

        Ok(config)
    }
}

fn parse_number<T: std::str::FromStr>(key: &str, value: &str) -> QueueResult<T> {
    value
        .parse()
        .map_err(|_| QueueError::InvalidConfig(format!("{} is not a valid number: {:?}", key, value)))
}

/// `queue=topic:subscription,queue2=topic2:subscription2`
fn parse_pairs(value: &str) -> QueueResult<HashMap<String, QueuePair>> {
    let mut pairs = HashMap::new();

    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let parsed = entry.split_once('=').and_then(|(queue, names)| {
            let (topic, subscription) = names.split_once(':')?;
            let (queue, topic, subscription) = (queue.trim(), topic.trim(), subscription.trim());
            if queue.is_empty() || topic.is_empty() || subscription.is_empty() {
                return None;
            }
            Some((queue.to_string(), QueuePair::new(topic, subscription)))
        });

        match parsed {
            Some((queue, pair)) => {
                pairs.insert(queue, pair);
            }
            None => {
                return Err(QueueError::InvalidConfig(format!(
                    "{} entry must look like queue=topic:subscription, got {:?}",
                    ENV_PAIRS, entry
                )))
            }
        }
    }

    Ok(pairs)
}
