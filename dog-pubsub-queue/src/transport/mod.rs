#[cfg(feature = "memory")]
pub mod memory;

use async_trait::async_trait;
use bytes::Bytes;
use futures_core::Stream;
use std::pin::Pin;
use std::sync::Arc;

use crate::{QueueResult, ReceivedMessage};

/// Type alias for boxed streams (stable Rust compatible)
pub type BoxStream<T> = Pin<Box<dyn Stream<Item = T> + Send + 'static>>;

/// Stream of deliveries from one consumer attached to a subscription
pub type MessageStream = BoxStream<ReceivedMessage>;

/// Flow-control settings for a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowControl {
    /// Maximum number of delivered but unsettled messages
    pub max_messages: usize,
}

/// Options applied when a subscription handle is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionOptions {
    pub flow_control: FlowControl,
    /// Deliveries after which the transport dead-letters a message; `None` retries forever
    pub max_delivery_attempts: Option<u32>,
}

impl SubscriptionOptions {
    pub fn new(max_messages: usize) -> Self {
        Self {
            flow_control: FlowControl { max_messages },
            max_delivery_attempts: None,
        }
    }

    pub fn with_max_delivery_attempts(mut self, attempts: Option<u32>) -> Self {
        self.max_delivery_attempts = attempts;
        self
    }
}

/// Entry point of a messaging backend
pub trait PubSubClient: Send + Sync + 'static {
    /// Local handle for a topic; no network round trip
    fn topic(&self, name: &str) -> Arc<dyn Topic>;
}

/// Publish target
#[async_trait]
pub trait Topic: Send + Sync {
    fn name(&self) -> &str;

    /// Publish one message, resolving once the transport has accepted it.
    /// Returns the transport-assigned message id.
    async fn publish(&self, data: Bytes) -> QueueResult<String>;

    /// Local handle for a subscription bound to this topic
    fn subscription(&self, name: &str, options: SubscriptionOptions) -> Arc<dyn Subscription>;
}

/// Consume target bound to a topic
pub trait Subscription: Send + Sync {
    fn name(&self) -> &str;

    /// Options this handle was created with
    fn options(&self) -> SubscriptionOptions;

    /// Attach a new consumer. Dropping the stream detaches it; unsettled
    /// deliveries stay owned by their `ReceivedMessage`.
    fn open(&self) -> QueueResult<MessageStream>;
}
