use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::fmt;

use crate::QueueResult;

/// Transport-side settlement of one delivery
#[async_trait]
pub trait MessageAcker: Send + Sync {
    /// Mark the delivery as done
    async fn ack(&self) -> QueueResult<()>;

    /// Ask the transport to redeliver
    async fn nack(&self) -> QueueResult<()>;
}

/// A message delivered by a subscription.
///
/// `ack` and `nack` consume the message, so one delivery is settled at most once.
pub struct ReceivedMessage {
    id: String,
    data: Bytes,
    delivery_attempt: u32,
    publish_time: DateTime<Utc>,
    acker: Box<dyn MessageAcker>,
}

impl ReceivedMessage {
    pub fn new(
        id: impl Into<String>,
        data: Bytes,
        delivery_attempt: u32,
        publish_time: DateTime<Utc>,
        acker: Box<dyn MessageAcker>,
    ) -> Self {
        Self {
            id: id.into(),
            data,
            delivery_attempt,
            publish_time,
            acker,
        }
    }

    /// Transport message id
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Raw payload bytes
    pub fn data(&self) -> &Bytes {
        &self.data
    }

    /// How many times the transport has delivered this message, this delivery included
    pub fn delivery_attempt(&self) -> u32 {
        self.delivery_attempt
    }

    pub fn publish_time(&self) -> DateTime<Utc> {
        self.publish_time
    }

    pub async fn ack(self) -> QueueResult<()> {
        self.acker.ack().await
    }

    pub async fn nack(self) -> QueueResult<()> {
        self.acker.nack().await
    }
}

impl fmt::Debug for ReceivedMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceivedMessage")
            .field("id", &self.id)
            .field("bytes", &self.data.len())
            .field("delivery_attempt", &self.delivery_attempt)
            .field("publish_time", &self.publish_time)
            .finish()
    }
}
