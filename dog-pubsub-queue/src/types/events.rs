use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::JobId;

/// Structured lifecycle events, observed across the publish/consume boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum JobEvent {
    /// Transport accepted the publish
    Published {
        job_id: JobId,
        queue: String,
        at: DateTime<Utc>,
    },

    /// A consumer received the message and started processing
    Received {
        job_id: JobId,
        queue: String,
        attempts: u32,
        at: DateTime<Utc>,
    },

    /// Processing resolved and the message was acked
    Acked {
        job_id: JobId,
        queue: String,
        at: DateTime<Utc>,
    },

    /// Processing failed and the message was nacked for redelivery
    Nacked {
        job_id: JobId,
        queue: String,
        error: String,
        at: DateTime<Utc>,
    },
}

impl JobEvent {
    /// Get event type name as string
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Published { .. } => "published",
            Self::Received { .. } => "received",
            Self::Acked { .. } => "acked",
            Self::Nacked { .. } => "nacked",
        }
    }

    /// Get the job ID from any event
    pub fn job_id(&self) -> &JobId {
        match self {
            Self::Published { job_id, .. }
            | Self::Received { job_id, .. }
            | Self::Acked { job_id, .. }
            | Self::Nacked { job_id, .. } => job_id,
        }
    }

    /// Get the queue name from any event
    pub fn queue(&self) -> &str {
        match self {
            Self::Published { queue, .. }
            | Self::Received { queue, .. }
            | Self::Acked { queue, .. }
            | Self::Nacked { queue, .. } => queue,
        }
    }

    /// Get the timestamp from any event
    pub fn timestamp(&self) -> &DateTime<Utc> {
        match self {
            Self::Published { at, .. }
            | Self::Received { at, .. }
            | Self::Acked { at, .. }
            | Self::Nacked { at, .. } => at,
        }
    }

    /// Ack or nack
    pub fn is_settlement(&self) -> bool {
        matches!(self, Self::Acked { .. } | Self::Nacked { .. })
    }
}
