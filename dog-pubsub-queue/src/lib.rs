//! # dog-pubsub-queue: Job Queue Strategy over Pub/Sub Transports
//!
//! Dispatches background jobs to named queues backed by a topic/subscription
//! messaging system, with per-queue flow control and at-least-once delivery.
//!
//! ## Features
//!
//! - **Transport-pluggable**: the strategy only needs a topic to publish to and a
//!   subscription to consume from; `MemoryPubSub` ships for tests and local runs
//! - **Per-queue concurrency**: a fixed or computed in-flight bound, handed to the
//!   transport's flow control when the subscription is created
//! - **Ack/nack semantics**: a callback that returns `Ok` acks its message, an error
//!   or a panic nacks it and the transport redelivers
//! - **Idempotent registration**: each `(queue, callback)` pair has at most one listener
//! - **Structured observability**: `tracing` logs, a lifecycle event stream and live metrics
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dog_pubsub_queue::prelude::*;
//! use dog_pubsub_queue::transport::memory::MemoryPubSub;
//! use serde_json::json;
//!
//! let config = PubSubQueueConfig::new()
//!     .with_queue("apply-collection-filters", "filters-topic", "filters-sub")
//!     .with_concurrency_fn(|queue| if queue == "apply-collection-filters" { 1 } else { 20 });
//!
//! let strategy = PubSubJobQueueStrategy::new(MemoryPubSub::new(), config);
//! strategy.init().await?;
//!
//! let process = JobProcess::new(|job: Job| async move {
//!     println!("filtering {}", job.data());
//!     Ok(())
//! });
//! strategy.start("apply-collection-filters", process.clone()).await?;
//!
//! let job = strategy
//!     .add(Job::new("apply-collection-filters", json!({ "collection": 42 })))
//!     .await?;
//! assert_eq!(job.state(), JobState::Pending);
//!
//! strategy.stop("apply-collection-filters", &process).await?;
//! strategy.destroy().await?;
//! ```

pub mod adapter;
pub mod codec;
pub mod config;
pub mod error;
pub mod limiter;
mod listener;
pub mod observability;
pub mod process;
pub mod queue;
pub mod strategy;
pub mod transport;
pub mod types;

// Core API exports
pub use adapter::TransportAdapter;
pub use codec::{JsonCodec, PayloadCodec};
pub use config::{Concurrency, PubSubQueueConfig, QueuePair};
pub use error::{JobError, QueueError, QueueResult};
pub use limiter::{ConcurrencyLimiter, DEFAULT_CONCURRENCY};
pub use process::{JobProcess, ListenerHandle, ProcessRegistry};
pub use queue::JobQueue;
pub use strategy::{JobQueueStrategy, PubSubJobQueueStrategy};
pub use types::{Job, JobData, JobEvent, JobId, JobState, MessageAcker, ProcessId, ReceivedMessage};

// Observability exports
pub use observability::{LiveMetrics, ObservabilityLayer, PerformanceAnalytics};

#[cfg(feature = "memory")]
pub use transport::memory::MemoryPubSub;

/// Everything needed to publish and consume jobs
pub mod prelude {
    pub use crate::{
        JobQueue, JobQueueStrategy, PubSubJobQueueStrategy, PubSubQueueConfig,
    };

    pub use crate::{Job, JobError, JobEvent, JobId, JobProcess, JobState, QueueError, QueueResult};

    pub use crate::transport::{PubSubClient, Subscription, Topic};

    pub use async_trait::async_trait;
}
