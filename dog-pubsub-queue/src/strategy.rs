use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, warn};

use crate::{
    adapter::TransportAdapter,
    codec::{JsonCodec, PayloadCodec},
    config::PubSubQueueConfig,
    listener::MessageListener,
    observability::{LiveMetrics, ObservabilityLayer},
    process::{JobProcess, ProcessRegistry},
    transport::{BoxStream, PubSubClient},
    Job, JobData, JobEvent, JobId, ProcessId, QueueError, QueueResult,
};

/// Capability set every job queue backend provides.
///
/// The host facade calls these uniformly, so a transport-backed strategy and
/// any other variant are interchangeable behind it.
#[async_trait]
pub trait JobQueueStrategy: Send + Sync + 'static {
    /// Wire the backend. Must precede `add`; `start` calls made earlier are replayed here.
    async fn init(&self) -> QueueResult<()>;

    /// Detach every listener and drop cached transport handles. Idempotent.
    async fn destroy(&self) -> QueueResult<()>;

    /// Publish a job, returning it with its transport-assigned id
    async fn add<D: JobData>(&self, job: Job<D>) -> QueueResult<Job<D>>;

    /// Attach `process` to `queue_name`. Starting the same pair twice is a no-op.
    async fn start<D: JobData>(&self, queue_name: &str, process: JobProcess<D>) -> QueueResult<()>;

    /// Detach exactly this `(queue_name, process)` pair. Absent pairs are ignored.
    async fn stop<D: JobData>(&self, queue_name: &str, process: &JobProcess<D>) -> QueueResult<()>;

    /// Lifecycle events emitted from now on
    fn events(&self) -> BoxStream<JobEvent>;
}

type StartFn<C> = Box<dyn FnOnce(&PubSubJobQueueStrategy<C>, &TransportAdapter) -> QueueResult<()> + Send>;

/// A `start` issued before `init`
struct DeferredStart<C: PayloadCodec> {
    queue_name: String,
    process_id: ProcessId,
    start: StartFn<C>,
}

struct StrategyState<C: PayloadCodec> {
    adapter: Option<Arc<TransportAdapter>>,
    deferred: Vec<DeferredStart<C>>,
}

/// Job queue strategy over a pub/sub transport.
///
/// Each logical queue maps to one topic and one subscription. Publishing never
/// waits for a consumer; consuming is at-least-once, with the callback's outcome
/// turned into an ack or a nack.
pub struct PubSubJobQueueStrategy<C: PayloadCodec = JsonCodec> {
    client: Arc<dyn PubSubClient>,
    config: PubSubQueueConfig,
    codec: Arc<C>,
    state: Mutex<StrategyState<C>>,
    registry: ProcessRegistry,
    observability: ObservabilityLayer,
}

impl PubSubJobQueueStrategy<JsonCodec> {
    /// Create a strategy with JSON payloads
    pub fn new(client: impl PubSubClient, config: PubSubQueueConfig) -> Self {
        Self::with_codec(client, config, JsonCodec)
    }
}

impl<C: PayloadCodec> PubSubJobQueueStrategy<C> {
    /// Create a strategy with a custom payload codec
    pub fn with_codec(client: impl PubSubClient, config: PubSubQueueConfig, codec: C) -> Self {
        let observability = ObservabilityLayer::with_capacity(config.event_capacity);

        Self {
            client: Arc::new(client),
            config,
            codec: Arc::new(codec),
            state: Mutex::new(StrategyState {
                adapter: None,
                deferred: Vec::new(),
            }),
            registry: ProcessRegistry::new(),
            observability,
        }
    }

    pub fn config(&self) -> &PubSubQueueConfig {
        &self.config
    }

    pub fn is_initialized(&self) -> bool {
        self.state.lock().adapter.is_some()
    }

    /// Registered `(queue, process)` listeners
    pub fn listener_count(&self) -> usize {
        self.registry.len()
    }

    /// True if this exact pair has an active listener
    pub fn is_listening<D>(&self, queue_name: &str, process: &JobProcess<D>) -> bool {
        self.registry.has(queue_name, process.id())
    }

    /// Starts waiting for `init`
    pub fn deferred_count(&self) -> usize {
        self.state.lock().deferred.len()
    }

    pub fn observability(&self) -> &ObservabilityLayer {
        &self.observability
    }

    pub fn metrics(&self) -> &LiveMetrics {
        self.observability.metrics()
    }

    fn adapter(&self) -> Option<Arc<TransportAdapter>> {
        self.state.lock().adapter.clone()
    }

    /// Resolve the subscription, open a consumer and register it, all under the registry lock
    fn start_listener<D: JobData>(
        &self,
        adapter: &TransportAdapter,
        queue_name: &str,
        process: JobProcess<D>,
    ) -> QueueResult<()> {
        let process_id = process.id();

        let registered = self.registry.register_if_absent(queue_name, process_id, || {
            let subscription = adapter.resolve_subscription(queue_name)?;
            let stream = subscription.open()?;
            let listener = MessageListener::new(
                queue_name,
                process,
                self.codec.clone(),
                self.observability.clone(),
            );
            Ok(listener.spawn(stream))
        })?;

        if registered {
            info!("Started {} on queue {}", process_id, queue_name);
        } else {
            debug!("{} already listening on queue {}", process_id, queue_name);
        }
        Ok(())
    }
}

#[async_trait]
impl<C: PayloadCodec> JobQueueStrategy for PubSubJobQueueStrategy<C> {
    async fn init(&self) -> QueueResult<()> {
        let (adapter, deferred) = {
            let mut state = self.state.lock();
            if state.adapter.is_some() {
                return Ok(());
            }
            let adapter = Arc::new(TransportAdapter::new(self.client.clone(), &self.config));
            state.adapter = Some(adapter.clone());
            (adapter, std::mem::take(&mut state.deferred))
        };

        info!(
            "Initialized pub/sub job queue with {} queues, replaying {} deferred starts",
            self.config.queue_pairs.len(),
            deferred.len()
        );

        let mut first_error = None;
        for pending in deferred {
            if let Err(e) = (pending.start)(self, &adapter) {
                error!("Deferred start on queue {} failed: {}", pending.queue_name, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn destroy(&self) -> QueueResult<()> {
        let adapter = {
            let mut state = self.state.lock();
            state.deferred.clear();
            state.adapter.clone()
        };

        let listeners = self.registry.drain();
        let stopped = listeners.len();
        for (queue_name, listener) in listeners {
            if let Err(e) = listener.shutdown().await {
                warn!("Listener on queue {} did not stop cleanly: {}", queue_name, e);
            }
        }

        if let Some(adapter) = adapter {
            adapter.clear();
        }

        info!("Destroyed pub/sub job queue ({} listeners stopped)", stopped);
        Ok(())
    }

    #[instrument(skip(self, job), fields(queue = %job.queue_name()))]
    async fn add<D: JobData>(&self, job: Job<D>) -> QueueResult<Job<D>> {
        let adapter = self.adapter().ok_or(QueueError::NotInitialized)?;
        let topic = adapter.resolve_topic(job.queue_name())?;

        let (queue_name, data) = job.into_parts();
        let payload = self.codec.encode(&data)?;
        let message_id = topic.publish(payload).await?;

        let job_id = JobId::from(message_id);
        self.observability.record_published(&queue_name, &job_id);
        debug!("Published job {} to queue {}", job_id, queue_name);

        Ok(Job::published(job_id, queue_name, data))
    }

    async fn start<D: JobData>(&self, queue_name: &str, process: JobProcess<D>) -> QueueResult<()> {
        let adapter = {
            let mut state = self.state.lock();
            match state.adapter.clone() {
                Some(adapter) => adapter,
                None => {
                    let process_id = process.id();
                    let already_buffered = state
                        .deferred
                        .iter()
                        .any(|d| d.queue_name == queue_name && d.process_id == process_id);

                    if !already_buffered {
                        let queue = queue_name.to_string();
                        state.deferred.push(DeferredStart {
                            queue_name: queue_name.to_string(),
                            process_id,
                            start: Box::new(move |strategy: &Self, adapter: &TransportAdapter| {
                                strategy.start_listener(adapter, &queue, process)
                            }),
                        });
                        debug!("Deferred start of {} on queue {} until init", process_id, queue_name);
                    }
                    return Ok(());
                }
            }
        };

        self.start_listener(&adapter, queue_name, process)
    }

    async fn stop<D: JobData>(&self, queue_name: &str, process: &JobProcess<D>) -> QueueResult<()> {
        let process_id = process.id();

        match self.registry.get_and_delete(queue_name, process_id) {
            Some(listener) => {
                listener.shutdown().await?;
                info!("Stopped {} on queue {}", process_id, queue_name);
            }
            None => {
                let mut state = self.state.lock();
                let before = state.deferred.len();
                state
                    .deferred
                    .retain(|d| !(d.queue_name == queue_name && d.process_id == process_id));
                if state.deferred.len() < before {
                    debug!("Dropped deferred start of {} on queue {}", process_id, queue_name);
                }
            }
        }
        Ok(())
    }

    fn events(&self) -> BoxStream<JobEvent> {
        self.observability.event_stream()
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;
    use crate::transport::memory::MemoryPubSub;
    use serde_json::{json, Value};

    fn strategy() -> (MemoryPubSub, PubSubJobQueueStrategy) {
        let pubsub = MemoryPubSub::new();
        let config = PubSubQueueConfig::new().with_queue("q1", "t1", "s1");
        (pubsub.clone(), PubSubJobQueueStrategy::new(pubsub, config))
    }

    fn noop() -> JobProcess<Value> {
        JobProcess::new(|_: Job<Value>| async { Ok(()) })
    }

    #[tokio::test]
    async fn test_init_is_idempotent() {
        let (_, strategy) = strategy();
        assert!(!strategy.is_initialized());

        strategy.init().await.unwrap();
        strategy.init().await.unwrap();
        assert!(strategy.is_initialized());
    }

    #[tokio::test]
    async fn test_deferred_start_is_buffered_once() {
        let (pubsub, strategy) = strategy();
        let process = noop();

        strategy.start("q1", process.clone()).await.unwrap();
        strategy.start("q1", process.clone()).await.unwrap();
        assert_eq!(strategy.deferred_count(), 1);
        assert_eq!(pubsub.subscription_handles_created(), 0);

        strategy.init().await.unwrap();
        assert_eq!(strategy.deferred_count(), 0);
        assert!(strategy.is_listening("q1", &process));
        assert_eq!(pubsub.consumer_count("s1"), 1);

        strategy.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_before_init_drops_deferred_start() {
        let (_, strategy) = strategy();
        let process = noop();

        strategy.start("q1", process.clone()).await.unwrap();
        strategy.stop("q1", &process).await.unwrap();
        assert_eq!(strategy.deferred_count(), 0);

        strategy.init().await.unwrap();
        assert_eq!(strategy.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_failed_replay_still_replays_the_rest() {
        let (pubsub, strategy) = strategy();
        let good = noop();

        strategy.start("missing", noop()).await.unwrap();
        strategy.start("q1", good.clone()).await.unwrap();

        let err = strategy.init().await.unwrap_err();
        assert!(matches!(&err, QueueError::NoSubscriptionConfigured(q) if q == "missing"));
        assert!(strategy.is_listening("q1", &good));
        assert_eq!(pubsub.consumer_count("s1"), 1);

        strategy.destroy().await.unwrap();
    }

    #[tokio::test]
    async fn test_destroy_clears_listeners_and_keeps_add_working() {
        let (pubsub, strategy) = strategy();
        strategy.init().await.unwrap();
        strategy.start("q1", noop()).await.unwrap();
        strategy.add(Job::new("q1", json!(1))).await.unwrap();

        strategy.destroy().await.unwrap();
        assert_eq!(strategy.listener_count(), 0);
        assert_eq!(pubsub.consumer_count("s1"), 0);

        strategy.add(Job::new("q1", json!(2))).await.unwrap();
        assert_eq!(pubsub.topic_handles_created(), 2);
    }
}
