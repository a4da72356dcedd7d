use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use futures::{FutureExt, StreamExt};
use tokio::sync::oneshot;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    codec::PayloadCodec,
    observability::ObservabilityLayer,
    process::{JobProcess, ListenerHandle},
    transport::MessageStream,
    Job, JobData, JobError, JobId, ReceivedMessage,
};

/// Consumer loop for one `(queue, process)` registration.
///
/// Pulls deliveries from a subscription stream and hands each one to its own
/// task, so the number of jobs running at once is bounded only by the
/// transport's flow-control window.
pub(crate) struct MessageListener<D, C> {
    queue_name: String,
    process: JobProcess<D>,
    codec: Arc<C>,
    observability: ObservabilityLayer,
}

impl<D: JobData, C: PayloadCodec> MessageListener<D, C> {
    pub(crate) fn new(
        queue_name: impl Into<String>,
        process: JobProcess<D>,
        codec: Arc<C>,
        observability: ObservabilityLayer,
    ) -> Self {
        Self {
            queue_name: queue_name.into(),
            process,
            codec,
            observability,
        }
    }

    /// Start consuming `stream` on a background task
    pub(crate) fn spawn(self, stream: MessageStream) -> ListenerHandle {
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let span = info_span!("listener", queue = %self.queue_name, process = %self.process.id());

        let join_handle = tokio::spawn(self.run(stream, shutdown_rx).instrument(span));

        ListenerHandle::new(shutdown_tx, join_handle)
    }

    async fn run(self, mut stream: MessageStream, mut shutdown_rx: oneshot::Receiver<()>) {
        let listener = Arc::new(self);
        info!("Listening on queue {}", listener.queue_name);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown_rx => {
                    debug!("Listener shutdown requested for queue {}", listener.queue_name);
                    break;
                }

                next = stream.next() => match next {
                    Some(message) => {
                        let listener = listener.clone();
                        tokio::spawn(async move { listener.handle(message).await }.in_current_span());
                    }
                    None => {
                        warn!("Subscription stream for queue {} ended", listener.queue_name);
                        break;
                    }
                }
            }
        }

        // Dropping the stream detaches this consumer from the subscription
        drop(stream);
        info!("Stopped listening on queue {}", listener.queue_name);
    }

    /// Process one delivery and settle it exactly once
    pub(crate) async fn handle(&self, message: ReceivedMessage) {
        let started = Instant::now();
        let job_id = JobId::from(message.id());
        let attempts = message.delivery_attempt();

        self.observability.record_received(&self.queue_name, &job_id, attempts);

        let data: D = match self.codec.decode(message.data()) {
            Ok(data) => data,
            Err(e) => {
                let err = JobError::failed(e.to_string());
                self.reject(message, &job_id, &err, started).await;
                return;
            }
        };

        let job = Job::received(
            job_id.clone(),
            self.queue_name.as_str(),
            data,
            attempts,
            message.publish_time(),
        );
        debug!(
            queue = %self.queue_name,
            message_id = %job_id,
            attempts,
            "Processing job {} on queue {}",
            job_id,
            self.queue_name
        );

        // Callback panics are isolated to this delivery
        let outcome = AssertUnwindSafe(async { self.process.call(job).await })
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| Err(JobError::Panicked(panic_message(panic.as_ref()))));

        match outcome {
            Ok(()) => {
                if let Err(e) = message.ack().await {
                    warn!("Failed to ack job {} on queue {}: {}", job_id, self.queue_name, e);
                }
                self.observability
                    .record_acked(&self.queue_name, &job_id, started.elapsed());
                info!("Job {} on queue {} completed", job_id, self.queue_name);
            }
            Err(err) => self.reject(message, &job_id, &err, started).await,
        }
    }

    async fn reject(&self, message: ReceivedMessage, job_id: &JobId, err: &JobError, started: Instant) {
        error!(
            queue = %self.queue_name,
            message_id = %job_id,
            "Failed to process job {} on queue {}: {}",
            job_id,
            self.queue_name,
            err
        );

        if let Err(e) = message.nack().await {
            warn!("Failed to nack job {} on queue {}: {}", job_id, self.queue_name, e);
        }
        self.observability
            .record_nacked(&self.queue_name, job_id, err.message(), started.elapsed());
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic".to_string()
    }
}
