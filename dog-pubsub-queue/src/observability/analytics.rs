use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use tracing::debug;

use crate::{transport::BoxStream, JobEvent, JobId};

/// Lifecycle event broadcast plus live metrics
#[derive(Clone)]
pub struct ObservabilityLayer {
    event_broadcaster: broadcast::Sender<JobEvent>,
    metrics: Arc<super::LiveMetrics>,
}

impl ObservabilityLayer {
    /// Create new observability layer
    pub fn new() -> Self {
        Self::with_capacity(1000)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (event_broadcaster, _) = broadcast::channel(capacity.max(1));

        Self {
            event_broadcaster,
            metrics: Arc::new(super::LiveMetrics::new()),
        }
    }

    pub fn record_published(&self, queue: &str, job_id: &JobId) {
        self.emit(JobEvent::Published {
            job_id: job_id.clone(),
            queue: queue.to_string(),
            at: Utc::now(),
        });
        self.metrics.increment_published(queue);
        debug!("Recorded job published: {} ({})", job_id, queue);
    }

    pub fn record_received(&self, queue: &str, job_id: &JobId, attempts: u32) {
        self.emit(JobEvent::Received {
            job_id: job_id.clone(),
            queue: queue.to_string(),
            attempts,
            at: Utc::now(),
        });
        self.metrics.increment_received(queue, attempts);
    }

    pub fn record_acked(&self, queue: &str, job_id: &JobId, processing_time: Duration) {
        self.emit(JobEvent::Acked {
            job_id: job_id.clone(),
            queue: queue.to_string(),
            at: Utc::now(),
        });
        self.metrics.increment_acked(queue, processing_time);
    }

    pub fn record_nacked(&self, queue: &str, job_id: &JobId, error: &str, processing_time: Duration) {
        self.emit(JobEvent::Nacked {
            job_id: job_id.clone(),
            queue: queue.to_string(),
            error: error.to_string(),
            at: Utc::now(),
        });
        self.metrics.increment_nacked(queue, processing_time);
    }

    /// Raw event receiver
    pub fn subscribe(&self) -> broadcast::Receiver<JobEvent> {
        self.event_broadcaster.subscribe()
    }

    /// Events emitted from now on; lagged events are skipped
    pub fn event_stream(&self) -> BoxStream<JobEvent> {
        Box::pin(BroadcastStream::new(self.subscribe()).filter_map(|event| event.ok()))
    }

    /// Get live metrics
    pub fn metrics(&self) -> &super::LiveMetrics {
        &self.metrics
    }

    fn emit(&self, event: JobEvent) {
        // No receivers is fine
        let _ = self.event_broadcaster.send(event);
    }
}

impl Default for ObservabilityLayer {
    fn default() -> Self {
        Self::new()
    }
}

/// Derived rates over the live metrics
pub struct PerformanceAnalytics {
    observability: ObservabilityLayer,
}

impl PerformanceAnalytics {
    pub fn new(observability: ObservabilityLayer) -> Self {
        Self { observability }
    }

    /// Share of settled deliveries that were acked, in percent
    pub fn success_rate(&self) -> f64 {
        let acked = self.observability.metrics.jobs_acked() as f64;
        let nacked = self.observability.metrics.jobs_nacked() as f64;
        let total = acked + nacked;

        if total == 0.0 {
            100.0
        } else {
            (acked / total) * 100.0
        }
    }

    /// Share of deliveries that were redeliveries, in percent
    pub fn redelivery_rate(&self) -> f64 {
        let received = self.observability.metrics.jobs_received() as f64;
        let redeliveries = self.observability.metrics.redeliveries() as f64;

        if received == 0.0 {
            0.0
        } else {
            (redeliveries / received) * 100.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_events_reach_subscribers() {
        let layer = ObservabilityLayer::new();
        let mut events = layer.event_stream();

        let job_id = JobId::from("m-1");
        layer.record_published("q1", &job_id);
        layer.record_received("q1", &job_id, 1);

        let first = events.next().await.unwrap();
        assert_eq!(first.event_name(), "published");
        assert_eq!(first.queue(), "q1");
        let second = events.next().await.unwrap();
        assert!(matches!(second, JobEvent::Received { attempts: 1, .. }));
    }

    #[test]
    fn test_rates() {
        let layer = ObservabilityLayer::new();
        let analytics = PerformanceAnalytics::new(layer.clone());
        assert_eq!(analytics.success_rate(), 100.0);
        assert_eq!(analytics.redelivery_rate(), 0.0);

        let job_id = JobId::from("m-1");
        layer.record_received("q1", &job_id, 1);
        layer.record_nacked("q1", &job_id, "boom", Duration::from_millis(1));
        layer.record_received("q1", &job_id, 2);
        layer.record_acked("q1", &job_id, Duration::from_millis(1));

        assert_eq!(analytics.success_rate(), 50.0);
        assert_eq!(analytics.redelivery_rate(), 50.0);
    }
}
