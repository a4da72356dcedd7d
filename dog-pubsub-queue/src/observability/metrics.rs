use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::RwLock;

/// Live counters for queue traffic
#[derive(Default)]
pub struct LiveMetrics {
    jobs_published: AtomicU64,
    jobs_received: AtomicU64,
    jobs_acked: AtomicU64,
    jobs_nacked: AtomicU64,
    redeliveries: AtomicU64,

    // Per-queue metrics
    queues: RwLock<HashMap<String, QueueMetrics>>,
}

/// Counters and timing for one queue
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueMetrics {
    pub published: u64,
    pub received: u64,
    pub acked: u64,
    pub nacked: u64,
    pub redeliveries: u64,
    pub avg_processing_time: Duration,
    samples: u64,
}

impl QueueMetrics {
    fn record_processing_time(&mut self, duration: Duration) {
        // Running mean
        let total = self.avg_processing_time.as_nanos() * self.samples as u128 + duration.as_nanos();
        self.samples += 1;
        self.avg_processing_time = Duration::from_nanos((total / self.samples as u128) as u64);
    }
}

impl LiveMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn increment_published(&self, queue: &str) {
        self.jobs_published.fetch_add(1, Ordering::Relaxed);
        self.with_queue(queue, |m| m.published += 1);
    }

    pub fn increment_received(&self, queue: &str, attempts: u32) {
        self.jobs_received.fetch_add(1, Ordering::Relaxed);
        let redelivery = attempts > 1;
        if redelivery {
            self.redeliveries.fetch_add(1, Ordering::Relaxed);
        }
        self.with_queue(queue, |m| {
            m.received += 1;
            if redelivery {
                m.redeliveries += 1;
            }
        });
    }

    pub fn increment_acked(&self, queue: &str, processing_time: Duration) {
        self.jobs_acked.fetch_add(1, Ordering::Relaxed);
        self.with_queue(queue, |m| {
            m.acked += 1;
            m.record_processing_time(processing_time);
        });
    }

    pub fn increment_nacked(&self, queue: &str, processing_time: Duration) {
        self.jobs_nacked.fetch_add(1, Ordering::Relaxed);
        self.with_queue(queue, |m| {
            m.nacked += 1;
            m.record_processing_time(processing_time);
        });
    }

    // Getters for global metrics
    pub fn jobs_published(&self) -> u64 {
        self.jobs_published.load(Ordering::Relaxed)
    }

    pub fn jobs_received(&self) -> u64 {
        self.jobs_received.load(Ordering::Relaxed)
    }

    pub fn jobs_acked(&self) -> u64 {
        self.jobs_acked.load(Ordering::Relaxed)
    }

    pub fn jobs_nacked(&self) -> u64 {
        self.jobs_nacked.load(Ordering::Relaxed)
    }

    pub fn redeliveries(&self) -> u64 {
        self.redeliveries.load(Ordering::Relaxed)
    }

    /// Get metrics for a specific queue
    pub fn queue_metrics(&self, queue: &str) -> Option<QueueMetrics> {
        self.queues.read().get(queue).cloned()
    }

    /// Get all queue metrics
    pub fn all_queue_metrics(&self) -> HashMap<String, QueueMetrics> {
        self.queues.read().clone()
    }

    fn with_queue(&self, queue: &str, f: impl FnOnce(&mut QueueMetrics)) {
        let mut queues = self.queues.write();
        f(queues.entry(queue.to_string()).or_default());
    }
}
