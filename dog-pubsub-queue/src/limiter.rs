use tracing::warn;

use crate::config::Concurrency;

/// Bound used when no concurrency policy is configured
pub const DEFAULT_CONCURRENCY: usize = 20;

/// Computes how many messages a subscription may have in flight.
///
/// The value is read once when the subscription is created and handed to the
/// transport's flow control; in-flight bookkeeping is the transport's job.
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyLimiter {
    policy: Option<Concurrency>,
}

impl ConcurrencyLimiter {
    pub fn new(policy: Option<Concurrency>) -> Self {
        Self { policy }
    }

    /// Positive in-flight bound for `queue_name`
    pub fn limit_for(&self, queue_name: &str) -> usize {
        let limit = match &self.policy {
            None => DEFAULT_CONCURRENCY,
            Some(Concurrency::Fixed(limit)) => *limit,
            Some(Concurrency::PerQueue(f)) => f(queue_name),
        };

        if limit == 0 {
            warn!("Concurrency for queue {} resolved to 0, using 1", queue_name);
            return 1;
        }
        limit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::sync::Arc;

    #[test]
    fn test_default_bound() {
        let limiter = ConcurrencyLimiter::default();
        assert_eq!(limiter.limit_for("anything"), DEFAULT_CONCURRENCY);
    }

    #[test]
    fn test_fixed_bound() {
        let limiter = ConcurrencyLimiter::new(Some(Concurrency::Fixed(7)));
        assert_eq!(limiter.limit_for("a"), 7);
        assert_eq!(limiter.limit_for("b"), 7);
    }

    #[test]
    fn test_per_queue_override() {
        let limiter = ConcurrencyLimiter::new(Some(Concurrency::PerQueue(Arc::new(|queue| {
            if queue == "apply-collection-filters" { 1 } else { 20 }
        }))));

        assert_eq!(limiter.limit_for("apply-collection-filters"), 1);
        assert_eq!(limiter.limit_for("send-email"), 20);
    }

    proptest! {
        #[test]
        fn prop_limit_is_always_positive(limit in 0usize..1000, queue in "[a-z-]{1,20}") {
            let fixed = ConcurrencyLimiter::new(Some(Concurrency::Fixed(limit)));
            prop_assert!(fixed.limit_for(&queue) >= 1);

            let per_queue = ConcurrencyLimiter::new(Some(Concurrency::PerQueue(Arc::new(move |_| limit))));
            prop_assert_eq!(per_queue.limit_for(&queue), limit.max(1));
        }
    }
}
