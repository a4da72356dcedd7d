pub mod metrics;
pub mod analytics;

#[cfg(feature = "tracing-basic")]
pub mod tracing;

pub use metrics::{LiveMetrics, QueueMetrics};
pub use analytics::{ObservabilityLayer, PerformanceAnalytics};

#[cfg(feature = "tracing-basic")]
pub use self::tracing::{init_tracing, LogFormat};
