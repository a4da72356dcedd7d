use tracing_subscriber::{fmt, EnvFilter};

use crate::{QueueError, QueueResult};

/// Output format for `init_tracing`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Install a global subscriber honoring `RUST_LOG` (default `info`)
pub fn init_tracing(format: LogFormat) -> QueueResult<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = fmt().with_env_filter(filter).with_target(true);

    let result = match format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };

    result.map_err(|e| QueueError::Internal(format!("Failed to install tracing subscriber: {}", e)))
}
