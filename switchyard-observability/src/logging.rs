use switchyard_core::config::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

pub type InitError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Install the global subscriber.
///
/// Filter precedence: `RUST_LOG`, then `level_override` (the CLI flag), then
/// `config.level`. JSON output carries the current span's fields, so every
/// line inside a request span includes its `correlation_id`.
pub fn init(config: &LoggingConfig, level_override: Option<&str>) -> Result<(), InitError> {
    let level = level_override.unwrap_or(config.level.as_str());
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    match config.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder
            .json()
            .with_current_span(true)
            .with_span_list(false)
            .try_init(),
    }
}
