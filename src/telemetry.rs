use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LogFormat;

/// Initialize structured logging.
///
/// - `EnvFilter` for dynamic log levels (`RUST_LOG`), defaulting to
///   `info,dialog_gateway=debug`.
/// - `tracing-subscriber::fmt` in compact or JSON form.
pub fn init(format: LogFormat) {
    let filter_layer = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,dialog_gateway=debug"));

    let registry = tracing_subscriber::registry().with(filter_layer);

    match format {
        LogFormat::Compact => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .compact(),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .json()
                    .with_current_span(true),
            )
            .init(),
    }
}
