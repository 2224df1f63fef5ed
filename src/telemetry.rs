use tracing::Subscriber;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Build the JSON subscriber. `RUST_LOG` overrides `default_filter`.
pub fn get_subscriber(default_filter: &str) -> impl Subscriber + Send + Sync {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let formatting_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(true)
        .json()
        .with_current_span(false);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(formatting_layer)
}

/// Install the subscriber globally. `log` records (the request logger,
/// actix internals) are forwarded into it.
///
/// Returns `false` if a global subscriber was already installed.
pub fn init_telemetry(default_filter: &str) -> bool {
    get_subscriber(default_filter).try_init().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_initialization_is_refused() {
        init_telemetry("warn");
        assert!(!init_telemetry("warn"));
    }
}
