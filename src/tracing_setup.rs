use eyre::{Result, WrapErr};
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LoggingConfig;

/// Initialize tracing from the `logging` section of the engine configuration.
///
/// `RUST_LOG` still wins over the configured level when it is set.
pub fn init_tracing_with_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .wrap_err_with(|| format!("Invalid log level: {}", config.level))?,
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let installed = if config.json {
        Registry::default()
            .with(env_filter)
            .with(
                fmt_layer
                    .json()
                    .with_current_span(config.include_spans)
                    .with_span_list(config.include_spans),
            )
            .try_init()
    } else {
        Registry::default()
            .with(env_filter)
            .with(fmt_layer.pretty().with_ansi(true))
            .try_init()
    };
    installed.wrap_err("Failed to install tracing subscriber")?;

    tracing::info!(
        level = %config.level,
        json = config.json,
        spans = config.include_spans,
        "Courier logging initialized"
    );
    Ok(())
}

/// Span covering lifecycle work (consumer creation, start, stop) of one route.
pub fn create_route_span(route_id: &str) -> tracing::Span {
    tracing::info_span!("route", route.id = route_id)
}

/// Span covering one exchange travelling through a route chain.
pub fn create_exchange_span(route_id: &str, exchange_id: &str) -> tracing::Span {
    tracing::debug_span!(
        "exchange",
        route.id = route_id,
        exchange.id = exchange_id,
    )
}

/// Span for background work owned by a consumer (watch loop, server, queue drain).
pub fn create_consumer_span(uri: &str) -> tracing::Span {
    tracing::info_span!("consumer", endpoint.uri = uri)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_with_config() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            json: true,
            include_spans: true,
        };
        // another test may already have installed a global subscriber
        let _ = init_tracing_with_config(&config);
    }

    #[test]
    fn test_create_route_span() {
        let span = create_route_span("orders");
        if let Some(meta) = span.metadata() {
            assert_eq!(meta.name(), "route");
        }
    }

    #[test]
    fn test_create_consumer_span() {
        let span = create_consumer_span("mem:in");
        if let Some(meta) = span.metadata() {
            assert_eq!(meta.name(), "consumer");
        }
    }
}
