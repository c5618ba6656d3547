use crate::config::TelemetryConfig;
use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("APP_LOG_LEVEL '{value}' is not a valid log filter")]
    Filter {
        value: String,
        #[source]
        source: ParseError,
    },
    #[error("failed to install the log subscriber: {0}")]
    Install(#[source] Box<dyn std::error::Error + Send + Sync>),
}

fn log_filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.log_level).map_err(|source| TelemetryError::Filter {
        value: config.log_level.clone(),
        source,
    })
}

/// Installs the global subscriber once per process. `RUST_LOG` wins over `APP_LOG_LEVEL`;
/// later calls are no-ops so the CLI commands and tests can all call it.
pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let filter = log_filter(config)?;
    if tracing::dispatcher::has_been_set() {
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .with_ansi(false)
        .try_init()
        .map_err(TelemetryError::Install)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(level: &str) -> TelemetryConfig {
        TelemetryConfig {
            log_level: level.to_string(),
        }
    }

    #[test]
    fn malformed_level_names_the_offending_value() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        match init(&config("vendor_intake=loud[")) {
            Err(TelemetryError::Filter { value, .. }) => assert_eq!(value, "vendor_intake=loud["),
            other => panic!("expected filter error, got {other:?}"),
        }
    }

    #[test]
    fn repeated_initialisation_is_harmless() {
        init(&config("info")).expect("first init");
        init(&config("debug")).expect("second init");
    }
}
