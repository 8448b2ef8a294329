//! Logging system setup.
//!
//! Installs a tracing-subscriber registry with either human-readable or JSON
//! output. The emitter core itself only emits `tracing` events; applications
//! that do not install their own subscriber can use [`setup_logging`].

use crate::config::LoggingSettings;
use crate::error::EventError;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initializes the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level. Returns
/// [`EventError::Logging`] when a global subscriber is already installed.
pub fn setup_logging(config: &LoggingSettings) -> Result<(), EventError> {
    let log_level = config.level.as_str();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.json_format {
        registry
            .with(
                fmt::layer()
                    .json()
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()
    } else {
        registry
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_file(false)
                    .with_line_number(false)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()
    };
    result.map_err(|e| EventError::Logging(e.to_string()))?;

    info!("🔧 Logging initialized with level: {}", log_level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_second_setup_reports_error() {
        let settings = LoggingSettings {
            level: "debug".to_string(),
            json_format: false,
        };
        let _ = setup_logging(&settings);
        assert!(matches!(setup_logging(&settings), Err(EventError::Logging(_))));
    }
}
