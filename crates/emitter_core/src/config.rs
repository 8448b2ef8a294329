//! Configuration for the emitter core.
//!
//! Two layers live here: the process-wide diagnostic switches that emitters
//! consult when they are created (leak threshold, backtrace capture, snapshot
//! leak warnings, dispose-with-listeners warnings) and [`EventCoreConfig`],
//! a TOML-loadable bundle that installs those switches in one step.
//!
//! Every setter returns a [`Disposable`] that restores the previous value.

use crate::error::EventError;
use crate::lifecycle::Disposable;
use crate::scheduler::SharedScheduler;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tracing::info;
use tracing_subscriber::EnvFilter;

static GLOBAL_LEAK_WARNING_THRESHOLD: AtomicI64 = AtomicI64::new(-1);
static CAPTURE_BACKTRACES: AtomicBool = AtomicBool::new(false);
static SNAPSHOT_LEAK_WARNING: AtomicBool = AtomicBool::new(false);

lazy_static! {
    static ref DISPOSE_WARNING_SCHEDULER: RwLock<Option<SharedScheduler>> = RwLock::new(None);
}

/// Leak warning threshold applied to emitters without their own. Values
/// `<= 0` disable leak tracking.
pub fn global_leak_warning_threshold() -> i64 {
    GLOBAL_LEAK_WARNING_THRESHOLD.load(Ordering::Acquire)
}

/// Sets the global leak warning threshold for emitters created afterwards.
pub fn set_global_leak_warning_threshold(threshold: i64) -> Disposable {
    let previous = GLOBAL_LEAK_WARNING_THRESHOLD.swap(threshold, Ordering::AcqRel);
    Disposable::new(move || {
        GLOBAL_LEAK_WARNING_THRESHOLD.store(previous, Ordering::Release);
    })
}

/// Captures full backtraces instead of caller locations for leak reports.
pub fn set_capture_backtraces(enabled: bool) -> Disposable {
    let previous = CAPTURE_BACKTRACES.swap(enabled, Ordering::AcqRel);
    Disposable::new(move || CAPTURE_BACKTRACES.store(previous, Ordering::Release))
}

pub(crate) fn capture_backtraces() -> bool {
    CAPTURE_BACKTRACES.load(Ordering::Acquire)
}

/// Warns when an event derived without a store gains a second listener.
pub fn set_snapshot_leak_warning(enabled: bool) -> Disposable {
    let previous = SNAPSHOT_LEAK_WARNING.swap(enabled, Ordering::AcqRel);
    Disposable::new(move || SNAPSHOT_LEAK_WARNING.store(previous, Ordering::Release))
}

pub(crate) fn snapshot_leak_warning_enabled() -> bool {
    SNAPSHOT_LEAK_WARNING.load(Ordering::Acquire)
}

/// Reports listeners still attached when their emitter is disposed.
///
/// The check runs as a microtask on `scheduler` after the dispose call.
pub fn enable_dispose_with_listeners_warning(scheduler: SharedScheduler) -> Disposable {
    let previous = DISPOSE_WARNING_SCHEDULER.write().replace(scheduler);
    Disposable::new(move || {
        *DISPOSE_WARNING_SCHEDULER.write() = previous;
    })
}

pub(crate) fn dispose_warning_scheduler() -> Option<SharedScheduler> {
    DISPOSE_WARNING_SCHEDULER.read().clone()
}

fn default_leak_warning_threshold() -> i64 {
    -1
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Emitter core configuration loaded from TOML.
///
/// ```toml
/// leak_warning_threshold = 175
/// capture_backtraces = false
/// snapshot_leak_warning = true
///
/// [logging]
/// level = "debug"
/// json_format = false
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventCoreConfig {
    /// Global leak warning threshold (`<= 0` disables tracking)
    #[serde(default = "default_leak_warning_threshold")]
    pub leak_warning_threshold: i64,
    /// Capture full backtraces for leak reports
    #[serde(default)]
    pub capture_backtraces: bool,
    /// Warn about derived events that should have been given a store
    #[serde(default)]
    pub snapshot_leak_warning: bool,
    /// Logging configuration settings
    #[serde(default)]
    pub logging: LoggingSettings,
}

/// Logging system configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingSettings {
    /// Log filter directive (trace, debug, info, warn, error, or a full
    /// `EnvFilter` directive such as `emitter_core=debug`)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Whether to output logs in JSON format
    #[serde(default)]
    pub json_format: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json_format: false,
        }
    }
}

impl Default for EventCoreConfig {
    fn default() -> Self {
        Self {
            leak_warning_threshold: default_leak_warning_threshold(),
            capture_backtraces: false,
            snapshot_leak_warning: false,
            logging: LoggingSettings::default(),
        }
    }
}

impl EventCoreConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, EventError> {
        let config: EventCoreConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, EventError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        info!("🔧 Loaded emitter configuration from {}", path.display());
        Ok(config)
    }

    /// Validates the configuration for consistency.
    pub fn validate(&self) -> Result<(), EventError> {
        if self.logging.level.trim().is_empty() {
            return Err(EventError::Config("Log level cannot be empty".to_string()));
        }
        EnvFilter::try_new(&self.logging.level).map_err(|e| {
            EventError::Config(format!("Invalid log level '{}': {}", self.logging.level, e))
        })?;
        Ok(())
    }

    /// Installs the diagnostic switches process-wide. Disposing the returned
    /// handle restores the previous values.
    pub fn apply(&self) -> Disposable {
        Disposable::combined([
            set_global_leak_warning_threshold(self.leak_warning_threshold),
            set_capture_backtraces(self.capture_backtraces),
            set_snapshot_leak_warning(self.snapshot_leak_warning),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Dispose;
    use serial_test::serial;
    use std::io::Write;

    #[test]
    fn test_defaults_from_empty_document() {
        let config = EventCoreConfig::from_toml_str("").expect("empty config is valid");
        assert_eq!(config.leak_warning_threshold, -1);
        assert!(!config.capture_backtraces);
        assert!(!config.snapshot_leak_warning);
        assert_eq!(config.logging.level, "info");
        assert!(!config.logging.json_format);
    }

    #[test]
    fn test_parse_full_document() {
        let config = EventCoreConfig::from_toml_str(
            r#"
            leak_warning_threshold = 175
            snapshot_leak_warning = true

            [logging]
            level = "emitter_core=debug"
            json_format = true
            "#,
        )
        .expect("valid config");

        assert_eq!(config.leak_warning_threshold, 175);
        assert!(config.snapshot_leak_warning);
        assert_eq!(config.logging.level, "emitter_core=debug");
        assert!(config.logging.json_format);
    }

    #[test]
    fn test_rejects_bad_values() {
        assert!(matches!(
            EventCoreConfig::from_toml_str("leak_warning_threshold = \"many\""),
            Err(EventError::ConfigParse(_))
        ));
        assert!(matches!(
            EventCoreConfig::from_toml_str("[logging]\nlevel = \"\""),
            Err(EventError::Config(_))
        ));
        assert!(matches!(
            EventCoreConfig::from_toml_str("[logging]\nlevel = \"emitter_core=verbose\""),
            Err(EventError::Config(_))
        ));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "leak_warning_threshold = 42").expect("write config");

        let config = EventCoreConfig::load(file.path()).expect("load config");
        assert_eq!(config.leak_warning_threshold, 42);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let dir = tempfile::tempdir().expect("temp dir");
        let result = EventCoreConfig::load(dir.path().join("missing.toml"));
        assert!(matches!(result, Err(EventError::Io(_))));
    }

    #[test]
    #[serial]
    fn test_apply_restores_previous_values() {
        let before = global_leak_warning_threshold();
        let config = EventCoreConfig {
            leak_warning_threshold: 12,
            capture_backtraces: true,
            snapshot_leak_warning: true,
            logging: LoggingSettings::default(),
        };

        let applied = config.apply();
        assert_eq!(global_leak_warning_threshold(), 12);
        assert!(capture_backtraces());
        assert!(snapshot_leak_warning_enabled());

        applied.dispose();
        assert_eq!(global_leak_warning_threshold(), before);
        assert!(!capture_backtraces());
        assert!(!snapshot_leak_warning_enabled());
    }
}
