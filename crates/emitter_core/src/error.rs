//! # Error Types
//!
//! Errors surfaced by the emitter core and the process-wide reporter used as
//! the default sink for listener failures.
//!
//! Listener failures never propagate to the code that fired the event. They
//! are converted into an [`EventError`] and handed to an [`ErrorHandler`]:
//! either the one configured on the emitter, or [`on_unexpected_error`].

use crate::lifecycle::Disposable;
use lazy_static::lazy_static;
use parking_lot::RwLock;
use std::any::Any;
use std::sync::Arc;
use tracing::error;

/// Boxed error type returned by futures registered through `wait_until`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors that can occur while delivering or configuring events.
#[derive(Debug, thiserror::Error)]
pub enum EventError {
    /// A listener panicked during synchronous delivery
    #[error("Listener panicked: {0}")]
    ListenerPanicked(String),

    /// A future registered through `wait_until` resolved to an error
    #[error("Async listener failed: {0}")]
    ListenerFailed(#[source] BoxError),

    /// `wait_until` was called after the listener already returned
    #[error("waitUntil can NOT be called asynchronously, the listener has already returned")]
    WaitUntilAfterDelivery,

    /// No async runtime was available for a runtime-backed scheduler
    #[error("Runtime unavailable: {0}")]
    Runtime(String),

    /// Configuration values failed validation
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// IO error while reading configuration
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The tracing subscriber could not be installed
    #[error("Logging setup failed: {0}")]
    Logging(String),
}

/// Callback invoked with errors raised by listeners.
pub type ErrorHandler = Arc<dyn Fn(&EventError) + Send + Sync>;

lazy_static! {
    static ref UNEXPECTED_ERROR_HANDLER: RwLock<Option<ErrorHandler>> = RwLock::new(None);
}

/// Reports an error that no caller is able to handle.
///
/// Routes to the handler installed with [`set_unexpected_error_handler`], or
/// logs the error when none is installed.
pub fn on_unexpected_error(err: &EventError) {
    let handler = UNEXPECTED_ERROR_HANDLER.read().clone();
    match handler {
        Some(handler) => handler(err),
        None => error!("🔴 Unexpected error in event listener: {}", err),
    }
}

/// Returns an [`ErrorHandler`] that forwards to [`on_unexpected_error`].
pub fn default_error_handler() -> ErrorHandler {
    Arc::new(on_unexpected_error)
}

/// Installs a process-wide handler for unexpected errors.
///
/// Disposing the returned handle restores whatever handler was installed
/// before this call.
pub fn set_unexpected_error_handler(handler: ErrorHandler) -> Disposable {
    let previous = UNEXPECTED_ERROR_HANDLER.write().replace(handler);
    Disposable::new(move || {
        *UNEXPECTED_ERROR_HANDLER.write() = previous;
    })
}

/// Converts a panic payload into a readable message.
pub(crate) fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Dispose;
    use parking_lot::Mutex;
    use serial_test::serial;

    #[test]
    fn test_panic_message_variants() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("owned".to_string())), "owned");
        assert_eq!(panic_message(Box::new(42_u8)), "unknown panic payload");
    }

    #[test]
    #[serial]
    fn test_unexpected_error_handler_is_scoped() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let restore = set_unexpected_error_handler(Arc::new(move |err: &EventError| {
            sink.lock().push(err.to_string());
        }));

        on_unexpected_error(&EventError::ListenerPanicked("first".to_string()));
        restore.dispose();
        on_unexpected_error(&EventError::ListenerPanicked("second".to_string()));

        assert_eq!(*seen.lock(), vec!["Listener panicked: first".to_string()]);
    }
}
