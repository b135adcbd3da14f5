//! Diagnostics sink for restore failures.

/// Best-effort error sink. Callers must not rely on delivery; the scheduler
/// shields itself from panics raised here.
pub trait RestoreLogger: Send + Sync {
    fn log_error(&self, message: &str);
}

/// Forwards to the `log` facade under the `restore` target.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogRestoreLogger;

impl RestoreLogger for LogRestoreLogger {
    fn log_error(&self, message: &str) {
        log::error!(target: "restore", "{message}");
    }
}

impl<T: RestoreLogger + ?Sized> RestoreLogger for std::sync::Arc<T> {
    fn log_error(&self, message: &str) {
        (**self).log_error(message)
    }
}
