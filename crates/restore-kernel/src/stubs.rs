//! Stub collaborators for tests and hosts that only need the scheduling shell.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::context::JobContext;
use crate::executor::{RestoreError, RestoreExecutor};
use crate::logger::RestoreLogger;
use crate::request::RestoreRequest;

/// Executor that succeeds immediately without doing anything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRestoreExecutor;

#[async_trait]
impl RestoreExecutor for NoopRestoreExecutor {
    async fn execute(
        &self,
        _request: &RestoreRequest,
        _context: &JobContext,
        cancel: CancellationToken,
    ) -> Result<bool, RestoreError> {
        if cancel.is_cancelled() {
            return Err(RestoreError::Cancelled);
        }
        Ok(true)
    }
}

/// Logger that discards every message.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopRestoreLogger;

impl RestoreLogger for NoopRestoreLogger {
    fn log_error(&self, _message: &str) {}
}
