//! Restore executor contract: the component that actually resolves and
//! materializes a dependency set. Opaque to the scheduler.

use async_trait::async_trait;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::context::JobContext;
use crate::request::RestoreRequest;

/// Failures an executor may report.
#[derive(Debug, Error)]
pub enum RestoreError {
    /// The executor observed its cancellation token and stopped cooperatively.
    #[error("restore cancelled")]
    Cancelled,
    #[error("restore failed: {0}")]
    Failed(String),
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl RestoreError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RestoreError::Cancelled)
    }
}

/// Performs one restore.
///
/// Invocations are never concurrent: the scheduler guarantees a single active
/// execution, so `context` may be mutated freely for the duration of a call.
#[async_trait]
pub trait RestoreExecutor: Send + Sync {
    /// Runs the restore described by `request`. Returns the success flag.
    ///
    /// `cancel` is linked to the scheduler lifetime; implementations should
    /// return [`RestoreError::Cancelled`] when they stop because of it.
    async fn execute(
        &self,
        request: &RestoreRequest,
        context: &JobContext,
        cancel: CancellationToken,
    ) -> Result<bool, RestoreError>;
}

#[async_trait]
impl<T: RestoreExecutor + ?Sized> RestoreExecutor for std::sync::Arc<T> {
    async fn execute(
        &self,
        request: &RestoreRequest,
        context: &JobContext,
        cancel: CancellationToken,
    ) -> Result<bool, RestoreError> {
        (**self).execute(request, context, cancel).await
    }
}
