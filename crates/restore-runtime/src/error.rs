use thiserror::Error;

/// Errors surfaced by scheduler operations.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// The caller's own cancellation (or the scheduler's) fired first.
    #[error("operation cancelled")]
    Cancelled,
    /// The active slot kept changing under the promoter. Only the batch being
    /// promoted is lost; the scheduler keeps serving.
    #[error("promotion did not settle after {attempts} attempts")]
    PromotionExhausted { attempts: u32 },
    #[error("scheduler has been disposed")]
    Disposed,
    #[error("no tokio runtime available to host the background runner")]
    NoRuntime,
    #[error("blocking restore cannot run on a current-thread runtime")]
    BlockingOnCurrentThread,
    #[error("invalid scheduler configuration: {0}")]
    Config(String),
}

impl SchedulerError {
    /// True for internal consistency faults that must not be swallowed.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SchedulerError::PromotionExhausted { .. })
    }
}
