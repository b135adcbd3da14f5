//! Single-flight restore scheduling.
//!
//! Many callers ask for restores; at most one runs at a time. Background
//! requests go through a bounded queue and are coalesced into batches by a
//! single runner task. Blocking callers skip the queue and race for the active
//! slot directly, so they are served as soon as the current restore finishes.

pub mod error;
pub mod scheduler;

pub use error::SchedulerError;
pub use scheduler::{
    BatchId, OperationHandle, PendingBatch, RestoreScheduler, RunnerState, SchedulerConfig,
    SchedulerStats,
};
