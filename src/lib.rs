//! Coalescing, single-flight restore scheduling.
//!
//! Re-exports the kernel contracts ([`restore_kernel`]) and the scheduling
//! runtime ([`restore_runtime`]) under one crate.

pub use restore_kernel as kernel;
pub use restore_runtime as runtime;

pub use restore_kernel::{
    JobContext, LogRestoreLogger, NoopRestoreExecutor, RestoreError, RestoreExecutor,
    RestoreLogger, RestoreReason, RestoreRequest,
};
pub use restore_runtime::{
    OperationHandle, RestoreScheduler, RunnerState, SchedulerConfig, SchedulerError,
    SchedulerStats,
};
