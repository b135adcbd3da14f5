//! Scheduling core: bounded request queue, coalescing batches, the single
//! active slot and the background runner that ties them together.

pub mod batch;
pub mod config;
pub mod generation;
pub mod queue;
pub mod runner;
pub mod service;
pub mod slot;

pub use batch::{BatchId, CompletionGuard, OperationHandle, PendingBatch};
pub use config::SchedulerConfig;
pub use queue::{EnqueueOutcome, RequestQueue};
pub use runner::RunnerState;
pub use service::{RestoreScheduler, SchedulerStats};
pub use slot::ActiveSlot;
