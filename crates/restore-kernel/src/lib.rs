//! Restore kernel contracts.
//!
//! Minimal set of types shared between the scheduling runtime and its
//! collaborators: the request (why a restore is needed), the job context
//! (caches reused across sequential restores), the executor (does the actual
//! work) and the logger (best-effort diagnostics sink).

pub mod context;
pub mod executor;
pub mod logger;
pub mod request;
pub mod stubs;

pub use context::{ContextId, JobContext};
pub use executor::{RestoreError, RestoreExecutor};
pub use logger::{LogRestoreLogger, RestoreLogger};
pub use request::{RestoreReason, RestoreRequest};
pub use stubs::{NoopRestoreExecutor, NoopRestoreLogger};
