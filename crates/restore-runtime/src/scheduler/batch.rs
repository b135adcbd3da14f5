//! Pending batches: one-shot, multi-waiter results for a coalesced restore.
//!
//! A batch moves through created -> promoted -> completed. The result is
//! assigned at most once; the first writer wins and later writes are ignored.
//! Batch identity is only used for compare-and-swap bookkeeping on the
//! scheduler's slots.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::error::SchedulerError;

static NEXT_BATCH_ID: AtomicU64 = AtomicU64::new(1);

/// Monotonic batch identifier, for diagnostics.
pub type BatchId = u64;

pub struct PendingBatch {
    id: BatchId,
    blocking: bool,
    created_at: DateTime<Utc>,
    result: watch::Sender<Option<bool>>,
}

impl PendingBatch {
    fn with_flag(blocking: bool) -> Self {
        let (result, _) = watch::channel(None);
        Self {
            id: NEXT_BATCH_ID.fetch_add(1, Ordering::Relaxed),
            blocking,
            created_at: Utc::now(),
            result,
        }
    }

    /// A batch that collects queued background requests.
    pub fn background() -> Self {
        Self::with_flag(false)
    }

    /// A batch created for a caller that waits synchronously on the restore.
    pub fn blocking() -> Self {
        Self::with_flag(true)
    }

    /// An already finished batch; seeds the active slot so it is never empty.
    pub fn completed(success: bool) -> Self {
        let batch = Self::background();
        batch.complete(success);
        batch
    }

    pub fn id(&self) -> BatchId {
        self.id
    }

    pub fn is_blocking(&self) -> bool {
        self.blocking
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Sets the result if none was set yet. Returns whether this call won.
    pub fn complete(&self, success: bool) -> bool {
        self.result.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = Some(success);
            true
        })
    }

    /// Completes with `false` so that no waiter hangs on an abandoned batch.
    pub fn force_complete(&self) -> bool {
        let forced = self.complete(false);
        if forced {
            log::debug!("force-completed abandoned restore batch {}", self.id);
        }
        forced
    }

    pub fn result(&self) -> Option<bool> {
        *self.result.borrow()
    }

    pub fn is_completed(&self) -> bool {
        self.result().is_some()
    }

    /// Waits for the result.
    pub async fn wait(&self) -> bool {
        let mut rx = self.result.subscribe();
        let settled = rx.wait_for(Option::is_some).await.map(|value| *value);
        settled.ok().flatten().unwrap_or(false)
    }

    /// Waits for the result unless `cancel` fires first. Cancelling one waiter
    /// leaves the batch and every other waiter untouched.
    pub async fn wait_cancellable(&self, cancel: &CancellationToken) -> Result<bool, SchedulerError> {
        tokio::select! {
            biased;
            success = self.wait() => Ok(success),
            _ = cancel.cancelled() => Err(SchedulerError::Cancelled),
        }
    }
}

impl fmt::Debug for PendingBatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingBatch")
            .field("id", &self.id)
            .field("blocking", &self.blocking)
            .field("result", &self.result())
            .finish()
    }
}

/// Owns a promoted batch for the duration of its execution. If the guard is
/// dropped before [`CompletionGuard::complete`] runs (cancellation, a fault
/// unwinding out of the scope), the batch is force-completed with `false`.
#[derive(Debug)]
pub struct CompletionGuard {
    batch: Option<Arc<PendingBatch>>,
}

impl CompletionGuard {
    pub fn new(batch: Arc<PendingBatch>) -> Self {
        Self { batch: Some(batch) }
    }

    pub fn batch(&self) -> Option<&Arc<PendingBatch>> {
        self.batch.as_ref()
    }

    pub fn complete(mut self, success: bool) -> bool {
        self.batch
            .take()
            .map(|batch| batch.complete(success))
            .unwrap_or(false)
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(batch) = self.batch.take() {
            batch.force_complete();
        }
    }
}

/// Read-only view of a batch, handed out to observers.
#[derive(Clone, Debug)]
pub struct OperationHandle {
    batch: Arc<PendingBatch>,
}

impl OperationHandle {
    pub(crate) fn new(batch: Arc<PendingBatch>) -> Self {
        Self { batch }
    }

    pub fn id(&self) -> BatchId {
        self.batch.id()
    }

    pub fn is_blocking(&self) -> bool {
        self.batch.is_blocking()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.batch.created_at()
    }

    pub fn is_completed(&self) -> bool {
        self.batch.is_completed()
    }

    pub fn result(&self) -> Option<bool> {
        self.batch.result()
    }

    pub async fn wait(&self) -> bool {
        self.batch.wait().await
    }

    pub fn same_batch(&self, other: &OperationHandle) -> bool {
        Arc::ptr_eq(&self.batch, &other.batch)
    }
}
