//! Per-lifecycle scheduler state.
//!
//! Everything a workspace session touches lives here: the queue, both batch
//! slots, the job context, the runner handle and the cancellation token. A
//! reset tears a generation down and swaps in a new one, so callers of the
//! next session never see objects from the previous one.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use arc_swap::ArcSwap;
use restore_kernel::JobContext;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::batch::PendingBatch;
use super::config::SchedulerConfig;
use super::queue::RequestQueue;
use super::runner::RunnerState;
use super::slot::ActiveSlot;

#[derive(Debug)]
pub struct Generation {
    id: u64,
    pub(crate) cancel: CancellationToken,
    pub(crate) queue: RequestQueue,
    pub(crate) active: ActiveSlot,
    pending: ArcSwap<PendingBatch>,
    context: ArcSwap<JobContext>,
    ready: watch::Sender<bool>,
    runner: Mutex<Option<JoinHandle<()>>>,
    state: AtomicU8,
}

impl Generation {
    pub fn new(id: u64, config: &SchedulerConfig) -> Self {
        Self::with_slot(id, config, ActiveSlot::new(config.max_promotion_attempts))
    }

    /// A generation whose active slot starts out held by `barrier`. Nothing in
    /// it executes until the barrier completes.
    pub fn behind(id: u64, config: &SchedulerConfig, barrier: Arc<PendingBatch>) -> Self {
        Self::with_slot(
            id,
            config,
            ActiveSlot::occupied_by(barrier, config.max_promotion_attempts),
        )
    }

    fn with_slot(id: u64, config: &SchedulerConfig, active: ActiveSlot) -> Self {
        let (ready, _) = watch::channel(!config.require_host_ready);
        Self {
            id,
            cancel: CancellationToken::new(),
            queue: RequestQueue::new(config.queue_capacity),
            active,
            pending: ArcSwap::from_pointee(PendingBatch::background()),
            context: ArcSwap::from_pointee(JobContext::new()),
            ready,
            runner: Mutex::new(None),
            state: AtomicU8::new(RunnerState::Idle as u8),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// The batch new background requests will be served by.
    pub fn pending(&self) -> Arc<PendingBatch> {
        self.pending.load_full()
    }

    /// Replaces `promoted` with a fresh pending batch, unless someone already
    /// replaced it. A lost swap just discards the fresh batch.
    pub fn rotate_pending(&self, promoted: &Arc<PendingBatch>) -> bool {
        let fresh = Arc::new(PendingBatch::background());
        let previous = self.pending.compare_and_swap(promoted, fresh);
        Arc::ptr_eq(&*previous, promoted)
    }

    pub fn context(&self) -> Arc<JobContext> {
        self.context.load_full()
    }

    pub fn clear_context(&self) -> Arc<JobContext> {
        self.context.swap(Arc::new(JobContext::new()))
    }

    pub fn mark_ready(&self) {
        self.ready.send_if_modified(|ready| !std::mem::replace(ready, true));
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.borrow()
    }

    /// Resolves once the host has signalled readiness. `false` if cancelled first.
    pub async fn wait_ready(&self) -> bool {
        let mut rx = self.ready.subscribe();
        let opened = async move { rx.wait_for(|ready| *ready).await.is_ok() };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => false,
            ready = opened => ready,
        }
    }

    pub fn runner_state(&self) -> RunnerState {
        RunnerState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub(crate) fn set_runner_state(&self, state: RunnerState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn runner_slot(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.runner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn has_runner(&self) -> bool {
        self.runner_slot().is_some()
    }

    /// Starts the runner through `spawn` unless one is already attached.
    /// `spawn` returns `None` once the queue receiver has been claimed.
    pub(crate) fn start_runner_with(
        &self,
        spawn: impl FnOnce() -> Option<JoinHandle<()>>,
    ) -> bool {
        let mut slot = self.runner_slot();
        if slot.is_some() {
            return false;
        }
        *slot = spawn();
        slot.is_some()
    }

    pub(crate) fn take_runner(&self) -> Option<JoinHandle<()>> {
        self.runner_slot().take()
    }

    /// Waits until the active slot holds a completed batch that nobody has
    /// replaced in the meantime. Gives up at `deadline`.
    pub async fn wait_quiescent(&self, deadline: Instant) -> bool {
        loop {
            let occupant = self.active.load();
            if tokio::time::timeout_at(deadline, occupant.wait()).await.is_err() {
                return false;
            }
            if Arc::ptr_eq(&self.active.load(), &occupant) {
                return true;
            }
        }
    }

    /// Releases every waiter still attached to this generation.
    pub fn abandon(&self) {
        self.pending.load().force_complete();
        self.active.abandon();
        let discarded = self.queue.discard_unclaimed();
        if discarded > 0 {
            log::debug!(
                "discarded {discarded} queued restore requests from generation {}",
                self.id
            );
        }
    }
}
