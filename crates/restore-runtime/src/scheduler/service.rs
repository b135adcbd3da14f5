//! Public face of the scheduler: coalesced and blocking entry points,
//! observability, cache clearing and lifecycle management.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use arc_swap::ArcSwap;
use restore_kernel::{JobContext, LogRestoreLogger, RestoreExecutor, RestoreLogger, RestoreRequest};
use serde::Serialize;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::batch::{CompletionGuard, OperationHandle, PendingBatch};
use super::config::SchedulerConfig;
use super::generation::Generation;
use super::queue::EnqueueOutcome;
use super::runner::{BackgroundRunner, RestoreJob, RunnerState};
use crate::error::SchedulerError;

#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub(crate) requests_accepted: AtomicU64,
    pub(crate) requests_dropped: AtomicU64,
    pub(crate) requests_coalesced: AtomicU64,
    pub(crate) batches_executed: AtomicU64,
    pub(crate) blocking_restores: AtomicU64,
    pub(crate) executor_faults: AtomicU64,
}

/// Point-in-time counters, accumulated across resets.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    pub requests_accepted: u64,
    /// Requests discarded because the queue was full.
    pub requests_dropped: u64,
    /// Requests absorbed into a batch started by an earlier request.
    pub requests_coalesced: u64,
    /// Executor invocations, background and blocking.
    pub batches_executed: u64,
    pub blocking_restores: u64,
    pub executor_faults: u64,
}

impl StatsCounters {
    fn snapshot(&self) -> SchedulerStats {
        SchedulerStats {
            requests_accepted: self.requests_accepted.load(Ordering::Relaxed),
            requests_dropped: self.requests_dropped.load(Ordering::Relaxed),
            requests_coalesced: self.requests_coalesced.load(Ordering::Relaxed),
            batches_executed: self.batches_executed.load(Ordering::Relaxed),
            blocking_restores: self.blocking_restores.load(Ordering::Relaxed),
            executor_faults: self.executor_faults.load(Ordering::Relaxed),
        }
    }
}

/// Coalescing, single-flight restore scheduler.
///
/// Background callers use [`schedule_coalesced`](Self::schedule_coalesced);
/// their requests are queued and served in batches by one runner task.
/// Callers that must wait use [`restore`](Self::restore) or
/// [`restore_blocking`](Self::restore_blocking), which bypass the queue and
/// take the active slot as soon as the current restore finishes.
pub struct RestoreScheduler {
    config: SchedulerConfig,
    job: RestoreJob,
    handle: Option<Handle>,
    current: ArcSwap<Generation>,
    next_generation: AtomicU64,
    disposed: AtomicBool,
}

impl RestoreScheduler {
    /// Builds a scheduler. The ambient tokio runtime, if any, hosts the
    /// background runner; use [`with_handle`](Self::with_handle) to pick another.
    pub fn new(
        executor: impl RestoreExecutor + 'static,
        config: SchedulerConfig,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        let stats = Arc::new(StatsCounters::default());
        Ok(Self {
            current: ArcSwap::from_pointee(Generation::new(1, &config)),
            config,
            job: RestoreJob {
                executor: Arc::new(executor),
                logger: Arc::new(LogRestoreLogger),
                stats,
            },
            handle: Handle::try_current().ok(),
            next_generation: AtomicU64::new(2),
            disposed: AtomicBool::new(false),
        })
    }

    pub fn with_logger(mut self, logger: impl RestoreLogger + 'static) -> Self {
        self.job.logger = Arc::new(logger);
        self
    }

    pub fn with_handle(mut self, handle: Handle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    fn generation(&self) -> Result<Arc<Generation>, SchedulerError> {
        if self.disposed.load(Ordering::Acquire) {
            return Err(SchedulerError::Disposed);
        }
        Ok(self.current.load_full())
    }

    fn runtime_handle(&self) -> Result<Handle, SchedulerError> {
        self.handle
            .clone()
            .or_else(|| Handle::try_current().ok())
            .ok_or(SchedulerError::NoRuntime)
    }

    /// Starts the background runner for the current generation if it is not
    /// running yet. Idempotent.
    pub fn ensure_started(&self) -> Result<(), SchedulerError> {
        let generation = self.generation()?;
        self.start_runner(&generation)
    }

    fn start_runner(&self, generation: &Arc<Generation>) -> Result<(), SchedulerError> {
        if generation.has_runner() {
            return Ok(());
        }
        let handle = self.runtime_handle()?;
        let started = generation.start_runner_with(|| {
            let queue = generation.queue.take_receiver()?;
            let runner = BackgroundRunner::new(
                Arc::clone(generation),
                queue,
                self.job.clone(),
                self.config.idle_timeout,
            );
            Some(handle.spawn(runner.run()))
        });
        if started {
            log::debug!("started restore runner for generation {}", generation.id());
        }
        Ok(())
    }

    /// Signals that the host finished loading; queued requests start flowing.
    pub fn mark_host_ready(&self) -> Result<(), SchedulerError> {
        let generation = self.generation()?;
        generation.mark_ready();
        self.start_runner(&generation)
    }

    /// Queues `request` and waits for the batch that will serve it.
    ///
    /// The wait targets whichever batch is pending right after the enqueue, so
    /// the request is either part of that batch or picked up by the next one.
    /// A full queue drops the request silently; the caller still gets the
    /// pending batch's result. `cancel` only ends this caller's wait.
    pub async fn schedule_coalesced(
        &self,
        request: RestoreRequest,
        cancel: &CancellationToken,
    ) -> Result<bool, SchedulerError> {
        let generation = self.generation()?;
        self.start_runner(&generation)?;

        let stats = &self.job.stats;
        match generation.queue.enqueue(request) {
            EnqueueOutcome::Accepted => {
                stats.requests_accepted.fetch_add(1, Ordering::Relaxed);
            }
            EnqueueOutcome::Dropped => {
                stats.requests_dropped.fetch_add(1, Ordering::Relaxed);
            }
            EnqueueOutcome::Closed => {
                log::debug!(
                    "restore queue for generation {} is closed; riding the pending batch",
                    generation.id()
                );
            }
        }

        generation.pending().wait_cancellable(cancel).await
    }

    /// Runs a restore with priority over queued background work and waits for it.
    pub async fn restore(&self, request: RestoreRequest) -> Result<bool, SchedulerError> {
        let generation = self.generation()?;
        let batch = Arc::new(PendingBatch::blocking());
        let guard = CompletionGuard::new(Arc::clone(&batch));

        if let Err(err) = generation.active.promote(&batch, &generation.cancel).await {
            if err.is_fatal() {
                self.job
                    .log_error(&format!("blocking restore could not be scheduled: {err}"));
            }
            return Err(err);
        }

        self.job
            .stats
            .blocking_restores
            .fetch_add(1, Ordering::Relaxed);
        self.job.execute(&generation, &request, guard).await
    }

    /// Synchronous form of [`restore`](Self::restore).
    ///
    /// Must not be called from a current-thread runtime. From a multi-thread
    /// runtime worker the thread is handed over with `block_in_place`.
    pub fn restore_blocking(&self, request: RestoreRequest) -> Result<bool, SchedulerError> {
        match Handle::try_current() {
            Ok(current) => match current.runtime_flavor() {
                RuntimeFlavor::CurrentThread => Err(SchedulerError::BlockingOnCurrentThread),
                _ => tokio::task::block_in_place(|| current.block_on(self.restore(request))),
            },
            Err(_) => self.runtime_handle()?.block_on(self.restore(request)),
        }
    }

    /// Drops every cached entry by installing a fresh job context.
    pub fn clear_cache(&self) {
        let previous = self.current.load().clear_context();
        log::debug!("cleared restore job context {}", previous.id());
    }

    /// The job context the next restore will receive.
    pub fn job_context(&self) -> Arc<JobContext> {
        self.current.load().context()
    }

    /// True while the active slot holds an unfinished restore.
    pub fn is_busy(&self) -> bool {
        self.current.load().active.is_busy()
    }

    /// The batch occupying the active slot.
    pub fn current_operation(&self) -> OperationHandle {
        OperationHandle::new(self.current.load().active.load())
    }

    /// The batch that queued requests are currently coalescing onto.
    pub fn pending_operation(&self) -> OperationHandle {
        OperationHandle::new(self.current.load().pending())
    }

    pub fn runner_state(&self) -> RunnerState {
        self.current.load().runner_state()
    }

    pub fn generation_id(&self) -> u64 {
        self.current.load().id()
    }

    pub fn queued_len(&self) -> usize {
        self.current.load().queue.len()
    }

    pub fn stats(&self) -> SchedulerStats {
        self.job.stats.snapshot()
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    /// Tears down the current generation and starts a fresh one, e.g. when the
    /// workspace closes. Waiters on the old generation receive `false`.
    ///
    /// New callers land on the fresh generation right away, but nothing there
    /// executes until the old generation has wound down.
    pub async fn reset(&self) -> Result<(), SchedulerError> {
        if self.is_disposed() {
            return Err(SchedulerError::Disposed);
        }
        let id = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let barrier = Arc::new(PendingBatch::background());
        let released = CompletionGuard::new(Arc::clone(&barrier));
        let previous = self
            .current
            .swap(Arc::new(Generation::behind(id, &self.config, barrier)));
        self.teardown(previous).await;
        released.complete(true);
        log::debug!("restore scheduler reset to generation {id}");
        Ok(())
    }

    /// Final teardown. Later calls fail with [`SchedulerError::Disposed`].
    pub async fn dispose(&self) {
        if self.disposed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.teardown(self.current.load_full()).await;
    }

    /// Cancels `generation` and waits, up to `shutdown_grace` in total, for its
    /// runner to stop and its last restore to finish before releasing waiters.
    async fn teardown(&self, generation: Arc<Generation>) {
        let deadline = Instant::now() + self.config.shutdown_grace;
        generation.cancel.cancel();
        if let Some(mut runner) = generation.take_runner() {
            match tokio::time::timeout_at(deadline, &mut runner).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => log::warn!(
                    "restore runner for generation {} ended abnormally: {err}",
                    generation.id()
                ),
                Err(_) => {
                    log::warn!(
                        "restore runner for generation {} did not stop within {:?}; aborting it",
                        generation.id(),
                        self.config.shutdown_grace
                    );
                    runner.abort();
                }
            }
        }
        if !generation.wait_quiescent(deadline).await {
            log::warn!(
                "restore in generation {} still running after {:?}; releasing its waiters",
                generation.id(),
                self.config.shutdown_grace
            );
        }
        generation.abandon();
    }
}

impl std::fmt::Debug for RestoreScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestoreScheduler")
            .field("config", &self.config)
            .field("generation", &self.generation_id())
            .field("runner_state", &self.runner_state())
            .field("busy", &self.is_busy())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}
