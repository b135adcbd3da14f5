//! Background runner: the single consumer of the request queue.
//!
//! Each turn takes the first queued request, promotes the current pending
//! batch into the active slot, absorbs follow-up requests until the queue goes
//! quiet for the idle window, rotates in a fresh pending batch and executes.
//! Only the first request of a turn reaches the executor; the rest exist to
//! collapse a burst of triggers into one restore.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use restore_kernel::{RestoreExecutor, RestoreLogger, RestoreRequest};
use tokio_util::sync::CancellationToken;

use super::batch::CompletionGuard;
use super::generation::Generation;
use super::queue::{DrainStep, QueueReceiver};
use super::service::StatsCounters;
use crate::error::SchedulerError;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RunnerState {
    /// Not started yet, or between turns.
    Idle = 0,
    WaitingForHost = 1,
    WaitingForFirst = 2,
    Promoting = 3,
    Draining = 4,
    Executing = 5,
    Stopped = 6,
}

impl RunnerState {
    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => RunnerState::WaitingForHost,
            2 => RunnerState::WaitingForFirst,
            3 => RunnerState::Promoting,
            4 => RunnerState::Draining,
            5 => RunnerState::Executing,
            6 => RunnerState::Stopped,
            _ => RunnerState::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunnerState::Idle => "idle",
            RunnerState::WaitingForHost => "waiting_for_host",
            RunnerState::WaitingForFirst => "waiting_for_first",
            RunnerState::Promoting => "promoting",
            RunnerState::Draining => "draining",
            RunnerState::Executing => "executing",
            RunnerState::Stopped => "stopped",
        }
    }
}

/// Executor and logger shared by the runner and the blocking entry point.
#[derive(Clone)]
pub(crate) struct RestoreJob {
    pub(crate) executor: Arc<dyn RestoreExecutor>,
    pub(crate) logger: Arc<dyn RestoreLogger>,
    pub(crate) stats: Arc<StatsCounters>,
}

impl RestoreJob {
    /// Reports through the logger collaborator; a panicking logger is shrugged off.
    pub(crate) fn log_error(&self, message: &str) {
        let logger = &self.logger;
        if std::panic::catch_unwind(AssertUnwindSafe(|| logger.log_error(message))).is_err() {
            log::warn!("restore logger panicked while reporting: {message}");
        }
    }

    /// Executes `request` for the promoted batch held by `guard` and publishes
    /// the outcome to every waiter on that batch.
    ///
    /// Executor faults and panics become `Ok(false)`. Only cancellation of the
    /// generation itself surfaces as `Err(Cancelled)`; the guard then
    /// force-completes the batch. The returned value is always the one the
    /// batch settled on.
    pub(crate) async fn execute(
        &self,
        generation: &Generation,
        request: &RestoreRequest,
        guard: CompletionGuard,
    ) -> Result<bool, SchedulerError> {
        let context = generation.context();
        let cancel = generation.cancel.child_token();
        self.stats.batches_executed.fetch_add(1, Ordering::Relaxed);

        let outcome = AssertUnwindSafe(self.executor.execute(request, &context, cancel))
            .catch_unwind()
            .await;

        let success = match outcome {
            Ok(Ok(success)) => success,
            Ok(Err(err)) if err.is_cancelled() => {
                if generation.is_cancelled() {
                    return Err(SchedulerError::Cancelled);
                }
                log::debug!("restore ({}) was cancelled by the executor", request.reason);
                false
            }
            Ok(Err(err)) => {
                self.stats.executor_faults.fetch_add(1, Ordering::Relaxed);
                self.log_error(&format!("restore ({}) failed: {err}", request.reason));
                false
            }
            Err(panic) => {
                self.stats.executor_faults.fetch_add(1, Ordering::Relaxed);
                self.log_error(&format!(
                    "restore ({}) panicked: {}",
                    request.reason,
                    panic_message(panic.as_ref())
                ));
                false
            }
        };

        let batch = guard.batch().map(Arc::clone);
        guard.complete(success);
        // A teardown may have settled the batch first; report what waiters saw.
        Ok(batch.and_then(|batch| batch.result()).unwrap_or(success))
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

pub(crate) struct BackgroundRunner {
    generation: Arc<Generation>,
    queue: QueueReceiver,
    job: RestoreJob,
    idle_timeout: Duration,
}

impl BackgroundRunner {
    pub(crate) fn new(
        generation: Arc<Generation>,
        queue: QueueReceiver,
        job: RestoreJob,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            generation,
            queue,
            job,
            idle_timeout,
        }
    }

    fn set_state(&self, state: RunnerState) {
        self.generation.set_runner_state(state);
    }

    pub(crate) async fn run(mut self) {
        let generation_id = self.generation.id();
        log::debug!("restore runner started for generation {generation_id}");

        self.set_state(RunnerState::WaitingForHost);
        if self.generation.wait_ready().await {
            loop {
                match self.turn().await {
                    Ok(true) => self.set_state(RunnerState::Idle),
                    Ok(false) | Err(SchedulerError::Cancelled) => break,
                    Err(err) => {
                        self.job
                            .log_error(&format!("restore runner dropped a batch: {err}"));
                        self.set_state(RunnerState::Idle);
                    }
                }
            }
        }

        self.stop();
        log::debug!("restore runner stopped for generation {generation_id}");
    }

    /// One dequeue/promote/drain/execute cycle. `Ok(false)` when there is
    /// nothing left to serve (cancelled or queue closed). Any other error only
    /// costs the current batch.
    async fn turn(&mut self) -> Result<bool, SchedulerError> {
        let cancel = self.generation.cancel.clone();

        self.set_state(RunnerState::WaitingForFirst);
        let Some(request) = self.queue.dequeue(&cancel).await else {
            return Ok(false);
        };

        let batch = self.generation.pending();
        let guard = CompletionGuard::new(Arc::clone(&batch));

        self.set_state(RunnerState::Promoting);
        if let Err(err) = self.generation.active.promote(&batch, &cancel).await {
            // The guard fails this batch; later requests need a fresh one.
            self.generation.rotate_pending(&batch);
            return Err(err);
        }

        self.set_state(RunnerState::Draining);
        let absorbed = self.drain(&cancel).await;
        if cancel.is_cancelled() {
            return Err(SchedulerError::Cancelled);
        }
        if absorbed > 0 {
            self.job
                .stats
                .requests_coalesced
                .fetch_add(absorbed as u64, Ordering::Relaxed);
            log::debug!(
                "coalesced {absorbed} extra restore requests into batch {}",
                batch.id()
            );
        }

        if !self.generation.rotate_pending(&batch) {
            log::debug!("pending batch {} was already replaced", batch.id());
        }

        self.set_state(RunnerState::Executing);
        self.job.execute(&self.generation, &request, guard).await?;
        Ok(true)
    }

    async fn drain(&mut self, cancel: &CancellationToken) -> usize {
        let mut absorbed = 0;
        loop {
            match self.queue.dequeue_within(self.idle_timeout, cancel).await {
                DrainStep::Received(_) => absorbed += 1,
                DrainStep::Idle | DrainStep::Closed | DrainStep::Cancelled => return absorbed,
            }
        }
    }

    fn stop(&mut self) {
        self.set_state(RunnerState::Stopped);
        let discarded = self.queue.close_and_discard();
        if discarded > 0 {
            log::debug!("restore runner discarded {discarded} queued requests");
        }
        self.generation.pending().force_complete();
    }
}
