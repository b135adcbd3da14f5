#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use restore_kernel::{
    ContextId, JobContext, RestoreError, RestoreExecutor, RestoreLogger, RestoreReason,
    RestoreRequest,
};
use restore_runtime::{RestoreScheduler, SchedulerConfig};
use tokio_util::sync::CancellationToken;

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Fault {
    None,
    FailFirst,
    PanicFirst,
}

/// Executor that records what it was asked to do.
#[derive(Debug)]
pub struct ScriptedExecutor {
    delay: Duration,
    fault: Fault,
    ignores_cancel: bool,
    calls: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
    reasons: Mutex<Vec<RestoreReason>>,
    contexts: Mutex<Vec<(ContextId, usize)>>,
}

impl ScriptedExecutor {
    pub fn new(delay: Duration) -> Arc<Self> {
        Self::with_fault(delay, Fault::None)
    }

    pub fn with_fault(delay: Duration, fault: Fault) -> Arc<Self> {
        Self::build(delay, fault, false)
    }

    /// Finishes its full `delay` and reports success even after cancellation.
    pub fn stubborn(delay: Duration) -> Arc<Self> {
        Self::build(delay, Fault::None, true)
    }

    fn build(delay: Duration, fault: Fault, ignores_cancel: bool) -> Arc<Self> {
        Arc::new(Self {
            delay,
            fault,
            ignores_cancel,
            calls: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            reasons: Mutex::new(Vec::new()),
            contexts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    pub fn reasons(&self) -> Vec<RestoreReason> {
        self.reasons.lock().unwrap().clone()
    }

    /// Context id and the number of cache entries it held when the call began.
    pub fn contexts(&self) -> Vec<(ContextId, usize)> {
        self.contexts.lock().unwrap().clone()
    }
}

#[async_trait]
impl RestoreExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        request: &RestoreRequest,
        context: &JobContext,
        cancel: CancellationToken,
    ) -> Result<bool, RestoreError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(running, Ordering::SeqCst);
        let _running = RunningGuard(&self.running);
        self.reasons.lock().unwrap().push(request.reason);
        self.contexts
            .lock()
            .unwrap()
            .push((context.id(), context.len()));
        context.insert(format!("call-{call}"), serde_json::json!(call));

        if self.ignores_cancel {
            tokio::time::sleep(self.delay).await;
        } else {
            tokio::select! {
                _ = cancel.cancelled() => return Err(RestoreError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }

        match self.fault {
            Fault::FailFirst if call == 1 => Err(RestoreError::Failed("feed unreachable".into())),
            Fault::PanicFirst if call == 1 => panic!("resolver crashed"),
            _ => Ok(true),
        }
    }
}

/// Keeps `running` accurate even when the executing future is dropped.
struct RunningGuard<'a>(&'a AtomicUsize);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Default)]
pub struct RecordingLogger {
    messages: Mutex<Vec<String>>,
}

impl RecordingLogger {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl RestoreLogger for RecordingLogger {
    fn log_error(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

pub struct PanickingLogger;

impl RestoreLogger for PanickingLogger {
    fn log_error(&self, _message: &str) {
        panic!("log sink unavailable");
    }
}

pub fn fast_config() -> SchedulerConfig {
    SchedulerConfig::default()
        .with_idle_timeout(Duration::from_millis(100))
        .with_require_host_ready(false)
}

pub fn scheduler(executor: &Arc<ScriptedExecutor>, config: SchedulerConfig) -> Arc<RestoreScheduler> {
    Arc::new(RestoreScheduler::new(Arc::clone(executor), config).unwrap())
}

pub fn request(reason: RestoreReason) -> RestoreRequest {
    RestoreRequest::new(reason)
}

/// Polls `condition` every few milliseconds, giving up after two seconds.
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..400 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not reached in time");
}
