//! Fire a burst of background restore requests plus one blocking restore and
//! watch them collapse into two executions.
//!
//! Run with: cargo run -p restore-runtime --example burst_coalescing

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use restore_kernel::{JobContext, RestoreError, RestoreExecutor, RestoreReason, RestoreRequest};
use restore_runtime::{RestoreScheduler, SchedulerConfig};
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct PrintingExecutor {
    runs: AtomicUsize,
}

#[async_trait]
impl RestoreExecutor for PrintingExecutor {
    async fn execute(
        &self,
        request: &RestoreRequest,
        context: &JobContext,
        _cancel: CancellationToken,
    ) -> Result<bool, RestoreError> {
        let run = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
        println!(
            "restore #{run}: reason={} force={} context={} cached={}",
            request.reason,
            request.force,
            context.id(),
            context.len()
        );
        context.insert(format!("run-{run}"), serde_json::json!(run));
        tokio::time::sleep(Duration::from_millis(50)).await;
        Ok(true)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    let executor = Arc::new(PrintingExecutor::default());
    let config = SchedulerConfig::default().with_idle_timeout(Duration::from_millis(100));
    let scheduler = Arc::new(RestoreScheduler::new(Arc::clone(&executor), config)?);

    let mut callers = Vec::new();
    for _ in 0..10 {
        let scheduler = Arc::clone(&scheduler);
        callers.push(tokio::spawn(async move {
            scheduler
                .schedule_coalesced(
                    RestoreRequest::new(RestoreReason::ProjectChanged),
                    &CancellationToken::new(),
                )
                .await
        }));
    }

    // Nothing runs until the host says the workspace is loaded.
    tokio::time::sleep(Duration::from_millis(20)).await;
    println!("queued before ready: {}", scheduler.queued_len());
    scheduler.mark_host_ready()?;

    for caller in callers {
        caller.await??;
    }

    let blocking = scheduler
        .restore(RestoreRequest::forced(RestoreReason::Explicit))
        .await?;
    println!("blocking restore succeeded: {blocking}");
    println!("stats: {:?}", scheduler.stats());

    scheduler.dispose().await;
    Ok(())
}
