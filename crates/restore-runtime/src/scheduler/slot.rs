//! The active slot: the single batch that is executing or last executed.
//!
//! The slot is never empty and only changes through [`ActiveSlot::promote`],
//! which waits for the current occupant to finish and then installs the
//! candidate with a compare-and-swap. Nothing holds a lock across an await, so
//! a cancelled waiter can never wedge a promoter.

use std::sync::Arc;

use arc_swap::ArcSwap;
use tokio_util::sync::CancellationToken;

use super::batch::PendingBatch;
use crate::error::SchedulerError;

#[derive(Debug)]
pub struct ActiveSlot {
    current: ArcSwap<PendingBatch>,
    max_attempts: u32,
}

impl ActiveSlot {
    /// Seeds the slot with a completed batch so the first promotion does not wait.
    pub fn new(max_attempts: u32) -> Self {
        Self::occupied_by(Arc::new(PendingBatch::completed(true)), max_attempts)
    }

    /// Starts with `occupant` in the slot; the first promotion waits for it.
    pub fn occupied_by(occupant: Arc<PendingBatch>, max_attempts: u32) -> Self {
        Self {
            current: ArcSwap::new(occupant),
            max_attempts,
        }
    }

    pub fn load(&self) -> Arc<PendingBatch> {
        self.current.load_full()
    }

    pub fn is_busy(&self) -> bool {
        !self.current.load().is_completed()
    }

    /// Installs `candidate` once the current occupant has completed.
    ///
    /// Each attempt waits for the occupant it observed, then swaps only if the
    /// slot still holds that occupant. Losing the swap means another promoter
    /// got in first; the loop re-reads and waits for that one instead.
    pub async fn promote(
        &self,
        candidate: &Arc<PendingBatch>,
        cancel: &CancellationToken,
    ) -> Result<(), SchedulerError> {
        for attempt in 1..=self.max_attempts {
            let occupant = self.current.load_full();

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SchedulerError::Cancelled),
                _ = occupant.wait() => {}
            }

            let previous = self
                .current
                .compare_and_swap(&occupant, Arc::clone(candidate));
            if Arc::ptr_eq(&*previous, &occupant) {
                log::trace!(
                    "promoted restore batch {} over {} (attempt {attempt})",
                    candidate.id(),
                    occupant.id()
                );
                return Ok(());
            }
            log::debug!(
                "restore batch {} lost promotion race to {} (attempt {attempt})",
                candidate.id(),
                previous.id()
            );
        }

        Err(SchedulerError::PromotionExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Force-completes whatever occupies the slot. Used during teardown.
    pub fn abandon(&self) -> bool {
        self.current.load().force_complete()
    }
}
