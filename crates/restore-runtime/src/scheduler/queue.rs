//! Bounded request queue. Enqueue never blocks: when the buffer is full the
//! request is dropped and the caller simply rides the batch already in flight.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use restore_kernel::RestoreRequest;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Accepted,
    /// Queue at capacity; request silently discarded.
    Dropped,
    /// The consumer is gone (generation torn down).
    Closed,
}

/// One step of the drain phase.
#[derive(Debug)]
pub enum DrainStep {
    Received(RestoreRequest),
    /// Nothing arrived within the idle window.
    Idle,
    Closed,
    Cancelled,
}

#[derive(Debug)]
pub struct RequestQueue {
    sender: mpsc::Sender<RestoreRequest>,
    receiver: Mutex<Option<mpsc::Receiver<RestoreRequest>>>,
    capacity: usize,
}

impl RequestQueue {
    /// `capacity` must be non-zero; [`SchedulerConfig::validate`](super::SchedulerConfig::validate) enforces it.
    pub fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            sender,
            receiver: Mutex::new(Some(receiver)),
            capacity,
        }
    }

    pub fn enqueue(&self, request: RestoreRequest) -> EnqueueOutcome {
        match self.sender.try_send(request) {
            Ok(()) => EnqueueOutcome::Accepted,
            Err(TrySendError::Full(request)) => {
                log::trace!(
                    "restore queue full ({}), dropping {} request",
                    self.capacity,
                    request.reason
                );
                EnqueueOutcome::Dropped
            }
            Err(TrySendError::Closed(_)) => EnqueueOutcome::Closed,
        }
    }

    /// Hands the consuming end to the runner. Only the first call gets it.
    pub fn take_receiver(&self) -> Option<QueueReceiver> {
        self.receiver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .map(|rx| QueueReceiver { rx })
    }

    pub fn len(&self) -> usize {
        self.capacity.saturating_sub(self.sender.capacity())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discards whatever is still buffered when no runner owns the receiver.
    pub fn discard_unclaimed(&self) -> usize {
        let mut guard = self.receiver.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_mut() {
            Some(rx) => {
                rx.close();
                let mut discarded = 0;
                while rx.try_recv().is_ok() {
                    discarded += 1;
                }
                discarded
            }
            None => 0,
        }
    }
}

/// Consuming end of the queue, owned by the single background runner.
#[derive(Debug)]
pub struct QueueReceiver {
    rx: mpsc::Receiver<RestoreRequest>,
}

impl QueueReceiver {
    /// Blocks until a request arrives. `None` on cancellation or closure.
    pub async fn dequeue(&mut self, cancel: &CancellationToken) -> Option<RestoreRequest> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            request = self.rx.recv() => request,
        }
    }

    /// Waits at most `idle` for the next request.
    pub async fn dequeue_within(&mut self, idle: Duration, cancel: &CancellationToken) -> DrainStep {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => DrainStep::Cancelled,
            next = tokio::time::timeout(idle, self.rx.recv()) => match next {
                Ok(Some(request)) => DrainStep::Received(request),
                Ok(None) => DrainStep::Closed,
                Err(_) => DrainStep::Idle,
            },
        }
    }

    /// Closes the queue and drops everything still buffered.
    pub fn close_and_discard(&mut self) -> usize {
        self.rx.close();
        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        discarded
    }
}
