//! Non-blocking submission queue in front of the dispatcher.

use std::sync::Arc;

use tokio::sync::{Semaphore, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, error, info, warn};

use super::Dispatcher;
use super::outcome::DispatchStats;
use crate::domain::IssueEvent;
use crate::{Error, Result};

/// Holds the background runner task once started.
#[derive(Clone, Default)]
pub(super) struct RunnerSlot(Arc<parking_lot::Mutex<Option<JoinHandle<()>>>>);

/// Producer-side handle. `submit` never waits on delivery.
#[derive(Clone)]
pub struct DispatchHandle {
    tx: mpsc::Sender<IssueEvent>,
    stats: Arc<DispatchStats>,
}

impl DispatchHandle {
    /// Enqueue an event for dispatch.
    ///
    /// Fails immediately with [`Error::QueueFull`] when the queue is at
    /// capacity and [`Error::QueueClosed`] after shutdown.
    pub fn submit(&self, event: IssueEvent) -> Result<()> {
        match self.tx.try_send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(event)) => {
                self.stats.record_rejected();
                warn!(
                    project_id = %event.project_id,
                    issue_id = %event.issue_id,
                    "Dispatch queue full, dropping event"
                );
                Err(Error::QueueFull)
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::QueueClosed),
        }
    }

    /// Events waiting to be picked up.
    pub fn pending(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl Dispatcher {
    /// Start the background runner and return the submission handle.
    ///
    /// Calling `start` again replaces the handle; only the first runner is
    /// tracked for shutdown.
    pub fn start(&self) -> DispatchHandle {
        let (tx, rx) = mpsc::channel(self.config.queue_capacity.max(1));

        info!(
            workers = self.config.workers,
            queue_capacity = self.config.queue_capacity,
            "Starting dispatcher"
        );

        let dispatcher = self.clone();
        let handle = tokio::spawn(async move { dispatcher.run(rx).await });

        let mut slot = self.runner.0.lock();
        if slot.is_none() {
            *slot = Some(handle);
        }

        DispatchHandle {
            tx,
            stats: self.stats.clone(),
        }
    }

    async fn run(self, mut rx: mpsc::Receiver<IssueEvent>) {
        // Events being fanned out at once; deliveries are bounded separately.
        let event_slots = Arc::new(Semaphore::new(self.config.workers.max(1)));
        let mut in_flight = JoinSet::new();

        loop {
            let slot = tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                slot = event_slots.clone().acquire_owned() => match slot {
                    Ok(slot) => slot,
                    Err(_) => break,
                },
            };

            let event = tokio::select! {
                _ = self.cancellation_token.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            while let Some(joined) = in_flight.try_join_next() {
                if let Err(e) = joined {
                    error!("Dispatch task panicked: {}", e);
                }
            }

            let dispatcher = self.clone();
            in_flight.spawn(async move {
                let _slot = slot;
                dispatcher.dispatch(&event).await;
            });
        }

        rx.close();
        let mut abandoned = 0usize;
        while rx.try_recv().is_ok() {
            abandoned += 1;
        }
        if abandoned > 0 {
            warn!(abandoned, "Dropping queued events on shutdown");
        }

        let grace = self.config.shutdown_grace();
        let drained = tokio::time::timeout(grace, async {
            while let Some(joined) = in_flight.join_next().await {
                if let Err(e) = joined {
                    error!("Dispatch task panicked: {}", e);
                }
            }
        })
        .await;

        if drained.is_err() {
            warn!(
                remaining = in_flight.len(),
                grace_secs = grace.as_secs(),
                "Abandoning in-flight deliveries after shutdown grace period"
            );
            in_flight.abort_all();
            while in_flight.join_next().await.is_some() {}
        }

        debug!("Dispatcher runner exited");
    }

    /// Stop accepting events and wait for in-flight deliveries, bounded by the
    /// shutdown grace period.
    pub async fn shutdown(&self) {
        info!("Stopping dispatcher");
        self.cancellation_token.cancel();

        let handle = self.runner.0.lock().take();
        if let Some(handle) = handle
            && let Err(e) = handle.await
        {
            error!("Dispatcher runner failed: {}", e);
        }

        info!("Dispatcher stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn handle(capacity: usize) -> (DispatchHandle, mpsc::Receiver<IssueEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        let handle = DispatchHandle {
            tx,
            stats: Arc::new(DispatchStats::default()),
        };
        (handle, rx)
    }

    #[tokio::test]
    async fn test_submit_rejects_when_full() {
        let (handle, mut rx) = handle(1);
        let event = IssueEvent::test_event("p1", None, "http://bugsink/i/1");

        handle.submit(event.clone()).unwrap();
        assert_eq!(handle.pending(), 1);
        assert!(matches!(handle.submit(event.clone()), Err(Error::QueueFull)));
        assert_eq!(handle.stats.snapshot().rejected, 1);

        assert_eq!(rx.recv().await.unwrap(), event);
        assert_eq!(handle.pending(), 0);
        handle.submit(event).unwrap();
    }

    #[tokio::test]
    async fn test_submit_after_close() {
        let (handle, rx) = handle(4);
        drop(rx);
        assert!(handle.is_closed());
        let event = IssueEvent::test_event("p1", None, "http://bugsink/i/1");
        assert!(matches!(handle.submit(event), Err(Error::QueueClosed)));
        assert_eq!(handle.stats.snapshot().rejected, 0);
    }
}
