//! In-memory FIFO queue of pending geofence events.
//!
//! Polling ticks only enqueue; the drain task pops bounded batches and runs
//! the dispatcher. Events are also persisted unprocessed in the event store,
//! so a restart can recover anything the queue loses.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::mpsc::{self, error::TryRecvError, UnboundedReceiver, UnboundedSender};
use tokio::sync::Mutex;

use domain::models::geofence_event::GeofenceEvent;

/// Unbounded FIFO event queue with a tracked depth.
pub struct EventQueue {
    tx: UnboundedSender<GeofenceEvent>,
    rx: Mutex<UnboundedReceiver<GeofenceEvent>>,
    depth: AtomicUsize,
}

impl EventQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            depth: AtomicUsize::new(0),
        }
    }

    /// Enqueues an event for the drain task.
    pub fn push(&self, event: GeofenceEvent) {
        // The receiver lives as long as the queue, so send cannot fail.
        if self.tx.send(event).is_ok() {
            self.depth.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Pops up to `max` events in arrival order.
    pub async fn pop_batch(&self, max: usize) -> Vec<GeofenceEvent> {
        let mut rx = self.rx.lock().await;
        let mut batch = Vec::new();
        while batch.len() < max {
            match rx.try_recv() {
                Ok(event) => {
                    self.depth.fetch_sub(1, Ordering::SeqCst);
                    batch.push(event);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        batch
    }

    /// Number of events currently waiting.
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}
