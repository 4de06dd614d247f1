//! Per-courier serialization.
//!
//! A courier's state may be written by its polling task and by API-driven
//! push updates. Both paths take the courier's lock for the duration of a
//! detection pass, so no two passes race on the same `CourierState`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Registry of per-courier async mutexes.
#[derive(Default)]
pub struct CourierLocks {
    inner: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl CourierLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for one courier, creating it on first use.
    pub async fn acquire(&self, courier_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.inner.lock().await;
            Arc::clone(locks.entry(courier_id).or_default())
        };
        lock.lock_owned().await
    }
}
