//! Per-repository mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Registry of named locks, one per working copy.
///
/// Callers key it by the working-copy directory rather than by the raw
/// repository id, so ids that normalize to the same directory share a lock.
/// The returned guard is owned, so it can be moved into a blocking task and
/// is released when that task drops it. Entries nobody holds or waits for are
/// pruned on the next acquire.
#[derive(Debug, Default)]
pub struct RepoLocks {
    locks: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl RepoLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for the lock named `key`.
    pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
        self.lock_for(key).lock_owned().await
    }

    /// Number of locks currently registered.
    pub fn len(&self) -> usize {
        self.registry().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_for(&self, key: &str) -> Arc<AsyncMutex<()>> {
        let mut registry = self.registry();
        // Held guards and pending waiters each own a clone of the Arc.
        registry.retain(|_, lock| Arc::strong_count(lock) > 1);
        Arc::clone(
            registry
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
        )
    }

    fn registry(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<AsyncMutex<()>>>> {
        // `retain` and `entry().or_insert_with` cannot leave the map
        // half-updated, so a poisoned lock is still usable.
        self.locks.lock().unwrap_or_else(|e| e.into_inner())
    }
}
