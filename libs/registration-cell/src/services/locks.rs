// libs/registration-cell/src/services/locks.rs
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::debug;

const PRUNE_THRESHOLD: usize = 1024;

/// Per-slot exclusive locks. Holders of different slots never wait on each other.
#[derive(Default)]
pub struct SlotLockTable {
    locks: Mutex<HashMap<i64, Arc<AsyncMutex<()>>>>,
}

/// Proof that the caller holds the lock for `schedule_id`. Released on drop.
pub struct SlotGuard {
    schedule_id: i64,
    _permit: OwnedMutexGuard<()>,
}

impl SlotGuard {
    pub fn schedule_id(&self) -> i64 {
        self.schedule_id
    }
}

impl SlotLockTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, schedule_id: i64) -> SlotGuard {
        let lock = self.slot_lock(schedule_id);
        let permit = lock.lock_owned().await;
        debug!("Acquired slot lock for schedule {}", schedule_id);
        SlotGuard {
            schedule_id,
            _permit: permit,
        }
    }

    fn slot_lock(&self, schedule_id: i64) -> Arc<AsyncMutex<()>> {
        // The map only holds Arcs; a panic while it was held cannot leave it inconsistent.
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);

        if locks.len() >= PRUNE_THRESHOLD {
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
        }

        Arc::clone(locks.entry(schedule_id).or_default())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn same_slot_is_exclusive() {
        let table = Arc::new(SlotLockTable::new());
        let guard = table.acquire(1).await;

        let contender = {
            let table = Arc::clone(&table);
            tokio::spawn(async move { table.acquire(1).await.schedule_id() })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        assert_eq!(contender.await.unwrap(), 1);
    }

    #[tokio::test]
    async fn different_slots_do_not_block() {
        let table = SlotLockTable::new();
        let _first = table.acquire(1).await;
        let second = tokio::time::timeout(Duration::from_millis(100), table.acquire(2)).await;
        assert!(second.is_ok());
    }

    #[tokio::test]
    async fn idle_locks_are_pruned() {
        let table = SlotLockTable::new();
        for id in 0..PRUNE_THRESHOLD as i64 {
            drop(table.acquire(id).await);
        }
        let _held = table.acquire(-1).await;
        assert_eq!(table.len(), 1);
    }
}
