// libs/registration-cell/src/services/queue.rs
use rusqlite::Connection;
use tracing::{debug, error};

use crate::error::RegistrationError;
use crate::repository::schedule as schedule_repo;
use crate::services::locks::SlotGuard;

/// Issues per-slot queue numbers from the durable `last_queue_no` counter.
///
/// Numbers start at 1 and are never reused: a cancellation retires its number
/// and the counter only moves forward. Must be called inside the booking
/// transaction, after a successful reserve.
#[derive(Debug, Default, Clone, Copy)]
pub struct QueueAllocator;

impl QueueAllocator {
    pub fn new() -> Self {
        Self
    }

    pub fn next_queue_no(&self, tx: &Connection, slot: &SlotGuard) -> Result<i32, RegistrationError> {
        let schedule_id = slot.schedule_id();
        let last = schedule_repo::last_queue_no(tx, schedule_id)?
            .ok_or_else(|| RegistrationError::schedule_not_found(schedule_id))?;

        let next = last.checked_add(1).ok_or_else(|| {
            error!("Queue counter overflow for schedule {}", schedule_id);
            RegistrationError::QueueExhausted(schedule_id)
        })?;

        schedule_repo::store_queue_no(tx, schedule_id, next)?;
        debug!("Issued queue number {} for schedule {}", next, schedule_id);
        Ok(next)
    }
}
