// libs/registration-cell/src/services/ledger.rs
use std::sync::Arc;

use chrono::NaiveDate;
use rusqlite::Connection;
use tracing::{debug, info, warn};

use shared_database::Database;

use crate::error::RegistrationError;
use crate::models::{RegisterSlotRequest, Schedule, SlotDiscrepancy, SlotStatus};
use crate::repository::schedule as schedule_repo;
use crate::services::locks::SlotGuard;

/// Owns every change to a slot's remaining quota and open/closed status.
///
/// Mutating methods take a [`SlotGuard`] so they can only run while the slot
/// lock is held. `reserve` and `release` run inside the caller's transaction so
/// that a failed booking or cancellation rolls the quota change back with it.
pub struct SlotLedger {
    db: Arc<Database>,
}

impl SlotLedger {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub fn register(
        &self,
        slot: &SlotGuard,
        request: &RegisterSlotRequest,
    ) -> Result<Schedule, RegistrationError> {
        request.validate()?;
        if slot.schedule_id() != request.schedule_id {
            return Err(RegistrationError::ValidationError(format!(
                "Slot lock for {} does not cover schedule {}",
                slot.schedule_id(),
                request.schedule_id
            )));
        }

        let schedule = self.db.write(|tx| {
            if schedule_repo::find_schedule(tx, request.schedule_id)?.is_some() {
                return Err(RegistrationError::DuplicateSlot(request.schedule_id));
            }
            schedule_repo::insert_schedule(tx, request)?;
            schedule_repo::find_schedule(tx, request.schedule_id)?
                .ok_or_else(|| RegistrationError::schedule_not_found(request.schedule_id))
        })?;

        info!(
            "Registered schedule {} (doctor {}, dept {}, {} {}, quota {})",
            schedule.schedule_id,
            schedule.doctor_id,
            schedule.dept_id,
            schedule.work_date,
            schedule.time_slot,
            schedule.total_quota
        );
        Ok(schedule)
    }

    pub fn get(&self, schedule_id: i64) -> Result<Schedule, RegistrationError> {
        debug!("Fetching schedule {}", schedule_id);
        self.db.read(|conn| {
            schedule_repo::find_schedule(conn, schedule_id)?
                .ok_or_else(|| RegistrationError::schedule_not_found(schedule_id))
        })
    }

    pub fn list_available(
        &self,
        dept_id: i64,
        work_date: NaiveDate,
    ) -> Result<Vec<Schedule>, RegistrationError> {
        self.db
            .read(|conn| Ok(schedule_repo::list_available(conn, dept_id, work_date)?))
    }

    /// Consumes one unit of quota and returns the slot as it stands afterwards.
    /// Fails with `SlotUnavailable` without side effects when the slot is closed
    /// or has no remaining quota.
    pub fn reserve(&self, tx: &Connection, slot: &SlotGuard) -> Result<Schedule, RegistrationError> {
        let schedule_id = slot.schedule_id();

        if schedule_repo::decrement_quota(tx, schedule_id)? == 0 {
            let current = schedule_repo::find_schedule(tx, schedule_id)?
                .ok_or_else(|| RegistrationError::schedule_not_found(schedule_id))?;
            let reason = if current.status == SlotStatus::Closed {
                "slot is closed"
            } else {
                "no remaining quota"
            };
            warn!("Reservation rejected for schedule {}: {}", schedule_id, reason);
            return Err(RegistrationError::SlotUnavailable { schedule_id, reason });
        }

        let schedule = schedule_repo::find_schedule(tx, schedule_id)?
            .ok_or_else(|| RegistrationError::schedule_not_found(schedule_id))?;
        debug!(
            "Reserved one unit of schedule {}, {} remaining",
            schedule_id, schedule.remaining_quota
        );
        Ok(schedule)
    }

    /// Returns one unit of quota, capped at the slot total. Does not detect a
    /// second release for the same registration.
    pub fn release(&self, tx: &Connection, slot: &SlotGuard) -> Result<(), RegistrationError> {
        let schedule_id = slot.schedule_id();
        if schedule_repo::increment_quota(tx, schedule_id)? == 0 {
            return Err(RegistrationError::schedule_not_found(schedule_id));
        }
        debug!("Released one unit of schedule {}", schedule_id);
        Ok(())
    }

    pub fn open(&self, slot: &SlotGuard) -> Result<Schedule, RegistrationError> {
        self.set_status(slot, SlotStatus::Open)
    }

    /// Closing stops new bookings; existing BOOKED registrations stay valid.
    pub fn close(&self, slot: &SlotGuard) -> Result<Schedule, RegistrationError> {
        self.set_status(slot, SlotStatus::Closed)
    }

    fn set_status(&self, slot: &SlotGuard, status: SlotStatus) -> Result<Schedule, RegistrationError> {
        let schedule_id = slot.schedule_id();
        let schedule = self.db.write(|tx| {
            if schedule_repo::set_status(tx, schedule_id, status)? == 0 {
                return Err(RegistrationError::schedule_not_found(schedule_id));
            }
            schedule_repo::find_schedule(tx, schedule_id)?
                .ok_or_else(|| RegistrationError::schedule_not_found(schedule_id))
        })?;
        info!("Schedule {} is now {}", schedule_id, status);
        Ok(schedule)
    }

    /// Slots whose consumed quota disagrees with their BOOKED and FINISHED registrations.
    pub fn audit(&self) -> Result<Vec<SlotDiscrepancy>, RegistrationError> {
        let discrepancies = self
            .db
            .read(|conn| Ok::<_, RegistrationError>(schedule_repo::find_discrepancies(conn)?))?;
        for d in &discrepancies {
            warn!(
                "Schedule {} quota mismatch: total {} remaining {} but {} occupying registrations",
                d.schedule_id, d.total_quota, d.remaining_quota, d.occupied_registrations
            );
        }
        Ok(discrepancies)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository;
    use crate::services::locks::SlotLockTable;
    use assert_matches::assert_matches;
    use shared_utils::test_utils::{future_work_date, TestDatabase};

    fn setup() -> (TestDatabase, SlotLedger, SlotLockTable) {
        let test_db = TestDatabase::new().unwrap();
        let db = Arc::new(Database::open(test_db.path()).unwrap());
        repository::migrate(&db).unwrap();
        (test_db, SlotLedger::new(db), SlotLockTable::new())
    }

    fn slot_request(schedule_id: i64, total_quota: i32) -> RegisterSlotRequest {
        RegisterSlotRequest {
            schedule_id,
            doctor_id: 11,
            dept_id: 3,
            work_date: future_work_date(7),
            time_slot: crate::models::TimeSlot::Am,
            total_quota,
            fee: 25.0,
        }
    }

    fn reserve(ledger: &SlotLedger, slot: &SlotGuard) -> Result<Schedule, RegistrationError> {
        ledger.db.write(|tx| ledger.reserve(tx, slot))
    }

    #[tokio::test]
    async fn register_starts_open_with_full_quota() {
        let (_db, ledger, locks) = setup();
        let guard = locks.acquire(1).await;
        let schedule = ledger.register(&guard, &slot_request(1, 3)).unwrap();
        assert_eq!(schedule.remaining_quota, 3);
        assert_eq!(schedule.status, SlotStatus::Open);

        assert_matches!(
            ledger.register(&guard, &slot_request(1, 3)),
            Err(RegistrationError::DuplicateSlot(1))
        );
    }

    #[tokio::test]
    async fn reserve_stops_at_zero() {
        let (_db, ledger, locks) = setup();
        let guard = locks.acquire(2).await;
        ledger.register(&guard, &slot_request(2, 1)).unwrap();

        assert_eq!(reserve(&ledger, &guard).unwrap().remaining_quota, 0);
        assert_matches!(
            reserve(&ledger, &guard),
            Err(RegistrationError::SlotUnavailable { reason: "no remaining quota", .. })
        );
        assert_eq!(ledger.get(2).unwrap().remaining_quota, 0);
    }

    #[tokio::test]
    async fn closed_slot_cannot_be_reserved() {
        let (_db, ledger, locks) = setup();
        let guard = locks.acquire(3).await;
        ledger.register(&guard, &slot_request(3, 2)).unwrap();
        ledger.close(&guard).unwrap();

        assert_matches!(
            reserve(&ledger, &guard),
            Err(RegistrationError::SlotUnavailable { reason: "slot is closed", .. })
        );

        ledger.open(&guard).unwrap();
        assert_eq!(reserve(&ledger, &guard).unwrap().remaining_quota, 1);
    }

    #[tokio::test]
    async fn release_never_exceeds_total() {
        let (_db, ledger, locks) = setup();
        let guard = locks.acquire(4).await;
        ledger.register(&guard, &slot_request(4, 2)).unwrap();

        ledger.db.write(|tx| ledger.release(tx, &guard)).unwrap();
        assert_eq!(ledger.get(4).unwrap().remaining_quota, 2);
    }

    #[tokio::test]
    async fn unknown_slot_is_not_found() {
        let (_db, ledger, locks) = setup();
        let guard = locks.acquire(99).await;
        assert_matches!(reserve(&ledger, &guard), Err(RegistrationError::NotFound { id: 99, .. }));
        assert_matches!(
            ledger.db.write(|tx| ledger.release(tx, &guard)),
            Err(RegistrationError::NotFound { .. })
        );
        assert_matches!(ledger.close(&guard), Err(RegistrationError::NotFound { .. }));
    }

    #[tokio::test]
    async fn audit_flags_quota_taken_without_registration() {
        let (_db, ledger, locks) = setup();
        let guard = locks.acquire(5).await;
        ledger.register(&guard, &slot_request(5, 4)).unwrap();
        assert!(ledger.audit().unwrap().is_empty());

        reserve(&ledger, &guard).unwrap();
        let found = ledger.audit().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].schedule_id, 5);
        assert_eq!(found[0].occupied_registrations, 0);
    }

    #[tokio::test]
    async fn available_lists_only_open_slots_with_quota() {
        let (_db, ledger, locks) = setup();
        for id in [6, 7, 8] {
            let guard = locks.acquire(id).await;
            ledger.register(&guard, &slot_request(id, 1)).unwrap();
        }
        let guard = locks.acquire(7).await;
        ledger.close(&guard).unwrap();
        let guard = locks.acquire(8).await;
        reserve(&ledger, &guard).unwrap();

        let available = ledger.list_available(3, future_work_date(7)).unwrap();
        let ids: Vec<i64> = available.iter().map(|s| s.schedule_id).collect();
        assert_eq!(ids, vec![6]);
    }
}
