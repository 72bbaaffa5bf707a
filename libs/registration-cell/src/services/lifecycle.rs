// libs/registration-cell/src/services/lifecycle.rs
use std::sync::Arc;

use chrono::{DateTime, Duration, Local, Utc};
use tracing::{debug, info, warn};

use shared_database::Database;

use crate::error::RegistrationError;
use crate::models::{format_reg_no, Registration, RegistrationStatus};
use crate::repository::registration::{self as registration_repo, NewRegistration};
use crate::services::ledger::SlotLedger;
use crate::services::locks::SlotGuard;
use crate::services::queue::QueueAllocator;

/// The only writer of registration rows. Every operation runs in a single write
/// transaction while the caller holds the slot lock.
pub struct RegistrationLifecycleService {
    db: Arc<Database>,
    ledger: Arc<SlotLedger>,
    allocator: QueueAllocator,
    cancel_cutoff: Duration,
}

impl RegistrationLifecycleService {
    pub fn new(db: Arc<Database>, ledger: Arc<SlotLedger>, cancel_cutoff_minutes: i64) -> Self {
        Self {
            db,
            ledger,
            allocator: QueueAllocator::new(),
            cancel_cutoff: Duration::minutes(cancel_cutoff_minutes),
        }
    }

    /// Validate that a status transition is allowed
    pub fn validate_transition(
        &self,
        current: RegistrationStatus,
        target: RegistrationStatus,
    ) -> Result<(), RegistrationError> {
        if !current.can_transition_to(&target) {
            warn!("Invalid registration transition attempted: {} -> {}", current, target);
            return Err(RegistrationError::InvalidTransition {
                from: current,
                to: target,
            });
        }
        Ok(())
    }

    /// Reserve, allocate and insert as one transaction. Any failure after the
    /// reserve rolls the quota back.
    pub fn book(
        &self,
        slot: &SlotGuard,
        patient_id: i64,
        now: DateTime<Local>,
    ) -> Result<Registration, RegistrationError> {
        let schedule_id = slot.schedule_id();

        self.db.write(|tx| {
            if let Some(existing) = registration_repo::find_active(tx, patient_id, schedule_id)? {
                warn!(
                    "Patient {} already holds registration {} on schedule {}",
                    patient_id, existing, schedule_id
                );
                return Err(RegistrationError::DuplicateBooking {
                    patient_id,
                    schedule_id,
                });
            }

            let schedule = self.ledger.reserve(tx, slot)?;
            let queue_no = self.allocator.next_queue_no(tx, slot)?;

            let new = NewRegistration {
                reg_no: format_reg_no(schedule.work_date, schedule.time_slot, schedule_id, queue_no),
                patient_id,
                schedule_id,
                doctor_id: schedule.doctor_id,
                dept_id: schedule.dept_id,
                work_date: schedule.work_date,
                time_slot: schedule.time_slot,
                queue_no,
                fee: schedule.fee,
                reg_time: now.with_timezone(&Utc),
            };
            let reg_id = registration_repo::insert_registration(tx, &new)?;
            Ok(new.into_registration(reg_id))
        })
    }

    /// BOOKED -> CANCELLED, returning the unit of quota to the slot.
    pub fn cancel(
        &self,
        slot: &SlotGuard,
        reg_id: i64,
        now: DateTime<Local>,
    ) -> Result<Registration, RegistrationError> {
        self.db.write(|tx| {
            let registration = self.load_for_slot(tx, slot, reg_id)?;
            self.validate_transition(registration.status, RegistrationStatus::Cancelled)?;

            let deadline = registration.visit_start() - self.cancel_cutoff;
            if now.naive_local() > deadline {
                warn!("Cancellation of registration {} refused, window closed at {}", reg_id, deadline);
                return Err(RegistrationError::CancellationWindowClosed { deadline });
            }

            let stamp = now.with_timezone(&Utc);
            self.apply_transition(tx, &registration, RegistrationStatus::Cancelled, stamp)?;
            self.ledger.release(tx, slot)?;

            Ok(Registration {
                status: RegistrationStatus::Cancelled,
                update_time: stamp,
                ..registration
            })
        })
    }

    /// BOOKED -> FINISHED. The slot's quota is untouched.
    pub fn finish(
        &self,
        slot: &SlotGuard,
        reg_id: i64,
        now: DateTime<Local>,
    ) -> Result<Registration, RegistrationError> {
        self.db.write(|tx| {
            let registration = self.load_for_slot(tx, slot, reg_id)?;
            self.validate_transition(registration.status, RegistrationStatus::Finished)?;

            let stamp = now.with_timezone(&Utc);
            self.apply_transition(tx, &registration, RegistrationStatus::Finished, stamp)?;

            Ok(Registration {
                status: RegistrationStatus::Finished,
                update_time: stamp,
                ..registration
            })
        })
    }

    fn load_for_slot(
        &self,
        tx: &rusqlite::Connection,
        slot: &SlotGuard,
        reg_id: i64,
    ) -> Result<Registration, RegistrationError> {
        let registration = registration_repo::find_registration(tx, reg_id)?
            .ok_or_else(|| RegistrationError::registration_not_found(reg_id))?;

        if registration.schedule_id != slot.schedule_id() {
            return Err(RegistrationError::ValidationError(format!(
                "Registration {} belongs to schedule {}, not {}",
                reg_id,
                registration.schedule_id,
                slot.schedule_id()
            )));
        }
        Ok(registration)
    }

    fn apply_transition(
        &self,
        tx: &rusqlite::Connection,
        registration: &Registration,
        target: RegistrationStatus,
        stamp: DateTime<Utc>,
    ) -> Result<(), RegistrationError> {
        let changed = registration_repo::update_status_if(
            tx,
            registration.reg_id,
            registration.status,
            target,
            stamp,
        )?;
        if changed == 0 {
            // Someone moved it after we read it; report against the state we saw.
            return Err(RegistrationError::InvalidTransition {
                from: registration.status,
                to: target,
            });
        }
        debug!("Registration {} moved {} -> {}", registration.reg_id, registration.status, target);
        info!("Registration {} is now {}", registration.reg_no, target);
        Ok(())
    }
}
