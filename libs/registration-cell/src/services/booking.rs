// libs/registration-cell/src/services/booking.rs
use std::sync::Arc;

use chrono::{Local, NaiveDate};
use tracing::{debug, error, info, instrument, warn};

use shared_config::AppConfig;
use shared_database::Database;
use shared_models::PageResult;
use shared_utils::pagination::Pagination;

use crate::error::RegistrationError;
use crate::models::{
    CreateRegistrationRequest, RegisterSlotRequest, Registration, RegistrationFilter,
    RegistrationStats, Schedule, SlotDiscrepancy,
};
use crate::repository::{self, registration as registration_repo};
use crate::services::directory::{PatientDirectory, SupabasePatientDirectory, UnverifiedPatientDirectory};
use crate::services::ledger::SlotLedger;
use crate::services::lifecycle::RegistrationLifecycleService;
use crate::services::locks::SlotLockTable;

/// Request-facing entry point. Mutations on a slot are serialized by that slot's
/// lock; listings and statistics read committed state and never take it.
///
/// SQLite work runs on the blocking pool, so a caller waiting on storage never
/// holds up an async worker. SQLite still admits one writer at a time: a write
/// for one slot can queue briefly behind a commit for another, but never behind
/// that slot's lock.
///
/// One instance must be shared by every handler, since the lock table lives here.
pub struct RegistrationBookingService {
    db: Arc<Database>,
    locks: SlotLockTable,
    ledger: Arc<SlotLedger>,
    lifecycle: Arc<RegistrationLifecycleService>,
    directory: Arc<dyn PatientDirectory>,
}

/// Runs synchronous storage work off the async workers.
async fn run_blocking<T, F>(work: F) -> Result<T, RegistrationError>
where
    F: FnOnce() -> Result<T, RegistrationError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work).await.map_err(|e| {
        error!("Storage task failed: {}", e);
        RegistrationError::TaskFailed(e.to_string())
    })?
}

impl RegistrationBookingService {
    /// Opens (and migrates) the database at `config.database_path`.
    pub fn open(config: &AppConfig) -> Result<Self, RegistrationError> {
        let db = Database::open(&config.database_path)?;
        Self::new(config, Arc::new(db))
    }

    pub fn new(config: &AppConfig, db: Arc<Database>) -> Result<Self, RegistrationError> {
        let directory: Arc<dyn PatientDirectory> = if config.is_patient_directory_configured() {
            Arc::new(SupabasePatientDirectory::new(config)?)
        } else {
            warn!("No patient directory configured, accepting any positive patient id");
            Arc::new(UnverifiedPatientDirectory)
        };
        Self::with_directory(config, db, directory)
    }

    pub fn with_directory(
        config: &AppConfig,
        db: Arc<Database>,
        directory: Arc<dyn PatientDirectory>,
    ) -> Result<Self, RegistrationError> {
        repository::migrate(&db)?;

        let ledger = Arc::new(SlotLedger::new(Arc::clone(&db)));
        let lifecycle = Arc::new(RegistrationLifecycleService::new(
            Arc::clone(&db),
            Arc::clone(&ledger),
            config.cancel_cutoff_minutes,
        ));

        Ok(Self {
            db,
            locks: SlotLockTable::new(),
            ledger,
            lifecycle,
            directory,
        })
    }

    // ==============================================================================
    // REGISTRATION OPERATIONS
    // ==============================================================================

    #[instrument(skip(self))]
    pub async fn create_registration(
        &self,
        request: CreateRegistrationRequest,
    ) -> Result<Registration, RegistrationError> {
        if !self.directory.patient_exists(request.patient_id).await? {
            warn!("Booking rejected, unknown patient {}", request.patient_id);
            return Err(RegistrationError::patient_not_found(request.patient_id));
        }

        let slot = self.locks.acquire(request.schedule_id).await;
        let lifecycle = Arc::clone(&self.lifecycle);
        let registration =
            run_blocking(move || lifecycle.book(&slot, request.patient_id, Local::now())).await?;

        info!(
            "Registration {} created for patient {} with queue number {}",
            registration.reg_no, registration.patient_id, registration.queue_no
        );
        Ok(registration)
    }

    #[instrument(skip(self))]
    pub async fn cancel_registration(&self, reg_id: i64) -> Result<Registration, RegistrationError> {
        let schedule_id = self.get_registration(reg_id).await?.schedule_id;
        let slot = self.locks.acquire(schedule_id).await;
        let lifecycle = Arc::clone(&self.lifecycle);
        run_blocking(move || lifecycle.cancel(&slot, reg_id, Local::now())).await
    }

    #[instrument(skip(self))]
    pub async fn finish_registration(&self, reg_id: i64) -> Result<Registration, RegistrationError> {
        let schedule_id = self.get_registration(reg_id).await?.schedule_id;
        let slot = self.locks.acquire(schedule_id).await;
        let lifecycle = Arc::clone(&self.lifecycle);
        run_blocking(move || lifecycle.finish(&slot, reg_id, Local::now())).await
    }

    pub async fn get_registration(&self, reg_id: i64) -> Result<Registration, RegistrationError> {
        debug!("Fetching registration {}", reg_id);
        let db = Arc::clone(&self.db);
        run_blocking(move || {
            db.read(|conn| {
                registration_repo::find_registration(conn, reg_id)?
                    .ok_or_else(|| RegistrationError::registration_not_found(reg_id))
            })
        })
        .await
    }

    pub async fn list_by_patient(&self, patient_id: i64) -> Result<Vec<Registration>, RegistrationError> {
        if patient_id <= 0 {
            return Err(RegistrationError::ValidationError(
                "patientId must be a positive integer".to_string(),
            ));
        }
        let db = Arc::clone(&self.db);
        run_blocking(move || {
            db.read(|conn| Ok(registration_repo::list_by_patient(conn, patient_id)?))
        })
        .await
    }

    pub async fn list_registrations(
        &self,
        filter: &RegistrationFilter,
    ) -> Result<Vec<Registration>, RegistrationError> {
        debug!("Listing registrations with {:?}", filter);
        let db = Arc::clone(&self.db);
        let filter = filter.clone();
        run_blocking(move || {
            db.read(|conn| Ok(registration_repo::list_filtered(conn, &filter, None)?))
        })
        .await
    }

    pub async fn list_registrations_page(
        &self,
        filter: &RegistrationFilter,
        page: Pagination,
    ) -> Result<PageResult<Registration>, RegistrationError> {
        debug!("Listing registrations page {:?} with {:?}", page, filter);
        let db = Arc::clone(&self.db);
        let filter = filter.clone();
        run_blocking(move || {
            db.read(|conn| {
                let total = registration_repo::count_filtered(conn, &filter)?;
                let list = registration_repo::list_filtered(conn, &filter, Some(page))?;
                Ok(PageResult::of(list, total, page.page, page.page_size))
            })
        })
        .await
    }

    /// Counts per status, fee total and per-department counts over the work-date range.
    pub async fn statistics(
        &self,
        start_date: Option<NaiveDate>,
        end_date: Option<NaiveDate>,
    ) -> Result<RegistrationStats, RegistrationError> {
        let filter = RegistrationFilter {
            start_date,
            end_date,
            status: None,
        };
        let db = Arc::clone(&self.db);
        run_blocking(move || {
            db.read(|conn| {
                let counts = registration_repo::status_counts(conn, &filter)?;
                Ok(RegistrationStats {
                    booked_count: counts.booked,
                    cancelled_count: counts.cancelled,
                    finished_count: counts.finished,
                    total_fee: registration_repo::total_fee(conn, &filter)?,
                    dept_stats: registration_repo::dept_counts(conn, &filter)?,
                })
            })
        })
        .await
    }

    // ==============================================================================
    // SLOT OPERATIONS
    // ==============================================================================

    #[instrument(skip(self, request), fields(schedule_id = request.schedule_id))]
    pub async fn register_slot(&self, request: RegisterSlotRequest) -> Result<Schedule, RegistrationError> {
        request.validate()?;
        let slot = self.locks.acquire(request.schedule_id).await;
        let ledger = Arc::clone(&self.ledger);
        run_blocking(move || ledger.register(&slot, &request)).await
    }

    pub async fn get_slot(&self, schedule_id: i64) -> Result<Schedule, RegistrationError> {
        let ledger = Arc::clone(&self.ledger);
        run_blocking(move || ledger.get(schedule_id)).await
    }

    pub async fn list_available_slots(
        &self,
        dept_id: i64,
        work_date: NaiveDate,
    ) -> Result<Vec<Schedule>, RegistrationError> {
        let ledger = Arc::clone(&self.ledger);
        run_blocking(move || ledger.list_available(dept_id, work_date)).await
    }

    #[instrument(skip(self))]
    pub async fn open_slot(&self, schedule_id: i64) -> Result<Schedule, RegistrationError> {
        let slot = self.locks.acquire(schedule_id).await;
        let ledger = Arc::clone(&self.ledger);
        run_blocking(move || ledger.open(&slot)).await
    }

    #[instrument(skip(self))]
    pub async fn close_slot(&self, schedule_id: i64) -> Result<Schedule, RegistrationError> {
        let slot = self.locks.acquire(schedule_id).await;
        let ledger = Arc::clone(&self.ledger);
        run_blocking(move || ledger.close(&slot)).await
    }

    pub async fn audit_slots(&self) -> Result<Vec<SlotDiscrepancy>, RegistrationError> {
        let ledger = Arc::clone(&self.ledger);
        run_blocking(move || ledger.audit()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    use assert_matches::assert_matches;
    use mockall::predicate::eq;

    use shared_utils::test_utils::{future_work_date, TestConfig, TestDatabase};

    use crate::models::{RegistrationStatus, TimeSlot};
    use crate::services::directory::MockPatientDirectory;

    fn accepting_directory() -> MockPatientDirectory {
        let mut directory = MockPatientDirectory::new();
        directory.expect_patient_exists().returning(|_| Ok(true));
        directory
    }

    fn service_with(directory: MockPatientDirectory) -> (TestDatabase, RegistrationBookingService) {
        let test_db = TestDatabase::new().unwrap();
        let config = TestConfig::for_database(&test_db).to_app_config();
        let db = Arc::new(Database::open(test_db.path()).unwrap());
        let service = RegistrationBookingService::with_directory(&config, db, Arc::new(directory)).unwrap();
        (test_db, service)
    }

    async fn seed_slot(service: &RegistrationBookingService, schedule_id: i64, total_quota: i32) {
        service
            .register_slot(RegisterSlotRequest {
                schedule_id,
                doctor_id: 5,
                dept_id: 2,
                work_date: future_work_date(4),
                time_slot: TimeSlot::Pm,
                total_quota,
                fee: 12.5,
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn unknown_patient_is_rejected_before_touching_the_slot() {
        let mut directory = MockPatientDirectory::new();
        directory
            .expect_patient_exists()
            .with(eq(77))
            .times(1)
            .returning(|_| Ok(false));
        let (_db, service) = service_with(directory);
        seed_slot(&service, 1, 1).await;

        let result = service
            .create_registration(CreateRegistrationRequest { patient_id: 77, schedule_id: 1 })
            .await;
        assert_matches!(result, Err(RegistrationError::NotFound { entity: "Patient", id: 77 }));
        assert_eq!(service.get_slot(1).await.unwrap().remaining_quota, 1);
    }

    #[tokio::test]
    async fn directory_failure_surfaces_as_directory_error() {
        let mut directory = MockPatientDirectory::new();
        directory
            .expect_patient_exists()
            .returning(|_| Err(RegistrationError::Directory("timeout".to_string())));
        let (_db, service) = service_with(directory);
        seed_slot(&service, 2, 1).await;

        let result = service
            .create_registration(CreateRegistrationRequest { patient_id: 3, schedule_id: 2 })
            .await;
        assert_matches!(result, Err(RegistrationError::Directory(_)));
    }

    #[tokio::test]
    async fn statistics_cover_every_status() {
        let (_db, service) = service_with(accepting_directory());
        seed_slot(&service, 3, 5).await;

        let mut ids = Vec::new();
        for patient_id in 1..=3 {
            let reg = service
                .create_registration(CreateRegistrationRequest { patient_id, schedule_id: 3 })
                .await
                .unwrap();
            ids.push(reg.reg_id);
        }
        service.cancel_registration(ids[0]).await.unwrap();
        service.finish_registration(ids[1]).await.unwrap();

        let stats = service.statistics(None, None).await.unwrap();
        assert_eq!(stats.booked_count, 1);
        assert_eq!(stats.cancelled_count, 1);
        assert_eq!(stats.finished_count, 1);
        assert_eq!(stats.total_fee, 25.0);
        assert_eq!(stats.dept_stats.len(), 1);
        assert_eq!(stats.dept_stats[0].count, 3);
        assert!(service.audit_slots().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn page_reports_total_and_clamped_window() {
        let (_db, service) = service_with(accepting_directory());
        seed_slot(&service, 4, 10).await;

        for patient_id in 1..=5 {
            service
                .create_registration(CreateRegistrationRequest { patient_id, schedule_id: 4 })
                .await
                .unwrap();
        }

        let filter = RegistrationFilter {
            status: Some(RegistrationStatus::Booked),
            ..RegistrationFilter::default()
        };
        let page = service
            .list_registrations_page(&filter, Pagination::clamp(Some(2), Some(2)))
            .await
            .unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.list.len(), 2);
        assert_eq!((page.page, page.page_size), (2, 2));

        // Newest first: page 2 holds the 3rd and 2nd bookings.
        let queue: Vec<i32> = page.list.iter().map(|r| r.queue_no).collect();
        assert_eq!(queue, vec![3, 2]);
    }

    #[tokio::test]
    async fn listing_by_patient_requires_positive_id() {
        let (_db, service) = service_with(MockPatientDirectory::new());
        assert_matches!(service.list_by_patient(0).await, Err(RegistrationError::ValidationError(_)));
    }

    #[tokio::test]
    async fn booking_proceeds_while_another_slot_is_locked() {
        let (_db, service) = service_with(accepting_directory());
        seed_slot(&service, 5, 1).await;
        seed_slot(&service, 6, 1).await;

        let _held = service.locks.acquire(5).await;
        let booking = tokio::time::timeout(
            Duration::from_secs(2),
            service.create_registration(CreateRegistrationRequest { patient_id: 1, schedule_id: 6 }),
        )
        .await
        .expect("booking on slot 6 waited for slot 5");
        assert_eq!(booking.unwrap().queue_no, 1);
    }

    #[tokio::test]
    async fn waiting_on_storage_leaves_the_runtime_free() {
        let (_db, service) = service_with(accepting_directory());
        let service = Arc::new(service);
        seed_slot(&service, 7, 1).await;

        // A long commit from another thread keeps the writer busy.
        let db = Arc::clone(&service.db);
        let (started_tx, started_rx) = mpsc::channel();
        let commit = std::thread::spawn(move || {
            db.write::<_, RegistrationError, _>(|_| {
                started_tx.send(()).ok();
                std::thread::sleep(Duration::from_millis(300));
                Ok(())
            })
        });
        started_rx.recv().unwrap();

        let booking = {
            let service = Arc::clone(&service);
            tokio::spawn(async move {
                service
                    .create_registration(CreateRegistrationRequest { patient_id: 2, schedule_id: 7 })
                    .await
            })
        };

        // Single-threaded runtime: this timer only fires on time if the booking
        // task yielded instead of blocking the thread on the writer.
        let started = Instant::now();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(started.elapsed() < Duration::from_millis(200));

        assert_eq!(booking.await.unwrap().unwrap().queue_no, 1);
        commit.join().unwrap().unwrap();
    }
}
