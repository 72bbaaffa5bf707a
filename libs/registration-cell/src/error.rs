use chrono::NaiveDateTime;
use thiserror::Error;

use shared_database::DatabaseError;
use shared_models::error::AppError;

use crate::models::RegistrationStatus;

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error("Slot {schedule_id} is unavailable: {reason}")]
    SlotUnavailable { schedule_id: i64, reason: &'static str },

    #[error("Registration cannot move from {from} to {to}")]
    InvalidTransition {
        from: RegistrationStatus,
        to: RegistrationStatus,
    },

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Patient {patient_id} already holds a booking for schedule {schedule_id}")]
    DuplicateBooking { patient_id: i64, schedule_id: i64 },

    #[error("Schedule {0} is already registered")]
    DuplicateSlot(i64),

    #[error("Cancellation closed at {deadline}")]
    CancellationWindowClosed { deadline: NaiveDateTime },

    #[error("Queue numbers exhausted for schedule {0}")]
    QueueExhausted(i64),

    #[error("Patient directory error: {0}")]
    Directory(String),

    #[error("Storage error: {0}")]
    Storage(#[from] DatabaseError),

    #[error("Storage task failed: {0}")]
    TaskFailed(String),
}

impl From<rusqlite::Error> for RegistrationError {
    fn from(err: rusqlite::Error) -> Self {
        RegistrationError::Storage(DatabaseError::Sqlite(err))
    }
}

impl RegistrationError {
    pub fn schedule_not_found(id: i64) -> Self {
        RegistrationError::NotFound { entity: "Schedule", id }
    }

    pub fn registration_not_found(id: i64) -> Self {
        RegistrationError::NotFound { entity: "Registration", id }
    }

    pub fn patient_not_found(id: i64) -> Self {
        RegistrationError::NotFound { entity: "Patient", id }
    }
}

impl From<RegistrationError> for AppError {
    fn from(err: RegistrationError) -> Self {
        match err {
            RegistrationError::NotFound { .. } => AppError::NotFound(err.to_string()),
            RegistrationError::SlotUnavailable { .. } => AppError::SlotUnavailable(err.to_string()),
            RegistrationError::InvalidTransition { .. } => AppError::InvalidTransition(err.to_string()),
            RegistrationError::ValidationError(msg) => AppError::ValidationError(msg),
            RegistrationError::DuplicateBooking { .. } => AppError::Conflict(err.to_string()),
            RegistrationError::DuplicateSlot(_) | RegistrationError::CancellationWindowClosed { .. } => {
                AppError::Conflict(err.to_string())
            }
            RegistrationError::Directory(msg) => AppError::ExternalService(msg),
            RegistrationError::QueueExhausted(_) | RegistrationError::TaskFailed(_) => {
                AppError::Internal(err.to_string())
            }
            RegistrationError::Storage(e) => AppError::Database(e.to_string()),
        }
    }
}
