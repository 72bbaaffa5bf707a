// libs/registration-cell/src/repository/mod.rs
//! SQL access for slots and registrations. Functions here take a borrowed
//! connection or transaction; callers decide the transaction boundary.

pub mod registration;
pub mod schedule;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};

use shared_database::{Database, DatabaseError};

use crate::models::{RegistrationStatus, SlotStatus, TimeSlot};

pub const SCHEMA_VERSION: i64 = 1;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS schedules (
    schedule_id     INTEGER PRIMARY KEY,
    doctor_id       INTEGER NOT NULL,
    dept_id         INTEGER NOT NULL,
    work_date       TEXT    NOT NULL,
    time_slot       TEXT    NOT NULL CHECK (time_slot IN ('AM', 'PM')),
    total_quota     INTEGER NOT NULL CHECK (total_quota > 0),
    remaining_quota INTEGER NOT NULL CHECK (remaining_quota >= 0 AND remaining_quota <= total_quota),
    fee             REAL    NOT NULL CHECK (fee >= 0),
    status          TEXT    NOT NULL DEFAULT 'OPEN' CHECK (status IN ('OPEN', 'CLOSED')),
    last_queue_no   INTEGER NOT NULL DEFAULT 0
);

CREATE INDEX IF NOT EXISTS idx_schedules_dept_date ON schedules (dept_id, work_date);

CREATE TABLE IF NOT EXISTS registrations (
    reg_id      INTEGER PRIMARY KEY AUTOINCREMENT,
    reg_no      TEXT    NOT NULL UNIQUE,
    patient_id  INTEGER NOT NULL,
    schedule_id INTEGER NOT NULL REFERENCES schedules (schedule_id),
    doctor_id   INTEGER NOT NULL,
    dept_id     INTEGER NOT NULL,
    work_date   TEXT    NOT NULL,
    time_slot   TEXT    NOT NULL,
    queue_no    INTEGER NOT NULL,
    fee         REAL    NOT NULL,
    status      TEXT    NOT NULL CHECK (status IN ('BOOKED', 'CANCELLED', 'FINISHED')),
    reg_time    TEXT    NOT NULL,
    update_time TEXT    NOT NULL,
    UNIQUE (schedule_id, queue_no)
);

CREATE UNIQUE INDEX IF NOT EXISTS uk_patient_schedule_active
    ON registrations (patient_id, schedule_id) WHERE status = 'BOOKED';
CREATE INDEX IF NOT EXISTS idx_registrations_patient ON registrations (patient_id);
CREATE INDEX IF NOT EXISTS idx_registrations_work_date ON registrations (work_date);
"#;

pub fn migrate(db: &Database) -> Result<(), DatabaseError> {
    db.apply_schema(SCHEMA_VERSION, SCHEMA)
}

macro_rules! text_enum_sql {
    ($ty:ty) => {
        impl ToSql for $ty {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $ty {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e| FromSqlError::Other(Box::new(e)))
            }
        }
    };
}

text_enum_sql!(TimeSlot);
text_enum_sql!(SlotStatus);
text_enum_sql!(RegistrationStatus);
