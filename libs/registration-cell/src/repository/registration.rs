// libs/registration-cell/src/repository/registration.rs
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};

use shared_utils::pagination::Pagination;

use crate::models::{DeptStat, Registration, RegistrationFilter, RegistrationStatus, TimeSlot};

const REGISTRATION_COLUMNS: &str = "reg_id, reg_no, patient_id, schedule_id, doctor_id, dept_id, \
                                    work_date, time_slot, queue_no, fee, status, reg_time, update_time";

/// A registration about to be inserted; the id is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewRegistration {
    pub reg_no: String,
    pub patient_id: i64,
    pub schedule_id: i64,
    pub doctor_id: i64,
    pub dept_id: i64,
    pub work_date: NaiveDate,
    pub time_slot: TimeSlot,
    pub queue_no: i32,
    pub fee: f64,
    pub reg_time: DateTime<Utc>,
}

impl NewRegistration {
    pub fn into_registration(self, reg_id: i64) -> Registration {
        Registration {
            reg_id,
            reg_no: self.reg_no,
            patient_id: self.patient_id,
            schedule_id: self.schedule_id,
            doctor_id: self.doctor_id,
            dept_id: self.dept_id,
            work_date: self.work_date,
            time_slot: self.time_slot,
            queue_no: self.queue_no,
            fee: self.fee,
            status: RegistrationStatus::Booked,
            reg_time: self.reg_time,
            update_time: self.reg_time,
        }
    }
}

fn registration_from_row(row: &Row<'_>) -> rusqlite::Result<Registration> {
    Ok(Registration {
        reg_id: row.get(0)?,
        reg_no: row.get(1)?,
        patient_id: row.get(2)?,
        schedule_id: row.get(3)?,
        doctor_id: row.get(4)?,
        dept_id: row.get(5)?,
        work_date: row.get(6)?,
        time_slot: row.get(7)?,
        queue_no: row.get(8)?,
        fee: row.get(9)?,
        status: row.get(10)?,
        reg_time: row.get(11)?,
        update_time: row.get(12)?,
    })
}

pub fn insert_registration(conn: &Connection, new: &NewRegistration) -> rusqlite::Result<i64> {
    conn.execute(
        "INSERT INTO registrations (reg_no, patient_id, schedule_id, doctor_id, dept_id, work_date,
                                    time_slot, queue_no, fee, status, reg_time, update_time)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
        params![
            new.reg_no,
            new.patient_id,
            new.schedule_id,
            new.doctor_id,
            new.dept_id,
            new.work_date,
            new.time_slot,
            new.queue_no,
            new.fee,
            RegistrationStatus::Booked,
            new.reg_time,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn find_registration(conn: &Connection, reg_id: i64) -> rusqlite::Result<Option<Registration>> {
    conn.query_row(
        &format!("SELECT {} FROM registrations WHERE reg_id = ?1", REGISTRATION_COLUMNS),
        [reg_id],
        registration_from_row,
    )
    .optional()
}

/// Id of the patient's BOOKED registration on this slot, if any.
pub fn find_active(conn: &Connection, patient_id: i64, schedule_id: i64) -> rusqlite::Result<Option<i64>> {
    conn.query_row(
        "SELECT reg_id FROM registrations
         WHERE patient_id = ?1 AND schedule_id = ?2 AND status = 'BOOKED'",
        [patient_id, schedule_id],
        |row| row.get(0),
    )
    .optional()
}

/// Moves `reg_id` from `from` to `to`. Returns 0 when the registration is no longer in `from`.
pub fn update_status_if(
    conn: &Connection,
    reg_id: i64,
    from: RegistrationStatus,
    to: RegistrationStatus,
    now: DateTime<Utc>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE registrations SET status = ?3, update_time = ?4 WHERE reg_id = ?1 AND status = ?2",
        params![reg_id, from, to, now],
    )
}

pub fn list_by_patient(conn: &Connection, patient_id: i64) -> rusqlite::Result<Vec<Registration>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM registrations WHERE patient_id = ?1 ORDER BY reg_time DESC, reg_id DESC",
        REGISTRATION_COLUMNS
    ))?;
    let rows = stmt.query_map([patient_id], registration_from_row)?;
    rows.collect()
}

/// WHERE clause and bound values for a filter over `work_date` and `status`.
fn filter_clause(filter: &RegistrationFilter) -> (String, Vec<Value>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    if let Some(start) = filter.start_date {
        values.push(Value::Text(start.to_string()));
        conditions.push(format!("work_date >= ?{}", values.len()));
    }
    if let Some(end) = filter.end_date {
        values.push(Value::Text(end.to_string()));
        conditions.push(format!("work_date <= ?{}", values.len()));
    }
    if let Some(status) = filter.status {
        values.push(Value::Text(status.as_str().to_string()));
        conditions.push(format!("status = ?{}", values.len()));
    }

    let clause = if conditions.is_empty() {
        String::new()
    } else {
        format!("WHERE {}", conditions.join(" AND "))
    };
    (clause, values)
}

pub fn list_filtered(
    conn: &Connection,
    filter: &RegistrationFilter,
    page: Option<Pagination>,
) -> rusqlite::Result<Vec<Registration>> {
    let (clause, mut values) = filter_clause(filter);
    let mut sql = format!(
        "SELECT {} FROM registrations {} ORDER BY reg_time DESC, reg_id DESC",
        REGISTRATION_COLUMNS, clause
    );
    if let Some(page) = page {
        values.push(Value::Integer(page.limit() as i64));
        sql.push_str(&format!(" LIMIT ?{}", values.len()));
        values.push(Value::Integer(page.offset() as i64));
        sql.push_str(&format!(" OFFSET ?{}", values.len()));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), registration_from_row)?;
    rows.collect()
}

pub fn count_filtered(conn: &Connection, filter: &RegistrationFilter) -> rusqlite::Result<u64> {
    let (clause, values) = filter_clause(filter);
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM registrations {}", clause),
        params_from_iter(values),
        |row| row.get(0),
    )?;
    Ok(count.max(0) as u64)
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StatusCounts {
    pub booked: u64,
    pub cancelled: u64,
    pub finished: u64,
}

pub fn status_counts(conn: &Connection, filter: &RegistrationFilter) -> rusqlite::Result<StatusCounts> {
    let (clause, values) = filter_clause(filter);
    let mut stmt = conn.prepare(&format!(
        "SELECT status, COUNT(*) FROM registrations {} GROUP BY status",
        clause
    ))?;
    let mut rows = stmt.query(params_from_iter(values))?;

    let mut counts = StatusCounts::default();
    while let Some(row) = rows.next()? {
        let status: RegistrationStatus = row.get(0)?;
        let count = row.get::<_, i64>(1)?.max(0) as u64;
        match status {
            RegistrationStatus::Booked => counts.booked = count,
            RegistrationStatus::Cancelled => counts.cancelled = count,
            RegistrationStatus::Finished => counts.finished = count,
        }
    }
    Ok(counts)
}

/// Fee total over registrations that were not cancelled.
pub fn total_fee(conn: &Connection, filter: &RegistrationFilter) -> rusqlite::Result<f64> {
    let (clause, values) = filter_clause(filter);
    let extra = if clause.is_empty() { "WHERE" } else { " AND" };
    conn.query_row(
        &format!(
            "SELECT COALESCE(SUM(fee), 0.0) FROM registrations {}{} status != 'CANCELLED'",
            clause, extra
        ),
        params_from_iter(values),
        |row| row.get(0),
    )
}

pub fn dept_counts(conn: &Connection, filter: &RegistrationFilter) -> rusqlite::Result<Vec<DeptStat>> {
    let (clause, values) = filter_clause(filter);
    let mut stmt = conn.prepare(&format!(
        "SELECT dept_id, COUNT(*) FROM registrations {} GROUP BY dept_id ORDER BY dept_id",
        clause
    ))?;
    let rows = stmt.query_map(params_from_iter(values), |row| {
        Ok(DeptStat {
            dept_id: row.get(0)?,
            count: row.get::<_, i64>(1)?.max(0) as u64,
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_clause_numbers_placeholders_in_order() {
        let filter = RegistrationFilter {
            start_date: NaiveDate::from_ymd_opt(2026, 1, 1),
            end_date: None,
            status: Some(RegistrationStatus::Finished),
        };
        let (clause, values) = filter_clause(&filter);
        assert_eq!(clause, "WHERE work_date >= ?1 AND status = ?2");
        assert_eq!(values.len(), 2);
        assert_eq!(values[1], Value::Text("FINISHED".to_string()));
    }

    #[test]
    fn empty_filter_has_no_where() {
        let (clause, values) = filter_clause(&RegistrationFilter::default());
        assert!(clause.is_empty());
        assert!(values.is_empty());
    }
}
