// libs/registration-cell/src/repository/schedule.rs
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::models::{RegisterSlotRequest, Schedule, SlotDiscrepancy, SlotStatus};

const SCHEDULE_COLUMNS: &str = "schedule_id, doctor_id, dept_id, work_date, time_slot, \
                                total_quota, remaining_quota, fee, status";

fn schedule_from_row(row: &Row<'_>) -> rusqlite::Result<Schedule> {
    Ok(Schedule {
        schedule_id: row.get(0)?,
        doctor_id: row.get(1)?,
        dept_id: row.get(2)?,
        work_date: row.get(3)?,
        time_slot: row.get(4)?,
        total_quota: row.get(5)?,
        remaining_quota: row.get(6)?,
        fee: row.get(7)?,
        status: row.get(8)?,
    })
}

/// Inserts an imported slot as OPEN with its full quota available.
pub fn insert_schedule(conn: &Connection, request: &RegisterSlotRequest) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO schedules (schedule_id, doctor_id, dept_id, work_date, time_slot,
                                total_quota, remaining_quota, fee, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6, ?7, ?8)",
        params![
            request.schedule_id,
            request.doctor_id,
            request.dept_id,
            request.work_date,
            request.time_slot,
            request.total_quota,
            request.fee,
            SlotStatus::Open,
        ],
    )?;
    Ok(())
}

pub fn find_schedule(conn: &Connection, schedule_id: i64) -> rusqlite::Result<Option<Schedule>> {
    conn.query_row(
        &format!("SELECT {} FROM schedules WHERE schedule_id = ?1", SCHEDULE_COLUMNS),
        [schedule_id],
        schedule_from_row,
    )
    .optional()
}

/// OPEN slots of a department on one day that still have quota.
pub fn list_available(
    conn: &Connection,
    dept_id: i64,
    work_date: NaiveDate,
) -> rusqlite::Result<Vec<Schedule>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM schedules
         WHERE dept_id = ?1 AND work_date = ?2 AND status = 'OPEN' AND remaining_quota > 0
         ORDER BY time_slot, schedule_id",
        SCHEDULE_COLUMNS
    ))?;
    let rows = stmt.query_map(params![dept_id, work_date], schedule_from_row)?;
    rows.collect()
}

/// Takes one unit of quota. Returns the number of rows changed: 0 when the slot is
/// closed, exhausted or unknown.
pub fn decrement_quota(conn: &Connection, schedule_id: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE schedules SET remaining_quota = remaining_quota - 1
         WHERE schedule_id = ?1 AND status = 'OPEN' AND remaining_quota > 0",
        [schedule_id],
    )
}

/// Returns one unit of quota, never above the slot total.
pub fn increment_quota(conn: &Connection, schedule_id: i64) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE schedules SET remaining_quota = MIN(remaining_quota + 1, total_quota)
         WHERE schedule_id = ?1",
        [schedule_id],
    )
}

pub fn set_status(conn: &Connection, schedule_id: i64, status: SlotStatus) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE schedules SET status = ?2 WHERE schedule_id = ?1",
        params![schedule_id, status],
    )
}

pub fn last_queue_no(conn: &Connection, schedule_id: i64) -> rusqlite::Result<Option<i32>> {
    conn.query_row(
        "SELECT last_queue_no FROM schedules WHERE schedule_id = ?1",
        [schedule_id],
        |row| row.get(0),
    )
    .optional()
}

pub fn store_queue_no(conn: &Connection, schedule_id: i64, queue_no: i32) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE schedules SET last_queue_no = ?2 WHERE schedule_id = ?1",
        params![schedule_id, queue_no],
    )
}

/// Slots whose consumed quota differs from the number of BOOKED or FINISHED
/// registrations held against them.
pub fn find_discrepancies(conn: &Connection) -> rusqlite::Result<Vec<SlotDiscrepancy>> {
    let mut stmt = conn.prepare(
        "SELECT s.schedule_id, s.total_quota, s.remaining_quota, COUNT(r.reg_id) AS occupied
         FROM schedules s
         LEFT JOIN registrations r
                ON r.schedule_id = s.schedule_id AND r.status IN ('BOOKED', 'FINISHED')
         GROUP BY s.schedule_id, s.total_quota, s.remaining_quota
         HAVING s.total_quota - s.remaining_quota != COUNT(r.reg_id)
         ORDER BY s.schedule_id",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(SlotDiscrepancy {
            schedule_id: row.get(0)?,
            total_quota: row.get(1)?,
            remaining_quota: row.get(2)?,
            occupied_registrations: row.get(3)?,
        })
    })?;
    rows.collect()
}
