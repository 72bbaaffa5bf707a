// libs/registration-cell/src/models.rs
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::RegistrationError;

pub const MAX_TOTAL_QUOTA: i32 = 100;

// ==============================================================================
// SLOT (SCHEDULE) MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum TimeSlot {
    #[serde(rename = "AM")]
    Am,
    #[serde(rename = "PM")]
    Pm,
}

impl TimeSlot {
    pub fn as_str(&self) -> &'static str {
        match self {
            TimeSlot::Am => "AM",
            TimeSlot::Pm => "PM",
        }
    }

    /// Clinic start of the session; patients are called from this time on.
    pub fn visit_start(&self) -> NaiveTime {
        match self {
            TimeSlot::Am => NaiveTime::from_hms_opt(8, 0, 0).unwrap_or(NaiveTime::MIN),
            TimeSlot::Pm => NaiveTime::from_hms_opt(14, 0, 0).unwrap_or(NaiveTime::MIN),
        }
    }
}

impl fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeSlot {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "AM" => Ok(TimeSlot::Am),
            "PM" => Ok(TimeSlot::Pm),
            other => Err(RegistrationError::ValidationError(format!(
                "timeSlot must be AM or PM, got {:?}",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlotStatus {
    Open,
    Closed,
}

impl SlotStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SlotStatus::Open => "OPEN",
            SlotStatus::Closed => "CLOSED",
        }
    }
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SlotStatus {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(SlotStatus::Open),
            "CLOSED" => Ok(SlotStatus::Closed),
            other => Err(RegistrationError::ValidationError(format!(
                "Unknown slot status {:?}",
                other
            ))),
        }
    }
}

/// One doctor's bookable session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Schedule {
    pub schedule_id: i64,
    pub doctor_id: i64,
    pub dept_id: i64,
    pub work_date: NaiveDate,
    pub time_slot: TimeSlot,
    pub total_quota: i32,
    pub remaining_quota: i32,
    pub fee: f64,
    pub status: SlotStatus,
}

/// An existing slot imported from the scheduling directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSlotRequest {
    pub schedule_id: i64,
    pub doctor_id: i64,
    pub dept_id: i64,
    pub work_date: NaiveDate,
    pub time_slot: TimeSlot,
    pub total_quota: i32,
    pub fee: f64,
}

impl RegisterSlotRequest {
    pub fn validate(&self) -> Result<(), RegistrationError> {
        let mut errors = Vec::new();
        if self.schedule_id <= 0 {
            errors.push("scheduleId must be positive".to_string());
        }
        if self.doctor_id <= 0 {
            errors.push("doctorId must be positive".to_string());
        }
        if self.dept_id <= 0 {
            errors.push("deptId must be positive".to_string());
        }
        if !(1..=MAX_TOTAL_QUOTA).contains(&self.total_quota) {
            errors.push(format!("totalQuota must be between 1 and {}", MAX_TOTAL_QUOTA));
        }
        if !self.fee.is_finite() || self.fee < 0.0 {
            errors.push("fee must be a non-negative amount".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(RegistrationError::ValidationError(errors.join("; ")))
        }
    }
}

// ==============================================================================
// REGISTRATION MODELS
// ==============================================================================

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrationStatus {
    Booked,
    Cancelled,
    Finished,
}

impl RegistrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RegistrationStatus::Booked => "BOOKED",
            RegistrationStatus::Cancelled => "CANCELLED",
            RegistrationStatus::Finished => "FINISHED",
        }
    }

    pub fn can_transition_to(&self, target: &RegistrationStatus) -> bool {
        use RegistrationStatus::*;
        matches!((self, target), (Booked, Cancelled) | (Booked, Finished))
    }
}

impl fmt::Display for RegistrationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegistrationStatus {
    type Err = RegistrationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BOOKED" => Ok(RegistrationStatus::Booked),
            "CANCELLED" => Ok(RegistrationStatus::Cancelled),
            "FINISHED" => Ok(RegistrationStatus::Finished),
            other => Err(RegistrationError::ValidationError(format!(
                "status must be one of BOOKED, CANCELLED, FINISHED, got {:?}",
                other
            ))),
        }
    }
}

/// One patient's claim on a slot. Doctor, department, date, session and fee are
/// copied from the slot at booking time for reporting.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub reg_id: i64,
    pub reg_no: String,
    pub patient_id: i64,
    pub schedule_id: i64,
    pub doctor_id: i64,
    pub dept_id: i64,
    pub work_date: NaiveDate,
    pub time_slot: TimeSlot,
    pub queue_no: i32,
    pub fee: f64,
    pub status: RegistrationStatus,
    pub reg_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl Registration {
    /// Local start of the visit this registration is for.
    pub fn visit_start(&self) -> NaiveDateTime {
        self.work_date.and_time(self.time_slot.visit_start())
    }
}

/// `GH{yyyyMMdd}{AM|PM}-{scheduleId:06}-{queueNo:03}`. The separators keep the
/// number unique even once ids outgrow their padding.
pub fn format_reg_no(work_date: NaiveDate, time_slot: TimeSlot, schedule_id: i64, queue_no: i32) -> String {
    format!(
        "GH{}{}-{:06}-{:03}",
        work_date.format("%Y%m%d"),
        time_slot,
        schedule_id,
        queue_no
    )
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CreateRegistrationRequest {
    pub patient_id: i64,
    pub schedule_id: i64,
}

impl CreateRegistrationRequest {
    /// Converts an untyped request body into a typed request.
    pub fn from_json(body: &Value) -> Result<Self, RegistrationError> {
        let patient_id = positive_id(body, "patientId")?;
        let schedule_id = positive_id(body, "scheduleId")?;
        Ok(Self {
            patient_id,
            schedule_id,
        })
    }
}

fn positive_id(body: &Value, field: &str) -> Result<i64, RegistrationError> {
    match body.get(field) {
        None | Some(Value::Null) => Err(RegistrationError::ValidationError(
            "patientId and scheduleId are required".to_string(),
        )),
        Some(value) => match value.as_i64() {
            Some(id) if id > 0 => Ok(id),
            _ => Err(RegistrationError::ValidationError(format!(
                "{} must be a positive integer",
                field
            ))),
        },
    }
}

// ==============================================================================
// QUERY / REPORTING MODELS
// ==============================================================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RegistrationFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub status: Option<RegistrationStatus>,
}

impl RegistrationFilter {
    /// Parses boundary strings. Empty strings are treated as absent.
    pub fn parse(
        start_date: Option<&str>,
        end_date: Option<&str>,
        status: Option<&str>,
    ) -> Result<Self, RegistrationError> {
        let filter = Self {
            start_date: parse_date(start_date, "startDate")?,
            end_date: parse_date(end_date, "endDate")?,
            status: non_empty(status).map(str::parse::<RegistrationStatus>).transpose()?,
        };

        if let (Some(start), Some(end)) = (filter.start_date, filter.end_date) {
            if start > end {
                return Err(RegistrationError::ValidationError(
                    "startDate must not be after endDate".to_string(),
                ));
            }
        }

        Ok(filter)
    }
}

pub fn parse_date(raw: Option<&str>, field: &str) -> Result<Option<NaiveDate>, RegistrationError> {
    non_empty(raw)
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|_| {
                RegistrationError::ValidationError(format!("{} must be a yyyy-MM-dd date", field))
            })
        })
        .transpose()
}

fn non_empty(raw: Option<&str>) -> Option<&str> {
    raw.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DeptStat {
    pub dept_id: i64,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationStats {
    pub booked_count: u64,
    pub cancelled_count: u64,
    pub finished_count: u64,
    /// Sum of fees over registrations that were not cancelled.
    pub total_fee: f64,
    pub dept_stats: Vec<DeptStat>,
}

/// A slot whose consumed quota disagrees with its live registrations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SlotDiscrepancy {
    pub schedule_id: i64,
    pub total_quota: i32,
    pub remaining_quota: i32,
    pub occupied_registrations: i64,
}
