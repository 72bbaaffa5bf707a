// libs/registration-cell/src/handlers.rs
use std::sync::Arc;

use axum::{
    extract::{
        rejection::{JsonRejection, PathRejection, QueryRejection},
        Path, Query, State,
    },
    Json,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use shared_models::{ApiResponse, AppError, PageResult};
use shared_utils::pagination::Pagination;

use crate::models::{
    parse_date, CreateRegistrationRequest, RegisterSlotRequest, Registration, RegistrationFilter,
    RegistrationStats, Schedule, SlotDiscrepancy,
};
use crate::services::booking::RegistrationBookingService;

// ==============================================================================
// QUERY PARAMETER STRUCTS
// ==============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatientQuery {
    pub patient_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationListQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationPageQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub status: Option<String>,
    pub page: Option<i64>,
    pub page_size: Option<i64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AvailableSlotsQuery {
    pub dept_id: Option<i64>,
    pub work_date: Option<String>,
}

// Extractor rejections still answer with the envelope.
fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, AppError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| AppError::ValidationError(rejection.body_text()))
}

fn path_id(path: Result<Path<i64>, PathRejection>) -> Result<i64, AppError> {
    let Path(id) = path.map_err(|rejection| AppError::ValidationError(rejection.body_text()))?;
    if id <= 0 {
        return Err(AppError::ValidationError("id must be a positive integer".to_string()));
    }
    Ok(id)
}

fn query_params<T>(query: Result<Query<T>, QueryRejection>) -> Result<T, AppError> {
    query
        .map(|Query(value)| value)
        .map_err(|rejection| AppError::ValidationError(rejection.body_text()))
}

// ==============================================================================
// REGISTRATION HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn create_registration(
    State(service): State<Arc<RegistrationBookingService>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<ApiResponse<Registration>, AppError> {
    let request = CreateRegistrationRequest::from_json(&json_body(body)?)?;
    let registration = service.create_registration(request).await?;
    Ok(ApiResponse::success_with_message("Registration successful", registration))
}

#[axum::debug_handler]
pub async fn cancel_registration(
    State(service): State<Arc<RegistrationBookingService>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<ApiResponse<()>, AppError> {
    let reg_id = path_id(path)?;
    service.cancel_registration(reg_id).await?;
    Ok(ApiResponse::ok("Registration cancelled"))
}

#[axum::debug_handler]
pub async fn finish_registration(
    State(service): State<Arc<RegistrationBookingService>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<ApiResponse<()>, AppError> {
    let reg_id = path_id(path)?;
    service.finish_registration(reg_id).await?;
    Ok(ApiResponse::ok("Registration finished"))
}

#[axum::debug_handler]
pub async fn get_registration(
    State(service): State<Arc<RegistrationBookingService>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<ApiResponse<Registration>, AppError> {
    let reg_id = path_id(path)?;
    Ok(ApiResponse::success(service.get_registration(reg_id).await?))
}

#[axum::debug_handler]
pub async fn list_my_registrations(
    State(service): State<Arc<RegistrationBookingService>>,
    query: Result<Query<PatientQuery>, QueryRejection>,
) -> Result<ApiResponse<Vec<Registration>>, AppError> {
    let patient_id = query_params(query)?
        .patient_id
        .ok_or_else(|| AppError::ValidationError("patientId is required".to_string()))?;
    Ok(ApiResponse::success(service.list_by_patient(patient_id).await?))
}

#[axum::debug_handler]
pub async fn list_registrations(
    State(service): State<Arc<RegistrationBookingService>>,
    query: Result<Query<RegistrationListQuery>, QueryRejection>,
) -> Result<ApiResponse<Vec<Registration>>, AppError> {
    let query = query_params(query)?;
    let filter = RegistrationFilter::parse(
        query.start_date.as_deref(),
        query.end_date.as_deref(),
        query.status.as_deref(),
    )?;
    Ok(ApiResponse::success(service.list_registrations(&filter).await?))
}

#[axum::debug_handler]
pub async fn list_registrations_page(
    State(service): State<Arc<RegistrationBookingService>>,
    query: Result<Query<RegistrationPageQuery>, QueryRejection>,
) -> Result<ApiResponse<PageResult<Registration>>, AppError> {
    let query = query_params(query)?;
    let filter = RegistrationFilter::parse(
        query.start_date.as_deref(),
        query.end_date.as_deref(),
        query.status.as_deref(),
    )?;
    let page = Pagination::clamp(query.page, query.page_size);
    debug!("Registration page request {:?}", page);
    Ok(ApiResponse::success(service.list_registrations_page(&filter, page).await?))
}

#[axum::debug_handler]
pub async fn get_statistics(
    State(service): State<Arc<RegistrationBookingService>>,
    query: Result<Query<StatisticsQuery>, QueryRejection>,
) -> Result<ApiResponse<RegistrationStats>, AppError> {
    let query = query_params(query)?;
    let filter = RegistrationFilter::parse(query.start_date.as_deref(), query.end_date.as_deref(), None)?;
    Ok(ApiResponse::success(service.statistics(filter.start_date, filter.end_date).await?))
}

// ==============================================================================
// SCHEDULE HANDLERS
// ==============================================================================

#[axum::debug_handler]
pub async fn register_slot(
    State(service): State<Arc<RegistrationBookingService>>,
    body: Result<Json<RegisterSlotRequest>, JsonRejection>,
) -> Result<ApiResponse<Schedule>, AppError> {
    let request = json_body(body)?;
    let schedule = service.register_slot(request).await?;
    Ok(ApiResponse::success_with_message("Schedule registered", schedule))
}

#[axum::debug_handler]
pub async fn get_slot(
    State(service): State<Arc<RegistrationBookingService>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<ApiResponse<Schedule>, AppError> {
    let schedule_id = path_id(path)?;
    Ok(ApiResponse::success(service.get_slot(schedule_id).await?))
}

#[axum::debug_handler]
pub async fn list_available_slots(
    State(service): State<Arc<RegistrationBookingService>>,
    query: Result<Query<AvailableSlotsQuery>, QueryRejection>,
) -> Result<ApiResponse<Vec<Schedule>>, AppError> {
    let query = query_params(query)?;
    let (Some(dept_id), Some(work_date)) = (query.dept_id, parse_date(query.work_date.as_deref(), "workDate")?)
    else {
        return Err(AppError::ValidationError("deptId and workDate are required".to_string()));
    };
    Ok(ApiResponse::success(service.list_available_slots(dept_id, work_date).await?))
}

#[axum::debug_handler]
pub async fn open_slot(
    State(service): State<Arc<RegistrationBookingService>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<ApiResponse<Schedule>, AppError> {
    let schedule_id = path_id(path)?;
    Ok(ApiResponse::success(service.open_slot(schedule_id).await?))
}

#[axum::debug_handler]
pub async fn close_slot(
    State(service): State<Arc<RegistrationBookingService>>,
    path: Result<Path<i64>, PathRejection>,
) -> Result<ApiResponse<Schedule>, AppError> {
    let schedule_id = path_id(path)?;
    Ok(ApiResponse::success(service.close_slot(schedule_id).await?))
}

#[axum::debug_handler]
pub async fn check_consistency(
    State(service): State<Arc<RegistrationBookingService>>,
) -> Result<ApiResponse<Vec<SlotDiscrepancy>>, AppError> {
    Ok(ApiResponse::success(service.audit_slots().await?))
}
