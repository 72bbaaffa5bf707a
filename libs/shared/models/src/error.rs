use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::response::ApiResponse;

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not Found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Slot unavailable: {0}")]
    SlotUnavailable(String),

    #[error("Invalid transition: {0}")]
    InvalidTransition(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("External service error: {0}")]
    ExternalService(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal Server Error: {0}")]
    Internal(String),
}

impl AppError {
    /// Code carried in the envelope. The HTTP status itself stays 200.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::SlotUnavailable(_)
            | AppError::InvalidTransition(_)
            | AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::ExternalService(_) => StatusCode::BAD_GATEWAY,
            AppError::Database(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message shown to the caller. Storage and internal details never leave the process.
    pub fn public_message(&self) -> String {
        match self {
            AppError::NotFound(msg)
            | AppError::ValidationError(msg)
            | AppError::SlotUnavailable(msg)
            | AppError::InvalidTransition(msg)
            | AppError::Conflict(msg) => msg.clone(),
            AppError::ExternalService(_) => "Directory service unavailable".to_string(),
            AppError::Database(_) | AppError::Internal(_) => INTERNAL_ERROR_MESSAGE.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!("Error: {}: {}", status, self);
        } else {
            tracing::warn!("Rejected: {}: {}", status, self);
        }

        ApiResponse::<()>::error(status.as_u16(), self.public_message()).into_response()
    }
}
