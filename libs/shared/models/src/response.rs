use axum::{
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

pub const SUCCESS_CODE: u16 = 200;

/// Uniform `{code, message, data}` envelope. Any code other than 200 is a failure
/// and carries no usable data.
///
/// The envelope always travels with HTTP 200; callers branch on `code`, not on
/// the transport status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub code: u16,
    pub message: String,
    pub data: Option<T>,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self::success_with_message("success", data)
    }

    pub fn success_with_message(message: impl Into<String>, data: T) -> Self {
        Self {
            code: SUCCESS_CODE,
            message: message.into(),
            data: Some(data),
        }
    }

    pub fn error(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }
}

impl ApiResponse<()> {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            code: SUCCESS_CODE,
            message: message.into(),
            data: None,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        Json(self).into_response()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResult<T> {
    pub list: Vec<T>,
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
}

impl<T> PageResult<T> {
    pub fn of(list: Vec<T>, total: u64, page: u32, page_size: u32) -> Self {
        Self {
            list,
            total,
            page,
            page_size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::to_bytes, http::StatusCode};
    use serde_json::{json, Value};

    #[test]
    fn error_envelope_has_null_data() {
        let body = serde_json::to_value(ApiResponse::<()>::error(404, "Registration not found")).unwrap();
        assert_eq!(body, json!({"code": 404, "message": "Registration not found", "data": null}));
    }

    #[tokio::test]
    async fn failure_envelope_is_sent_with_http_ok() {
        let response = ApiResponse::<()>::error(409, "Slot 1 is unavailable").into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], 409);
        assert_eq!(body["message"], "Slot 1 is unavailable");
    }

    #[test]
    fn page_result_uses_client_field_names() {
        let page = PageResult::of(vec![1, 2], 12, 2, 2);
        let body = serde_json::to_value(page).unwrap();
        assert_eq!(body["pageSize"], 2);
        assert_eq!(body["total"], 12);
    }
}
