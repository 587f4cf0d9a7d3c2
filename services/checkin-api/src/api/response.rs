//! Success envelope shared by every v1 endpoint.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct ApiResponse {
    #[serde(skip)]
    code: StatusCode,
    pub status: u16,
    pub message: String,
    pub request_id: String,
    pub data: Value,
}

impl ApiResponse {
    pub fn ok(request_id: impl Into<String>, message: impl Into<String>, data: Value) -> Self {
        Self::with_status(StatusCode::OK, request_id, message, data)
    }

    pub fn created(request_id: impl Into<String>, message: impl Into<String>, data: Value) -> Self {
        Self::with_status(StatusCode::CREATED, request_id, message, data)
    }

    fn with_status(
        code: StatusCode,
        request_id: impl Into<String>,
        message: impl Into<String>,
        data: Value,
    ) -> Self {
        Self {
            code,
            status: code.as_u16(),
            message: message.into(),
            request_id: request_id.into(),
            data,
        }
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        (self.code, Json(self)).into_response()
    }
}
