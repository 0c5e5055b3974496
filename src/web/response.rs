//! JSON envelope shared by every endpoint.
//!
//! Success: `{ "success": true, "data": ..., "message": ... }`
//! Failure: `{ "success": false, "error": { "code", "message", "details" } }`

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;

/// Body of a successful response.
#[derive(Debug, Serialize)]
pub struct ApiResponse<T>
where
    T: Serialize,
{
    /// Always `true`
    pub success: bool,
    /// Payload, absent for acknowledgements
    pub data: Option<T>,
    /// Human-readable summary
    pub message: Option<String>,
}

/// Error part of a failed response.
#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    /// Stable machine-readable code such as `ALREADY_REDEEMED`
    pub code: String,
    /// Human-readable explanation
    pub message: String,
    /// Structured context, e.g. the ticket of a rejected scan
    pub details: Option<Value>,
}

/// Body of a failed response.
#[derive(Debug, Serialize)]
pub struct ApiErrorResponse {
    /// Always `false`
    pub success: bool,
    /// What went wrong
    pub error: ApiErrorBody,
}

/// 200 with `data`.
pub fn success<T>(data: T, message: impl Into<String>) -> Response
where
    T: Serialize,
{
    with_status(StatusCode::OK, data, message)
}

/// 201 with the created resource.
pub fn created<T>(data: T, message: impl Into<String>) -> Response
where
    T: Serialize,
{
    with_status(StatusCode::CREATED, data, message)
}

fn with_status<T>(status: StatusCode, data: T, message: impl Into<String>) -> Response
where
    T: Serialize,
{
    let body = ApiResponse {
        success: true,
        data: Some(data),
        message: Some(message.into()),
    };
    (status, Json(body)).into_response()
}

/// 200 without data.
pub fn empty_success(message: impl Into<String>) -> Response {
    let body: ApiResponse<()> = ApiResponse {
        success: true,
        data: None,
        message: Some(message.into()),
    };
    (StatusCode::OK, Json(body)).into_response()
}

/// Error envelope with the given status.
pub fn error(
    code: &str,
    message: impl Into<String>,
    details: Option<Value>,
    status: StatusCode,
) -> Response {
    let body = ApiErrorResponse {
        success: false,
        error: ApiErrorBody {
            code: code.to_string(),
            message: message.into(),
            details,
        },
    };

    (status, Json(body)).into_response()
}
