use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::services::ServiceError;

#[derive(Debug, Serialize)]
struct ErrorResponse {
    status: u16,
    code: &'static str,
    detail: String,
}

#[derive(Debug)]
pub(crate) enum ApiError {
    Unauthorized(&'static str),
    Forbidden(String),
    BadRequest(String),
    NotFound(String),
    /// 409 with a machine-readable reason: `not_available`, `closed`, `invalid_state`, ...
    Conflict { code: &'static str, detail: String },
    Internal(String),
}

impl ApiError {
    /// Log the underlying error with context and return an `Internal` variant.
    pub(crate) fn internal(err: impl std::fmt::Display, context: &str) -> Self {
        tracing::error!(error = %err, "{context}");
        Self::Internal(context.to_string())
    }

    fn conflict(code: &'static str, err: &ServiceError) -> Self {
        Self::Conflict { code, detail: err.to_string() }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match &err {
            ServiceError::NotFound(_) => Self::NotFound(err.to_string()),
            ServiceError::NotAvailable(_) => Self::conflict("not_available", &err),
            ServiceError::NotYetOpen => Self::conflict("not_yet_open", &err),
            ServiceError::Closed(_) => Self::conflict("closed", &err),
            ServiceError::AttemptLimitExceeded { .. } => {
                Self::conflict("attempt_limit_exceeded", &err)
            }
            ServiceError::InvalidState(_) => Self::conflict("invalid_state", &err),
            ServiceError::Forbidden(_) => Self::Forbidden(err.to_string()),
            ServiceError::Validation(message) => Self::BadRequest(message.clone()),
            ServiceError::Store(store) => Self::internal(store, "Storage operation failed"),
        }
    }
}

fn json_error(status: StatusCode, code: &'static str, detail: String) -> Response {
    (status, Json(ErrorResponse { status: status.as_u16(), code, detail })).into_response()
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(message) => {
                let mut response =
                    json_error(StatusCode::UNAUTHORIZED, "unauthorized", message.to_string());
                response
                    .headers_mut()
                    .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer"));
                response
            }
            ApiError::Forbidden(message) => json_error(StatusCode::FORBIDDEN, "forbidden", message),
            ApiError::BadRequest(message) => {
                json_error(StatusCode::BAD_REQUEST, "bad_request", message)
            }
            ApiError::NotFound(message) => json_error(StatusCode::NOT_FOUND, "not_found", message),
            ApiError::Conflict { code, detail } => json_error(StatusCode::CONFLICT, code, detail),
            ApiError::Internal(message) => {
                tracing::error!(error = %message, "Internal server error");
                json_error(StatusCode::INTERNAL_SERVER_ERROR, "internal", message)
            }
        }
    }
}
