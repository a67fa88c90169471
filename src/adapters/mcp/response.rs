//! Shared HTTP error mapping for the RPC and UI surfaces.
//!
//! Both surfaces return `Result<Json<T>, ApiError>` from their handlers;
//! `ApiError` maps `DomainError::kind()` onto the status codes agents and
//! UIs actually branch on instead of leaking variant names across the
//! boundary.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::domain::errors::{DomainError, ErrorKind};

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

pub struct ApiError(DomainError);

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0.kind() {
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::NotAuthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::InvalidState | ErrorKind::ValidationFailed => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::DuplicateDetected => StatusCode::OK,
            ErrorKind::CapacityExceeded => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ErrorKind::ExternalUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        };
        let body = ErrorResponse { error: format!("{:?}", self.0.kind()), message: self.0.to_string() };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = Result<Json<T>, ApiError>;
