//! HTTP error mapping.
//!
//! Every non-2xx response carries the same body shape:
//! `{"error": {"error_code", "message", "request_id"}}`. The status code is
//! derived from the error kind (configuration 400, validation/pipeline/parse
//! 422, permission 403, infrastructure 502, otherwise 500).

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use graphmind::error::Error;
use serde::{Deserialize, Serialize};

/// Error payload carried in every non-2xx body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub error_code: String,
    pub message: String,
    pub request_id: String,
}

/// Error body wrapper
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

/// A service error paired with the request id for correlation
#[derive(Debug)]
pub struct ApiError {
    pub error: Error,
    pub request_id: String,
}

impl ApiError {
    #[must_use]
    pub fn new(error: Error, request_id: impl Into<String>) -> Self {
        Self {
            error,
            request_id: request_id.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.error.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = Json(ErrorBody {
            error: ErrorDetail {
                error_code: self.error.error_code().to_string(),
                message: self.error.to_string(),
                request_id: self.request_id,
            },
        });
        (status, body).into_response()
    }
}
