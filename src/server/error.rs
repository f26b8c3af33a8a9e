//! Error-to-HTTP response conversion.
//!
//! Conversion failures are mapped by [`FailureKind`] alone: unsupported
//! conversions are the client's fault, timeouts get 408, everything else is a
//! server error.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use convertforge_common::RequestId;
use convertforge_engine::{ConversionError, FailureKind};
use serde_json::json;

/// What went wrong while handling a request.
#[derive(Debug)]
pub enum Failure {
    /// The request itself was malformed or refused.
    BadRequest(String),
    /// The body exceeded the configured upload limit.
    PayloadTooLarge(String),
    /// The conversion engine returned a failure.
    Conversion {
        error: ConversionError,
        processing_time_ms: u64,
    },
    /// Anything else on our side.
    Internal(String),
}

/// Wrapper carrying the request id into the error body.
#[derive(Debug)]
pub struct AppError {
    inner: Failure,
    request_id: Option<RequestId>,
}

impl AppError {
    pub fn new(inner: Failure) -> Self {
        Self {
            inner,
            request_id: None,
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(Failure::BadRequest(message.into()))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(Failure::Internal(message.into()))
    }

    pub fn conversion(error: ConversionError, processing_time_ms: u64) -> Self {
        Self::new(Failure::Conversion {
            error,
            processing_time_ms,
        })
    }

    pub fn with_request_id(mut self, id: RequestId) -> Self {
        self.request_id = Some(id);
        self
    }

    pub fn status(&self) -> StatusCode {
        match &self.inner {
            Failure::BadRequest(_) => StatusCode::BAD_REQUEST,
            Failure::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Failure::Conversion { error, .. } => status_for(error.kind()),
            Failure::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Failure> for AppError {
    fn from(inner: Failure) -> Self {
        Self::new(inner)
    }
}

/// HTTP status for a conversion failure kind.
pub fn status_for(kind: FailureKind) -> StatusCode {
    match kind {
        FailureKind::UnsupportedConversion => StatusCode::BAD_REQUEST,
        FailureKind::ProcessTimeout => StatusCode::REQUEST_TIMEOUT,
        FailureKind::ProcessSpawnError
        | FailureKind::ProcessNonZeroExit
        | FailureKind::EmptyOutput
        | FailureKind::MissingOutput => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(
                status = %status,
                error = ?self.inner,
                "Server error in API handler"
            );
        }

        let body = match &self.inner {
            Failure::BadRequest(message) | Failure::PayloadTooLarge(message) => json!({
                "error": message,
                "kind": null,
                "details": null,
                "processing_time_ms": null,
                "request_id": self.request_id,
            }),
            Failure::Conversion {
                error,
                processing_time_ms,
            } => {
                let (headline, details) = match error.kind() {
                    FailureKind::UnsupportedConversion => (error.to_string(), None),
                    FailureKind::ProcessTimeout => (
                        "Conversion timeout - file too large or complex".to_string(),
                        Some(error.to_string()),
                    ),
                    _ => (
                        "Internal conversion error".to_string(),
                        Some(error.to_string()),
                    ),
                };
                json!({
                    "error": headline,
                    "kind": error.kind(),
                    "details": details,
                    "processing_time_ms": processing_time_ms,
                    "request_id": self.request_id,
                })
            }
            Failure::Internal(message) => json!({
                "error": "Internal server error",
                "kind": null,
                "details": message,
                "processing_time_ms": null,
                "request_id": self.request_id,
            }),
        };

        (status, axum::Json(body)).into_response()
    }
}
