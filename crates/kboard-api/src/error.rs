//! API error types and HTTP response mapping.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use kboard_flow::Error as FlowError;

/// API result type.
pub type ApiResult<T> = Result<T, ApiError>;

/// Standard JSON error response body.
///
/// `success` is always false; clients branch on it the same way they do for
/// the success envelopes.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiErrorBody {
    /// Always false.
    pub success: bool,
    /// Stable machine-readable error code.
    pub code: String,
    /// Human-readable message (safe for clients; never a stack trace).
    pub message: String,
}

/// HTTP API error with stable machine-readable code.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    /// Returns an error response for invalid input.
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", message)
    }

    /// Returns an error response for an internal failure.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL", message)
    }

    /// The HTTP status for this error.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// The stable machine-readable code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// The client-safe message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl From<FlowError> for ApiError {
    fn from(err: FlowError) -> Self {
        match &err {
            FlowError::StageLocked { .. } => Self::new(
                StatusCode::CONFLICT,
                "STAGE_LOCKED",
                "a collection is already running; please wait for it to finish",
            ),
            FlowError::PrerequisiteNotMet { .. } => {
                Self::new(StatusCode::CONFLICT, "PREREQUISITE_NOT_MET", err.to_string())
            }
            FlowError::UnknownPeriod { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "UNKNOWN_PERIOD", err.to_string())
            }
            FlowError::MissingBounds => {
                Self::new(StatusCode::BAD_REQUEST, "MISSING_BOUNDS", err.to_string())
            }
            FlowError::InvalidWindow { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "INVALID_WINDOW", err.to_string())
            }
            FlowError::Timeout { .. } => {
                Self::new(StatusCode::REQUEST_TIMEOUT, "WORKER_TIMEOUT", err.to_string())
            }
            FlowError::Spawn { .. }
            | FlowError::WorkerExit { .. }
            | FlowError::MalformedOutput { .. } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "WORKER_FAILED",
                err.to_string(),
            ),
            FlowError::Core(core) => Self::from_core(core),
        }
    }
}

impl From<kboard_core::Error> for ApiError {
    fn from(err: kboard_core::Error) -> Self {
        Self::from_core(&err)
    }
}

impl ApiError {
    fn from_core(err: &kboard_core::Error) -> Self {
        match err {
            kboard_core::Error::InvalidInput(_) => Self::bad_request(err.to_string()),
            kboard_core::Error::Storage { message, .. } => Self::new(
                StatusCode::INTERNAL_SERVER_ERROR,
                "STORAGE_ERROR",
                message.clone(),
            ),
            _ => Self::internal(err.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ApiErrorBody {
            success: false,
            code: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
