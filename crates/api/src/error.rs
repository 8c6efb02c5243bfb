//! Request error mapping

use axum::extract::multipart::MultipartRejection;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use inference_engine::InferenceError;
use serde::Serialize;
use thiserror::Error;

/// Broad class of a request failure
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The client sent something the models cannot use
    BadInput,
    /// The model failed on valid input
    Inference,
    /// The request did not match the endpoint's schema
    Validation,
}

impl ErrorKind {
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorKind::BadInput => StatusCode::BAD_REQUEST,
            ErrorKind::Inference => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Validation => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::BadInput => "bad_input",
            ErrorKind::Inference => "inference",
            ErrorKind::Validation => "validation",
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Inference(#[from] InferenceError),

    #[error("Inference task failed: {0}")]
    Worker(String),

    #[error("Invalid upload: {0}")]
    Upload(String),

    #[error("{message}")]
    Validation { status: StatusCode, message: String },
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug, Serialize)]
struct ValidationBody {
    detail: String,
}

impl ApiError {
    pub fn missing_field(name: &str) -> Self {
        ApiError::Validation {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: format!("Field required: {}", name),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Inference(e) if e.is_bad_input() => ErrorKind::BadInput,
            ApiError::Inference(_) | ApiError::Worker(_) => ErrorKind::Inference,
            ApiError::Upload(_) => ErrorKind::BadInput,
            ApiError::Validation { .. } => ErrorKind::Validation,
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation { status, .. } => *status,
            _ => self.kind().status(),
        }
    }

    /// Render the error. Validation failures always carry their own status;
    /// other failures answer 200 with an `error` body unless `strict` is set.
    pub fn into_response_with(self, strict: bool) -> Response {
        match self.kind() {
            ErrorKind::Validation => self.into_response(),
            _ if strict => self.into_response(),
            _ => (StatusCode::OK, Json(ErrorBody { error: self.to_string() })).into_response(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        match self {
            ApiError::Validation { message, .. } => {
                (status, Json(ValidationBody { detail: message })).into_response()
            }
            other => (status, Json(ErrorBody { error: other.to_string() })).into_response(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation {
            status: rejection.status(),
            message: rejection.body_text(),
        }
    }
}

/// A body that is not `multipart/form-data` fails form validation like a
/// missing field does, so it answers 422 rather than axum's 400
impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError::Validation {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: rejection.body_text(),
        }
    }
}
