//! API error types with IntoResponse
//!
//! Every response, success or failure, uses the same envelope:
//! `{"code": <int>, "message": <string>, "data": <object>}`.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use serde_json::json;

use crate::repository::RepoError;
use crate::service::ServiceError;

/// Response envelope
#[derive(Debug, Serialize)]
pub struct Envelope<T> {
    pub code: i32,
    pub message: String,
    pub data: T,
}

/// Wrap `data` in a success envelope (`code` 0).
pub fn ok<T: Serialize>(data: T) -> Json<Envelope<T>> {
    Json(Envelope {
        code: 0,
        message: "ok".to_string(),
        data,
    })
}

/// API error type with automatic HTTP status mapping
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Malformed or unauthenticated request (400)
    BadRequest,

    /// Resource not found (404)
    NotFound,

    /// Registration with an email that already exists (400, code 1001)
    EmailAlreadyInUse,

    /// Internal error (500, logged)
    Internal { message: String },
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest | Self::EmailAlreadyInUse => StatusCode::BAD_REQUEST,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Application error code carried in the envelope.
    pub fn code(&self) -> i32 {
        match self {
            Self::BadRequest => 400,
            Self::NotFound => 404,
            Self::EmailAlreadyInUse => 1001,
            Self::Internal { .. } => 500,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            Self::BadRequest => "Bad Request",
            Self::NotFound => "Not Found",
            Self::EmailAlreadyInUse => "The email is already in use.",
            Self::Internal { .. } => "Internal Server Error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal { message } = &self {
            tracing::error!("Internal error: {}", message);
        }

        let body = Envelope {
            code: self.code(),
            message: self.message().to_string(),
            data: json!({}),
        };

        (self.status(), Json(body)).into_response()
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound { .. } => Self::NotFound,
            other => Self::Internal {
                message: other.to_string(),
            },
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        match e {
            ServiceError::EmailInUse => Self::EmailAlreadyInUse,
            ServiceError::Invalid { .. } => Self::BadRequest,
            ServiceError::Repo(e) => e.into(),
        }
    }
}
