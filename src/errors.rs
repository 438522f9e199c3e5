use crate::services::{object_client::ClientError, presign::PresignError};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;
use tracing::error;

/// HTTP-facing error carrying an S3-style code alongside the message.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "InternalError", msg)
    }

    pub fn not_found(code: &'static str, msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, code, msg)
    }

    pub fn forbidden(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "AccessDenied", msg)
    }

    pub fn bad_request(code: &'static str, msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, code, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": self.message,
            "code": self.code,
            "status": self.status.as_u16()
        }));

        (self.status, body).into_response()
    }
}

impl From<ClientError> for AppError {
    fn from(err: ClientError) -> Self {
        let message = err.to_string();
        match err {
            ClientError::NoSuchKey(_) => AppError::not_found("NoSuchKey", message),
            ClientError::NoSuchUpload(_) => AppError::not_found("NoSuchUpload", message),
            ClientError::InvalidPart { .. } => AppError::bad_request("InvalidPart", message),
            ClientError::InvalidPartOrder => AppError::bad_request("InvalidPartOrder", message),
            ClientError::InvalidObjectKey => AppError::bad_request("InvalidObjectName", message),
            ClientError::Presign(err) => err.into(),
            ClientError::Sqlx(_) | ClientError::Io(_) | ClientError::Json(_) => {
                error!("storage failure: {}", message);
                AppError::internal(message)
            }
        }
    }
}

impl From<PresignError> for AppError {
    fn from(err: PresignError) -> Self {
        match err {
            PresignError::Expired => AppError::forbidden("request has expired"),
            PresignError::SignatureMismatch => AppError::new(
                StatusCode::FORBIDDEN,
                "SignatureDoesNotMatch",
                err.to_string(),
            ),
            PresignError::UnknownAccessKey(_) => AppError::new(
                StatusCode::FORBIDDEN,
                "InvalidAccessKeyId",
                err.to_string(),
            ),
            PresignError::MissingParameter(_)
            | PresignError::Malformed(_)
            | PresignError::InvalidEndpoint(_) => AppError::forbidden(err.to_string()),
            PresignError::MissingAccessKey
            | PresignError::MissingSecretKey
            | PresignError::InvalidBucket
            | PresignError::InvalidKey => AppError::internal(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}
