use crate::error::{CoordinatorError, ErrorKind};
use axum::{
    extract::multipart::MultipartRejection,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
}

/// Handler error with HTTP status mapping
#[derive(Debug)]
pub enum ApiError {
    Coordinator(CoordinatorError),
    BadRequest(String),
}

impl From<CoordinatorError> for ApiError {
    fn from(e: CoordinatorError) -> Self {
        ApiError::Coordinator(e)
    }
}

// Extractor rejections share the JSON error body instead of axum's plain text
macro_rules! bad_request_from_rejection {
    ($($rejection:ty),+) => {
        $(
            impl From<$rejection> for ApiError {
                fn from(rejection: $rejection) -> Self {
                    ApiError::BadRequest(rejection.body_text())
                }
            }
        )+
    };
}

bad_request_from_rejection!(JsonRejection, PathRejection, QueryRejection, MultipartRejection);

pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::QuotaExceeded => StatusCode::PAYMENT_REQUIRED,
        ErrorKind::SubscriptionInactive => StatusCode::FORBIDDEN,
        ErrorKind::SessionNotFound | ErrorKind::UnknownPlan => StatusCode::NOT_FOUND,
        ErrorKind::InvalidSessionState | ErrorKind::OutOfOrderUtterance => StatusCode::CONFLICT,
        ErrorKind::InvalidAudio => StatusCode::BAD_REQUEST,
        ErrorKind::TranscriptionUnavailable | ErrorKind::StorageUnavailable => {
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::Coordinator(e) => {
                let kind = e.kind();
                if kind == ErrorKind::StorageUnavailable {
                    error!("Storage failure: {}", e);
                }
                (status_for(kind), kind.as_str().to_string(), e.to_string())
            }
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, "bad_request".to_string(), message)
            }
        };

        (status, Json(ErrorResponse { error, message })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
