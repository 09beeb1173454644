use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Failure categories of a single resolution request.
///
/// Every variant is caught at the request boundary and turned into an
/// [`ApiError`]; the `detail` payloads are for server logs only.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("URL is required")]
    MissingUrl,
    #[error("access denied: {message}")]
    AccessDenied { message: String, detail: String },
    #[error("extraction failed: {detail}")]
    Extraction { detail: String },
    #[error("conversion produced no file: {detail}")]
    ConversionFailed { detail: String },
    #[error("unexpected failure: {detail}")]
    Unexpected { detail: String },
}

impl FetchError {
    pub fn unexpected(detail: impl Into<String>) -> Self {
        Self::Unexpected {
            detail: detail.into(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::ConversionFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::MissingUrl
            | Self::AccessDenied { .. }
            | Self::Extraction { .. }
            | Self::Unexpected { .. } => StatusCode::BAD_REQUEST,
        }
    }

    /// Message safe to show to the caller.
    pub fn client_message(&self) -> String {
        match self {
            Self::MissingUrl => "URL is required".to_string(),
            Self::AccessDenied { message, .. } => message.clone(),
            Self::Extraction { .. } => {
                "Could not fetch this link. Check that it is valid and publicly available."
                    .to_string()
            }
            Self::ConversionFailed { .. } => "Failed to convert to MP3".to_string(),
            Self::Unexpected { .. } => "Internal error while processing the link.".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }
}

impl From<FetchError> for ApiError {
    fn from(error: FetchError) -> Self {
        Self {
            status: error.status(),
            message: error.client_message(),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(ErrorBody { error: self.message })).into_response()
    }
}
