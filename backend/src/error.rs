use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use video_splitter::SplitError;

/// Request failures, rendered as plain-text bodies.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(&'static str),

    #[error("File too large")]
    PayloadTooLarge,

    #[error("File not found")]
    NotFound,

    #[error("{0}")]
    Internal(&'static str),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .content_type("text/plain; charset=utf-8")
            .body(self.to_string())
    }
}

impl From<SplitError> for ApiError {
    fn from(err: SplitError) -> Self {
        tracing::error!(error = %err, "Split failed");
        match err {
            SplitError::FfmpegFailed { .. } | SplitError::Spawn { .. } => {
                ApiError::Internal("Error processing video")
            }
            SplitError::NoParts => ApiError::Internal("No video parts were created"),
            SplitError::Archive(_) => ApiError::Internal("Error creating zip file"),
            SplitError::InvalidSegment(_) => ApiError::BadRequest("Duration must be positive"),
            _ => ApiError::Internal("An unexpected error occurred"),
        }
    }
}

impl From<std::io::Error> for ApiError {
    fn from(err: std::io::Error) -> Self {
        tracing::error!(error = %err, "I/O failure while handling request");
        ApiError::Internal("An unexpected error occurred")
    }
}
