use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use hatescore_core::ScoreError;
use tracing::{debug, error};

use crate::protocol::ErrorBody;

/// A `ScoreError` on its way out as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ScoreError);

impl ApiError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self.0 {
            ScoreError::NotLoaded(_) | ScoreError::Inference(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ScoreError::InvalidInput(_) | ScoreError::MalformedRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            ScoreError::BatchTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        }
    }
}

impl From<ScoreError> for ApiError {
    fn from(e: ScoreError) -> Self {
        Self(e)
    }
}

/// Undecodable bodies are reported as malformed requests with the usual
/// `detail` body.
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self(ScoreError::MalformedRequest(rejection.body_text()))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if self.0.is_caller_error() {
            debug!(%status, error = %self.0, "request rejected");
        } else {
            error!(%status, error = %self.0, "request failed");
        }
        (
            status,
            Json(ErrorBody {
                detail: self.0.to_string(),
            }),
        )
            .into_response()
    }
}
