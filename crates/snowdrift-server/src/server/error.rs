//! Request errors and their HTTP mapping.
//!
//! Every error is returned as `{"error": "<message>"}`. Client mistakes map to
//! `400 Bad Request`; a generator or task failure maps to `500`.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// `amount` is not a positive JSON integer.
    #[error("Invalid amount")]
    InvalidAmount,

    /// `amount` is above the configured `MAX_ALLOWED_IDS`.
    #[error("Amount {amount} exceeds the maximum of {max} IDs per request")]
    TooManyIds { amount: usize, max: usize },

    /// The body is not valid JSON.
    #[error("Invalid JSON body: {0}")]
    MalformedBody(#[from] serde_json::Error),

    #[error("ID generation error: {0}")]
    Generator(#[from] snowdrift::Error),

    /// The blocking task building IDs panicked or was cancelled.
    #[error("ID generation task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::InvalidAmount
            | Self::TooManyIds { .. }
            | Self::MalformedBody(_)
            | Self::Generator(snowdrift::Error::InvalidAmount { .. }) => StatusCode::BAD_REQUEST,
            Self::Generator(_) | Self::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Generator(snowdrift::Error::InvalidAmount { .. }) => {
                Self::InvalidAmount.to_string()
            }
            other => other.to_string(),
        };

        if status.is_server_error() {
            tracing::error!("{message}");
        } else {
            tracing::debug!("rejected request: {message}");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}
