use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use interviz_core::config::ErrorStatusMode;
use interviz_core::error::InterVizError;

use crate::dto::MessageResponse;

/// Unified API error type
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

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: message.into(),
        }
    }

    pub fn gateway_timeout(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::GATEWAY_TIMEOUT,
            message: message.into(),
        }
    }

    /// Map a domain error to a response under the configured status mode.
    ///
    /// In compat mode every error is answered with 200 and only the body
    /// tells it apart from a result.
    pub fn from_domain(err: InterVizError, mode: ErrorStatusMode) -> Self {
        let error = if err.is_client_error() {
            Self::bad_request(err.to_string())
        } else if err.is_timeout() {
            Self::gateway_timeout(err.to_string())
        } else {
            Self::internal(err.to_string())
        };

        match mode {
            ErrorStatusMode::Http => error,
            ErrorStatusMode::Compat => Self {
                status: StatusCode::OK,
                ..error
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(MessageResponse::error(self.message))).into_response()
    }
}
