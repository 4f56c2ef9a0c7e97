//! HTTP error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

use drivegate_common::Error;

/// Handler error rendered as `{ "error": message }`.
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(Error::Validation(message.into()))
    }

    pub fn status(&self) -> StatusCode {
        match &self.0 {
            Error::Validation(_) => StatusCode::BAD_REQUEST,
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }

        (status, Json(json!({ "error": self.0.detail() }))).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
