use axum::{
    extract::rejection::JsonRejection, http::StatusCode, response::IntoResponse, Json,
};
use serde_json::json;
use thiserror::Error;

use crate::web::auth::errors::AuthenticationError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error(transparent)]
    Auth(#[from] AuthenticationError),
    #[error("Too many requests, please try again later")]
    RateLimited,
    #[error("Something went wrong, please try again later")]
    Upstream,
}

/// Malformed bodies, wrong field types and a missing content type all count
/// as bad input
impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation(rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = match &self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(e) => e.status_code(),
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = json!({
            "ok": false,
            "error": self.to_string()
        });

        (status, Json(body)).into_response()
    }
}
