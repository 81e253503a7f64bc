use axum::{response::IntoResponse, Json};
use hyper::StatusCode;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthenticationError {
    #[error("Missing or invalid Authorization header")]
    MissingAuthHeader,
    #[error("Invalid or expired session")]
    InvalidSession,
    #[error("Internal server error")]
    InternalServer,
}

impl AuthenticationError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AuthenticationError::InternalServer => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::UNAUTHORIZED,
        }
    }
}

impl IntoResponse for AuthenticationError {
    fn into_response(self) -> axum::response::Response {
        let body = json!({
            "ok": false,
            "error": self.to_string()
        });

        (self.status_code(), Json(body)).into_response()
    }
}
