use axum::{extract::State, Extension, Json};

use crate::{
    utils::{auth_client::AuthUser, state::AppState},
    web::{
        error::ApiError,
        handlers::{normalize_email, OkResponse},
    },
};

/// Subscribes the signed-in user without a confirmation round trip; the auth
/// provider has already verified the address
pub async fn confirm_self(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<OkResponse>, ApiError> {
    let email = user
        .email
        .as_deref()
        .map(normalize_email)
        .filter(|e| !e.is_empty())
        .ok_or_else(|| ApiError::Validation("Account has no email address".to_string()))?;

    state
        .waitlist_repo
        .upsert_confirmed(&email)
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, user_id = %user.id, "Failed to confirm newsletter signup");
            ApiError::Upstream
        })?;

    Ok(Json(OkResponse::ok()))
}
