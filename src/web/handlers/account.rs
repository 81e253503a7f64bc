use axum::{extract::State, Extension, Json};

use crate::{
    utils::{auth_client::AuthUser, state::AppState},
    web::{error::ApiError, handlers::OkResponse},
};

/// Deletes the caller's auth account, then their push subscriptions.
///
/// A failed account deletion leaves the subscriptions untouched. Failing to
/// remove the subscriptions afterwards is logged and does not fail the call.
pub async fn delete_account(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<OkResponse>, ApiError> {
    state
        .auth_provider
        .delete_user(&user.id)
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, user_id = %user.id, "Failed to delete auth account");
            ApiError::Upstream
        })?;

    state.cache.forget_user(&user.id);

    match state.push_subscription_repo.delete_by_user(&user.id).await {
        Ok(removed) => {
            tracing::info!(user_id = %user.id, subscriptions = removed, "Deleted account");
        }
        Err(e) => {
            tracing::error!(
                error = ?e,
                user_id = %user.id,
                "Deleted account but failed to delete its push subscriptions"
            );
        }
    }

    Ok(Json(OkResponse::ok()))
}
