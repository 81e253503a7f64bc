pub mod errors;

use axum::{
    body::Body,
    extract::{Request, State},
    middleware::Next,
    response::IntoResponse,
};
use errors::AuthenticationError;
use hyper::{header, HeaderMap};

use crate::utils::{
    auth_client::{AuthProviderError, AuthUser},
    state::AppState,
};

/// Token of a `Bearer` Authorization header, if any
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

/// Resolves a session token to its user, consulting the session cache first
pub async fn authenticate(state: &AppState, token: &str) -> Result<AuthUser, AuthenticationError> {
    if let Some(user) = state.cache.session_cache.get(token).await {
        return Ok(user);
    }

    match state.auth_provider.user_for_token(token).await {
        Ok(user) => {
            state
                .cache
                .session_cache
                .insert(token.to_owned(), user.clone())
                .await;
            Ok(user)
        }
        Err(AuthProviderError::InvalidSession) => Err(AuthenticationError::InvalidSession),
        Err(e) => {
            tracing::error!(error = ?e, "Failed to validate session with auth service");
            Err(AuthenticationError::InternalServer)
        }
    }
}

/// Middleware that rejects requests without a valid session and exposes the
/// caller as an [`AuthUser`] extension
pub async fn require_user(
    State(state): State<AppState>,
    mut request: Request<Body>,
    next: Next,
) -> Result<impl IntoResponse, AuthenticationError> {
    let token = bearer_token(request.headers())
        .ok_or(AuthenticationError::MissingAuthHeader)?
        .to_owned();

    let user = authenticate(&state, &token).await?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
