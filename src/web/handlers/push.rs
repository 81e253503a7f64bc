use axum::{extract::State, http::HeaderMap, Extension, Json};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::{
    models::{PushPayload, PushSubscriptionRecord},
    utils::{auth_client::AuthUser, dispatcher::DispatchOutcome, state::AppState},
    web::{
        auth::{authenticate, bearer_token, errors::AuthenticationError},
        error::ApiError,
        handlers::{ApiJson, OkResponse},
    },
};

#[derive(Debug, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// `PushSubscription.toJSON()` as produced by the browser
#[derive(Debug, Deserialize)]
pub struct BrowserSubscription {
    pub endpoint: String,
    pub keys: SubscriptionKeys,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub subscription: Option<BrowserSubscription>,
    pub token: Option<String>,
}

fn validate_subscription(subscription: &BrowserSubscription) -> Result<(), ApiError> {
    let endpoint_ok = reqwest::Url::parse(&subscription.endpoint)
        .is_ok_and(|url| url.scheme() == "https" && url.host_str().is_some());
    if !endpoint_ok {
        return Err(ApiError::Validation(
            "Subscription endpoint must be an https URL".to_string(),
        ));
    }
    if subscription.keys.p256dh.trim().is_empty() || subscription.keys.auth.trim().is_empty() {
        return Err(ApiError::Validation(
            "Subscription keys are missing".to_string(),
        ));
    }
    Ok(())
}

/// Stores the browser subscription for the caller identified by the body
/// token or, failing that, the bearer header
pub async fn subscribe(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<SubscribeRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    let token = payload
        .token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .or_else(|| bearer_token(&headers))
        .ok_or(AuthenticationError::MissingAuthHeader)?;
    let user = authenticate(&state, token).await?;

    let subscription = payload
        .subscription
        .ok_or_else(|| ApiError::Validation("Missing subscription".to_string()))?;
    validate_subscription(&subscription)?;

    let record = PushSubscriptionRecord {
        endpoint: subscription.endpoint,
        user_id: user.id,
        p256dh: subscription.keys.p256dh.trim().to_owned(),
        auth: subscription.keys.auth.trim().to_owned(),
        created_at: Utc::now(),
    };

    state
        .push_subscription_repo
        .upsert(record)
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, "Failed to store push subscription");
            ApiError::Upstream
        })?;

    Ok(Json(OkResponse::ok()))
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct NotifyResponse {
    pub ok: bool,
    pub sent: usize,
    pub removed: usize,
    pub failed: usize,
}

/// Pushes `payload` to every subscription of the caller
pub async fn notify(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(payload): ApiJson<PushPayload>,
) -> Result<Json<NotifyResponse>, ApiError> {
    if payload.title.trim().is_empty() {
        return Err(ApiError::Validation("Title must not be empty".to_string()));
    }

    let subscriptions = state
        .push_subscription_repo
        .find_by_user(&user.id)
        .await
        .map_err(|e| {
            tracing::error!(error = ?e, user_id = %user.id, "Failed to load push subscriptions");
            ApiError::Upstream
        })?;

    let mut response = NotifyResponse {
        ok: true,
        ..Default::default()
    };
    for subscription in &subscriptions {
        match state.dispatcher.dispatch(subscription, &payload).await {
            Ok(DispatchOutcome::Delivered) => response.sent += 1,
            Ok(DispatchOutcome::Removed) => response.removed += 1,
            Err(e) => {
                tracing::warn!(error = ?e, endpoint = %subscription.endpoint, "Push delivery failed");
                response.failed += 1;
            }
        }
    }

    tracing::info!(
        user_id = %user.id,
        sent = response.sent,
        removed = response.removed,
        failed = response.failed,
        "Dispatched push notification"
    );
    Ok(Json(response))
}
