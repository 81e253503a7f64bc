use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;
use hyper::header;
use serde::{Deserialize, Serialize};

use crate::{
    database::RepositoryError,
    models::{InsertShape, SignupDetails},
    utils::{confirmation::generate_token, mailer::OutgoingEmail, state::AppState},
    web::{
        error::ApiError,
        handlers::{client_ip, is_valid_email, normalize_email, ApiJson},
    },
};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WaitlistRequest {
    #[serde(default)]
    pub email: String,
    pub zone: Option<String>,
    pub name: Option<String>,
    #[serde(default)]
    pub no_email: bool,
}

#[derive(Debug, Serialize)]
pub struct WaitlistResponse {
    pub ok: bool,
    pub shape: InsertShape,
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn confirmation_email(to: &str, link: &str, expiry_hours: i64) -> OutgoingEmail {
    OutgoingEmail {
        to: to.to_owned(),
        subject: "Confirm your spot on the waitlist".to_string(),
        text: format!(
            "Thanks for joining the waitlist!\n\n\
             Please confirm your email address by opening this link:\n{link}\n\n\
             The link expires in {expiry_hours} hours. If you did not sign up, ignore this message."
        ),
        reply_to: None,
    }
}

/// Both insert shapes failing is reported as one upstream failure. A
/// duplicate is still logged apart from a broken store.
fn store_error(e: RepositoryError) -> ApiError {
    if matches!(e, RepositoryError::AlreadyExists(_)) {
        tracing::info!(error = ?e, "Email is already on the waitlist");
    } else {
        tracing::error!(error = ?e, "Failed to store waitlist signup");
    }
    ApiError::Upstream
}

pub async fn join_waitlist(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<WaitlistRequest>,
) -> Result<Json<WaitlistResponse>, ApiError> {
    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        return Err(ApiError::Validation(
            "Please enter a valid email address".to_string(),
        ));
    }

    let details = SignupDetails {
        zone: non_blank(payload.zone),
        name: non_blank(payload.name),
        user_agent: headers
            .get(header::USER_AGENT)
            .and_then(|v| v.to_str().ok())
            .map(str::to_owned),
        ip: client_ip(&headers),
    };

    let token = generate_token();
    let shape = state
        .waitlist_repo
        .insert_with_fallback(&email, &token, Utc::now(), &details)
        .await
        .map_err(store_error)?;
    tracing::info!(shape = ?shape, "Stored waitlist signup");

    if payload.no_email {
        return Ok(Json(WaitlistResponse { ok: true, shape }));
    }

    if shape == InsertShape::Minimal {
        tracing::warn!("Signup stored without a token, skipping confirmation email");
        return Ok(Json(WaitlistResponse { ok: true, shape }));
    }

    let link = format!("{}/confirm?token={token}", state.settings.confirmation_base_url);
    let message = confirmation_email(&email, &link, state.settings.confirmation_expiry_hours);
    if let Err(e) = state.mailer.send(message).await {
        tracing::warn!(error = ?e, "Failed to send confirmation email");
    }

    Ok(Json(WaitlistResponse { ok: true, shape }))
}
