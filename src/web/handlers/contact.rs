use axum::{extract::State, http::HeaderMap, Json};
use chrono::Utc;
use serde::Deserialize;

use crate::{
    utils::{mailer::OutgoingEmail, state::AppState},
    web::{
        error::ApiError,
        handlers::{client_ip, is_valid_email, normalize_email, ApiJson, OkResponse},
    },
};

/// Limiter key shared by every client without a forwarded address
const UNKNOWN_CLIENT: &str = "unknown";

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactRequest {
    pub name: Option<String>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub message: String,
    /// Honeypot, hidden from humans
    pub company: Option<String>,
    /// Client timestamp (ms since epoch) of when the form was rendered
    pub started_at: Option<i64>,
}

pub async fn contact(
    State(state): State<AppState>,
    headers: HeaderMap,
    ApiJson(payload): ApiJson<ContactRequest>,
) -> Result<Json<OkResponse>, ApiError> {
    if payload.company.as_deref().is_some_and(|c| !c.is_empty()) {
        tracing::info!("Dropping contact submission that filled the honeypot");
        return Ok(Json(OkResponse::ok()));
    }

    let min_fill_ms = state.settings.contact_min_fill_ms;
    let filled_slowly = payload.started_at.is_some_and(|started_at| {
        Utc::now()
            .timestamp_millis()
            .checked_sub(started_at)
            .is_some_and(|elapsed| elapsed >= min_fill_ms)
    });
    if !filled_slowly {
        tracing::info!("Rejecting contact submission sent too quickly");
        return Err(ApiError::RateLimited);
    }

    let ip = client_ip(&headers).unwrap_or_else(|| UNKNOWN_CLIENT.to_string());
    match state.rate_limiter.hit(&ip).await {
        Ok(true) => {}
        Ok(false) => {
            tracing::info!(ip = %ip, "Contact rate limit exceeded");
            return Err(ApiError::RateLimited);
        }
        Err(e) => {
            tracing::error!(error = ?e, "Rate limiter unavailable, letting request through");
        }
    }

    let email = normalize_email(&payload.email);
    if !is_valid_email(&email) {
        return Err(ApiError::Validation(
            "Please enter a valid email address".to_string(),
        ));
    }

    let message = payload.message.trim();
    if message.is_empty() {
        return Err(ApiError::Validation("Message must not be empty".to_string()));
    }
    let max_len = state.settings.contact_max_message_len;
    if message.chars().count() > max_len {
        return Err(ApiError::Validation(format!(
            "Message must be at most {max_len} characters"
        )));
    }

    let name = payload
        .name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty());
    let sender = match name {
        Some(name) => format!("{name} <{email}>"),
        None => email.clone(),
    };

    let outgoing = OutgoingEmail {
        to: state.settings.contact_inbox.clone(),
        subject: format!("Contact form: {}", name.unwrap_or(&email)),
        text: format!("From: {sender}\n\n{message}"),
        reply_to: Some(email),
    };

    state.mailer.send(outgoing).await.map_err(|e| {
        tracing::error!(error = ?e, "Failed to relay contact message");
        ApiError::Upstream
    })?;

    Ok(Json(OkResponse::ok()))
}
