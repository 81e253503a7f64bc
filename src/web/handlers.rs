pub mod account;
pub mod confirm;
pub mod contact;
pub mod newsletter;
pub mod push;
pub mod waitlist;

use std::sync::LazyLock;

use axum::extract::FromRequest;
use hyper::HeaderMap;
use regex::Regex;
use serde::Serialize;

use crate::web::error::ApiError;

pub use account::delete_account;
pub use confirm::confirm;
pub use contact::contact;
pub use newsletter::confirm_self;
pub use push::{notify, subscribe};
pub use waitlist::join_waitlist;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\S+@\S+\.\S+$").unwrap());

/// `axum::Json` whose rejections render as `{ ok: false, error }`
#[derive(Debug, FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[derive(Debug, Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

impl OkResponse {
    pub fn ok() -> Self {
        Self { ok: true }
    }
}

/// Trims and lowercases an address
pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    EMAIL_RE.is_match(email)
}

/// First hop of `X-Forwarded-For`
pub(crate) fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_owned)
}
