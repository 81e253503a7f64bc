pub mod encryption;
pub mod vapid;

use async_trait::async_trait;
use reqwest::StatusCode;
use thiserror::Error;

use crate::models::{PushPayload, PushSubscriptionRecord};
use vapid::{decode_b64url, VapidSigner};

#[derive(Debug, Error)]
pub enum PushError {
    #[error("Subscription is gone (status={0})")]
    Gone(u16),
    #[error("Push service rejected the message (status={status}): {body}")]
    Rejected { status: u16, body: String },
    #[error("Failed to reach push service: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Invalid subscription key material")]
    InvalidSubscriptionKey,
    #[error("Invalid VAPID key: {0}")]
    InvalidVapidKey(String),
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
    #[error("Payload encryption failed")]
    Encryption,
    #[error("Payload does not fit in a single record")]
    PayloadTooLarge,
    #[error("Failed to sign VAPID token: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Delivers one payload to one browser subscription
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(
        &self,
        subscription: &PushSubscriptionRecord,
        payload: &PushPayload,
    ) -> Result<(), PushError>;
}

/// Web Push delivery with encrypted payloads and VAPID authorization
pub struct WebPushSender {
    client: reqwest::Client,
    vapid: VapidSigner,
    ttl: u32,
}

impl WebPushSender {
    pub fn new(client: reqwest::Client, vapid: VapidSigner, ttl: u32) -> Self {
        Self { client, vapid, ttl }
    }
}

#[async_trait]
impl PushSender for WebPushSender {
    async fn send(
        &self,
        subscription: &PushSubscriptionRecord,
        payload: &PushPayload,
    ) -> Result<(), PushError> {
        let ua_public =
            decode_b64url(&subscription.p256dh).map_err(|_| PushError::InvalidSubscriptionKey)?;
        let auth_secret =
            decode_b64url(&subscription.auth).map_err(|_| PushError::InvalidSubscriptionKey)?;

        let message = serde_json::to_vec(payload)?;
        let body = encryption::encrypt(&message, &ua_public, &auth_secret)?;
        let authorization = self
            .vapid
            .authorization(&subscription.endpoint, chrono::Utc::now().timestamp())?;

        let resp = self
            .client
            .post(&subscription.endpoint)
            .header("TTL", self.ttl.to_string())
            .header("Content-Encoding", "aes128gcm")
            .header("Content-Type", "application/octet-stream")
            .header("Authorization", authorization)
            .body(body)
            .send()
            .await?;

        match resp.status() {
            status if status.is_success() => Ok(()),
            status @ (StatusCode::NOT_FOUND | StatusCode::GONE) => {
                Err(PushError::Gone(status.as_u16()))
            }
            status => {
                let body = resp.text().await.unwrap_or_default();
                Err(PushError::Rejected {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }
}
