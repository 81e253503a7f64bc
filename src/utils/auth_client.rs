use async_trait::async_trait;
use reqwest::StatusCode;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthProviderError {
    #[error("Invalid or expired session")]
    InvalidSession,
    #[error("Failed to reach auth service: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Auth service error (status={status}): {body}")]
    Upstream { status: u16, body: String },
}

/// User as reported by the external auth service
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Operations this service needs from the hosted auth provider
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolves a session access token to its user
    async fn user_for_token(&self, token: &str) -> Result<AuthUser, AuthProviderError>;
    /// Deletes a user with admin privileges
    async fn delete_user(&self, user_id: &str) -> Result<(), AuthProviderError>;
}

/// Client for a GoTrue-style auth API (`/auth/v1/...`)
pub struct HostedAuth {
    client: reqwest::Client,
    base_url: String,
    anon_key: SecretString,
    service_role_key: SecretString,
}

impl HostedAuth {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        anon_key: SecretString,
        service_role_key: SecretString,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key,
            service_role_key,
        }
    }
}

async fn upstream_error(resp: reqwest::Response) -> AuthProviderError {
    let status = resp.status().as_u16();
    let body = resp.text().await.unwrap_or_default();
    AuthProviderError::Upstream { status, body }
}

#[async_trait]
impl AuthProvider for HostedAuth {
    async fn user_for_token(&self, token: &str) -> Result<AuthUser, AuthProviderError> {
        let resp = self
            .client
            .get(format!("{}/auth/v1/user", self.base_url))
            .header("apikey", self.anon_key.expose_secret())
            .bearer_auth(token)
            .send()
            .await?;

        match resp.status() {
            status if status.is_success() => Ok(resp.json::<AuthUser>().await?),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(AuthProviderError::InvalidSession)
            }
            _ => Err(upstream_error(resp).await),
        }
    }

    async fn delete_user(&self, user_id: &str) -> Result<(), AuthProviderError> {
        let key = self.service_role_key.expose_secret();
        let resp = self
            .client
            .delete(format!("{}/auth/v1/admin/users/{user_id}", self.base_url))
            .header("apikey", key)
            .bearer_auth(key)
            .send()
            .await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(upstream_error(resp).await)
        }
    }
}
