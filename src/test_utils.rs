use crate::{
    database::SeaOrmStore,
    models::{PushPayload, PushSubscriptionRecord},
    utils::{
        auth_client::{AuthProvider, AuthProviderError, AuthUser},
        cache::Cache,
        dispatcher::Dispatcher,
        mailer::{MailError, Mailer, OutgoingEmail},
        push::{PushError, PushSender},
        rate_limit::InMemoryRateLimiter,
        state::{AppState, Settings},
    },
};
use async_trait::async_trait;
use sea_orm::{DbBackend, MockDatabase};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

pub const TEST_TOKEN: &str = "session-token";

#[derive(Default)]
pub struct MockMailer {
    pub sent: Mutex<Vec<OutgoingEmail>>,
    pub fail: bool,
}

impl MockMailer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<OutgoingEmail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Mailer for MockMailer {
    async fn send(&self, email: OutgoingEmail) -> Result<(), MailError> {
        self.sent.lock().unwrap().push(email);
        if self.fail {
            return Err(MailError::Rejected {
                status: 500,
                body: "mail api down".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MockAuthProvider {
    pub users: HashMap<String, AuthUser>,
    pub deleted: Mutex<Vec<String>>,
    pub lookups: Mutex<usize>,
    pub fail_delete: bool,
}

impl MockAuthProvider {
    pub fn with_user(token: &str, id: &str, email: Option<&str>) -> Self {
        Self {
            users: HashMap::from([(
                token.to_string(),
                AuthUser {
                    id: id.to_string(),
                    email: email.map(str::to_string),
                },
            )]),
            ..Default::default()
        }
    }

    pub fn deleted(&self) -> Vec<String> {
        self.deleted.lock().unwrap().clone()
    }

    pub fn lookups(&self) -> usize {
        *self.lookups.lock().unwrap()
    }
}

#[async_trait]
impl AuthProvider for MockAuthProvider {
    async fn user_for_token(&self, token: &str) -> Result<AuthUser, AuthProviderError> {
        *self.lookups.lock().unwrap() += 1;
        self.users
            .get(token)
            .cloned()
            .ok_or(AuthProviderError::InvalidSession)
    }

    async fn delete_user(&self, user_id: &str) -> Result<(), AuthProviderError> {
        if self.fail_delete {
            return Err(AuthProviderError::Upstream {
                status: 500,
                body: "boom".to_string(),
            });
        }
        self.deleted.lock().unwrap().push(user_id.to_string());
        Ok(())
    }
}

/// Records every delivery attempt; optionally fails them
#[derive(Default)]
pub struct MockPushSender {
    sent: Mutex<Vec<(String, PushPayload)>>,
    failure: Option<fn() -> PushError>,
    failing_endpoints: HashMap<String, fn() -> PushError>,
}

impl MockPushSender {
    pub fn failing_with(failure: fn() -> PushError) -> Self {
        Self {
            failure: Some(failure),
            ..Default::default()
        }
    }

    pub fn failing_for(endpoint: &str, failure: fn() -> PushError) -> Self {
        Self {
            failing_endpoints: HashMap::from([(endpoint.to_string(), failure)]),
            ..Default::default()
        }
    }

    pub fn sent(&self) -> Vec<(String, PushPayload)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl PushSender for MockPushSender {
    async fn send(
        &self,
        subscription: &PushSubscriptionRecord,
        payload: &PushPayload,
    ) -> Result<(), PushError> {
        self.sent
            .lock()
            .unwrap()
            .push((subscription.endpoint.clone(), payload.clone()));
        if let Some(failure) = self.failing_endpoints.get(&subscription.endpoint) {
            return Err(failure());
        }
        match self.failure {
            Some(failure) => Err(failure()),
            None => Ok(()),
        }
    }
}

/// Collaborators handed to [`test_app_state_with`]
#[derive(Default)]
pub struct TestDeps {
    pub mailer: Arc<MockMailer>,
    pub auth: Arc<MockAuthProvider>,
    pub push: Arc<MockPushSender>,
    pub rate_limiter: Option<Arc<InMemoryRateLimiter>>,
}

pub fn test_settings() -> Settings {
    Settings {
        confirmation_base_url: "https://example.com".to_string(),
        confirmation_expiry_hours: 48,
        contact_inbox: "hello@example.com".to_string(),
        contact_min_fill_ms: 2000,
        contact_max_message_len: 5000,
    }
}

pub async fn test_app_state(db_conn: Option<Arc<sea_orm::DatabaseConnection>>) -> AppState {
    test_app_state_with(db_conn, TestDeps::default()).await
}

pub async fn test_app_state_with(
    db_conn: Option<Arc<sea_orm::DatabaseConnection>>,
    deps: TestDeps,
) -> AppState {
    let db = db_conn
        .unwrap_or_else(|| Arc::new(MockDatabase::new(DbBackend::Postgres).into_connection()));

    let push_subscription_repo = SeaOrmStore::new(db.clone());
    let rate_limiter = deps
        .rate_limiter
        .unwrap_or_else(|| Arc::new(InMemoryRateLimiter::new(6, Duration::from_secs(60))));

    AppState {
        waitlist_repo: SeaOrmStore::new(db),
        push_subscription_repo: push_subscription_repo.clone(),
        mailer: deps.mailer,
        auth_provider: deps.auth,
        dispatcher: Dispatcher::new(deps.push, push_subscription_repo),
        rate_limiter,
        cache: Cache::new(60, 100),
        settings: Arc::new(test_settings()),
    }
}
