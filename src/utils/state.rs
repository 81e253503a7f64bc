use std::{sync::Arc, time::Duration};

use color_eyre::eyre::{Context, Result};
use sea_orm::{Database, DatabaseConnection};
use sea_orm_migration::MigratorTrait;
use secrecy::ExposeSecret;

use crate::{
    config::{Config, RateLimitBackend},
    database::{Migrator, SeaOrmStore},
    models::{PushSubscriptionRecord, WaitlistEntry},
    utils::{
        auth_client::{AuthProvider, HostedAuth},
        cache::Cache,
        dispatcher::Dispatcher,
        mailer::{HttpMailer, Mailer},
        push::{vapid::VapidSigner, WebPushSender},
        rate_limit::{setup_bucket_sweeper, InMemoryRateLimiter, RateLimitStore, RedisRateLimiter},
    },
};

/// Request-independent values the handlers read
#[derive(Debug, Clone)]
pub struct Settings {
    pub confirmation_base_url: String,
    pub confirmation_expiry_hours: i64,
    pub contact_inbox: String,
    pub contact_min_fill_ms: i64,
    pub contact_max_message_len: usize,
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            confirmation_base_url: config
                .confirmation
                .base_url
                .trim_end_matches('/')
                .to_string(),
            confirmation_expiry_hours: config.confirmation.expiry_hours,
            contact_inbox: config.contact.inbox.clone(),
            contact_min_fill_ms: config.contact.min_fill_ms,
            contact_max_message_len: config.contact.max_message_len,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub waitlist_repo: SeaOrmStore<WaitlistEntry>,
    pub push_subscription_repo: SeaOrmStore<PushSubscriptionRecord>,
    pub mailer: Arc<dyn Mailer>,
    pub auth_provider: Arc<dyn AuthProvider>,
    pub dispatcher: Dispatcher,
    pub rate_limiter: Arc<dyn RateLimitStore>,
    pub cache: Cache,
    pub settings: Arc<Settings>,
}

/// Connects to every backing service and builds the shared state.
///
/// Misconfigured push keys or an unreachable database abort startup.
pub async fn setup(config: &Config) -> Result<AppState> {
    let db: DatabaseConnection = Database::connect(config.database.url.expose_secret())
        .await
        .wrap_err("Failed to connect to database")?;

    Migrator::up(&db, None)
        .await
        .wrap_err("Failed to apply migrations")?;

    let http = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .wrap_err("Failed to build HTTP client")?;

    let vapid = VapidSigner::new(
        config.push.vapid_private_key.expose_secret(),
        &config.push.vapid_public_key,
        &config.push.subject,
    )
    .wrap_err("Invalid VAPID configuration")?;

    let rate_limiter: Arc<dyn RateLimitStore> = match config.rate_limit.backend {
        RateLimitBackend::Memory => {
            let limiter = Arc::new(InMemoryRateLimiter::new(
                config.rate_limit.max_requests,
                Duration::from_secs(config.rate_limit.window_secs),
            ));
            setup_bucket_sweeper(limiter.clone())
                .await
                .wrap_err("Failed to schedule rate limit sweeper")?;
            limiter
        }
        RateLimitBackend::Redis => {
            let conn = config
                .redis
                .start()
                .await
                .wrap_err("Failed to connect to Redis")?;
            Arc::new(RedisRateLimiter::new(
                conn,
                config.rate_limit.max_requests,
                config.rate_limit.window_secs,
            ))
        }
    };
    tracing::info!("Using {:?} rate limit backend", config.rate_limit.backend);

    let db = Arc::new(db);
    let push_subscription_repo = SeaOrmStore::new(Arc::clone(&db));

    Ok(AppState {
        waitlist_repo: SeaOrmStore::new(Arc::clone(&db)),
        push_subscription_repo: push_subscription_repo.clone(),
        mailer: Arc::new(HttpMailer::new(
            http.clone(),
            config.mail.api_url.clone(),
            config.mail.api_key.clone(),
            config.mail.from.clone(),
        )),
        auth_provider: Arc::new(HostedAuth::new(
            http.clone(),
            &config.auth.url,
            config.auth.anon_key.clone(),
            config.auth.service_role_key.clone(),
        )),
        dispatcher: Dispatcher::new(
            Arc::new(WebPushSender::new(http, vapid, config.push.ttl)),
            push_subscription_repo,
        ),
        rate_limiter,
        cache: Cache::new(config.cache.ttl, config.cache.max_capacity),
        settings: Arc::new(Settings::from(config)),
    })
}
