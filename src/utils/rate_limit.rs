use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use thiserror::Error;
use tokio_cron_scheduler::{Job, JobScheduler, JobSchedulerError};

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("Rate limiter state is unavailable")]
    Poisoned,
    #[error("Cron error: {0}")]
    Cron(#[from] JobSchedulerError),
}

/// Per-key fixed-budget window counter.
///
/// Implementations count every call, accepted or not. The first hit after the
/// window has elapsed starts a new window with a count of one.
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Records a hit for `key`, returning `true` if it is within the limit
    async fn hit(&self, key: &str) -> Result<bool, RateLimitError>;
}

#[derive(Debug, Clone, Copy)]
struct Bucket {
    count: u32,
    since: Instant,
}

/// Process-local limiter. Buckets are not shared between instances.
pub struct InMemoryRateLimiter {
    buckets: Mutex<HashMap<String, Bucket>>,
    window: Duration,
    limit: u32,
}

impl InMemoryRateLimiter {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            buckets: Mutex::new(HashMap::new()),
            window,
            limit,
        }
    }

    pub fn hit_at(&self, key: &str, now: Instant) -> Result<bool, RateLimitError> {
        let mut buckets = self.buckets.lock().map_err(|_| RateLimitError::Poisoned)?;
        let bucket = buckets.entry(key.to_owned()).or_insert(Bucket {
            count: 0,
            since: now,
        });

        if bucket.count == 0 || now.duration_since(bucket.since) > self.window {
            *bucket = Bucket {
                count: 1,
                since: now,
            };
            return Ok(true);
        }

        bucket.count = bucket.count.saturating_add(1);
        Ok(bucket.count <= self.limit)
    }

    /// Drops buckets whose window has elapsed; returns how many were removed
    pub fn sweep(&self, now: Instant) -> Result<usize, RateLimitError> {
        let mut buckets = self.buckets.lock().map_err(|_| RateLimitError::Poisoned)?;
        let before = buckets.len();
        buckets.retain(|_, bucket| now.duration_since(bucket.since) <= self.window);
        Ok(before - buckets.len())
    }

    #[cfg(test)]
    fn count(&self, key: &str) -> Option<u32> {
        self.buckets.lock().unwrap().get(key).map(|b| b.count)
    }
}

#[async_trait]
impl RateLimitStore for InMemoryRateLimiter {
    async fn hit(&self, key: &str) -> Result<bool, RateLimitError> {
        self.hit_at(key, Instant::now())
    }
}

/// Limiter backed by Redis so that every instance shares one counter per key.
#[derive(Clone)]
pub struct RedisRateLimiter {
    conn: ConnectionManager,
    window_secs: u64,
    limit: u32,
    prefix: String,
}

impl RedisRateLimiter {
    pub fn new(conn: ConnectionManager, limit: u32, window_secs: u64) -> Self {
        Self {
            conn,
            window_secs,
            limit,
            prefix: "ratelimit:contact".to_string(),
        }
    }
}

#[async_trait]
impl RateLimitStore for RedisRateLimiter {
    async fn hit(&self, key: &str) -> Result<bool, RateLimitError> {
        let mut conn = self.conn.clone();
        let key = format!("{}:{key}", self.prefix);
        let (count,): (u64,) = hit_pipeline(&key, self.window_secs)
            .query_async(&mut conn)
            .await?;
        Ok(count <= u64::from(self.limit))
    }
}

/// INCR and EXPIRE in one MULTI/EXEC. `NX` only sets a TTL on a key that has
/// none, so the window opened by the first hit is never extended and a key
/// can't be left without one. Needs Redis 7.
fn hit_pipeline(key: &str, window_secs: u64) -> redis::Pipeline {
    let mut pipe = redis::pipe();
    pipe.atomic()
        .incr(key, 1)
        .cmd("EXPIRE")
        .arg(key)
        .arg(window_secs)
        .arg("NX")
        .ignore();
    pipe
}

/// Schedules a sweep of elapsed in-memory buckets every minute.
pub async fn setup_bucket_sweeper(limiter: Arc<InMemoryRateLimiter>) -> Result<(), RateLimitError> {
    let scheduler = JobScheduler::new().await?;

    scheduler
        .add(Job::new_async("0 * * * * *", move |_, _| {
            let limiter = limiter.clone();
            Box::pin(async move {
                match limiter.sweep(Instant::now()) {
                    Ok(0) => {}
                    Ok(removed) => tracing::debug!("Swept {removed} elapsed rate limit buckets"),
                    Err(e) => tracing::error!("Failed to sweep rate limit buckets: {e:?}"),
                }
            })
        })?)
        .await?;

    scheduler.start().await?;
    Ok(())
}
