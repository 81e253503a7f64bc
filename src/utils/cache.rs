use moka::future::Cache as MokaCache;
use std::time::Duration;

use crate::utils::auth_client::AuthUser;

/// Short-lived memo of bearer tokens already validated against the auth service
#[derive(Clone)]
pub struct Cache {
    pub session_cache: MokaCache<String, AuthUser>,
}

impl Cache {
    pub fn new(ttl: u64, max_capacity: u64) -> Self {
        Self {
            session_cache: MokaCache::builder()
                .time_to_live(Duration::from_secs(ttl))
                .max_capacity(max_capacity)
                .support_invalidation_closures()
                .build(),
        }
    }

    /// Forgets every cached session that belongs to `user_id`
    pub fn forget_user(&self, user_id: &str) {
        let user_id = user_id.to_owned();
        if let Err(e) = self
            .session_cache
            .invalidate_entries_if(move |_, user| user.id == user_id)
        {
            tracing::warn!("Failed to invalidate cached sessions: {e:?}");
        }
    }
}
