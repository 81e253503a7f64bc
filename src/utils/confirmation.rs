use chrono::{DateTime, Duration, Utc};
use rand::{distr::Alphanumeric, Rng};

use crate::{
    database::{RepositoryError, SeaOrmStore},
    models::{WaitlistEntry, WaitlistStatus},
};

const TOKEN_LEN: usize = 32;

pub const SUCCESS_PATH: &str = "/confirm/success";
pub const INVALID_PATH: &str = "/confirm/invalid";
pub const EXPIRED_PATH: &str = "/confirm/invalid?reason=expired";

/// Fresh single-use confirmation token
pub fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmationOutcome {
    Success,
    Invalid,
    /// Same as `Invalid`, kept apart so the page can explain what happened
    Expired,
}

impl ConfirmationOutcome {
    pub fn redirect_path(self) -> &'static str {
        match self {
            ConfirmationOutcome::Success => SUCCESS_PATH,
            ConfirmationOutcome::Invalid => INVALID_PATH,
            ConfirmationOutcome::Expired => EXPIRED_PATH,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Decision {
    Invalid,
    Expired,
    AlreadyConfirmed,
    Confirm,
}

fn decide(entry: Option<&WaitlistEntry>, now: DateTime<Utc>, expiry: Duration) -> Decision {
    let Some(entry) = entry else {
        return Decision::Invalid;
    };

    if entry
        .confirmation_sent_at
        .is_some_and(|sent_at| now > sent_at + expiry)
    {
        return Decision::Expired;
    }

    match entry.status {
        WaitlistStatus::Confirmed => Decision::AlreadyConfirmed,
        WaitlistStatus::Pending => Decision::Confirm,
    }
}

/// Checks `token` against the waitlist and confirms the matching entry.
///
/// At most one conditional write is issued. Presenting the token of an entry
/// that is already confirmed succeeds without writing.
pub async fn confirm_token(
    store: &SeaOrmStore<WaitlistEntry>,
    token: &str,
    now: DateTime<Utc>,
    expiry_hours: i64,
) -> Result<ConfirmationOutcome, RepositoryError> {
    let token = token.trim();
    if token.is_empty() {
        return Ok(ConfirmationOutcome::Invalid);
    }

    let entry = store.find_by_token(token).await?;
    match decide(entry.as_ref(), now, Duration::hours(expiry_hours)) {
        Decision::Invalid => Ok(ConfirmationOutcome::Invalid),
        Decision::Expired => Ok(ConfirmationOutcome::Expired),
        Decision::AlreadyConfirmed => Ok(ConfirmationOutcome::Success),
        Decision::Confirm => {
            let Some(entry) = entry else {
                return Ok(ConfirmationOutcome::Invalid);
            };
            if !store.confirm(&entry.email, token).await? {
                tracing::debug!("Waitlist entry was confirmed concurrently");
            }
            Ok(ConfirmationOutcome::Success)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Transaction};
    use std::sync::Arc;

    const EXPIRY_HOURS: i64 = 48;

    fn entry(status: WaitlistStatus, sent_at: DateTime<Utc>) -> WaitlistEntry {
        let pending = status == WaitlistStatus::Pending;
        WaitlistEntry {
            email: "a@example.com".to_string(),
            status,
            confirmation_token: pending.then(|| "tok".to_string()),
            confirmation_sent_at: Some(sent_at),
            consumed_token: (!pending).then(|| "tok".to_string()),
            zone: None,
            name: None,
            user_agent: None,
            ip: None,
            created_at: sent_at,
        }
    }

    fn store_with(
        entries: Vec<WaitlistEntry>,
        rows_affected: Option<u64>,
    ) -> (Arc<sea_orm::DatabaseConnection>, SeaOrmStore<WaitlistEntry>) {
        let mut db = MockDatabase::new(DatabaseBackend::Postgres).append_query_results([entries]);
        if let Some(rows_affected) = rows_affected {
            db = db.append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected,
            }]);
        }
        let db = Arc::new(db.into_connection());
        (db.clone(), SeaOrmStore::new(db))
    }

    #[test]
    fn test_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), TOKEN_LEN);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_decide() {
        let now = Utc::now();
        let expiry = Duration::hours(EXPIRY_HOURS);
        let fresh = now - Duration::hours(1);
        let stale = now - Duration::hours(EXPIRY_HOURS) - Duration::seconds(1);
        let boundary = now - Duration::hours(EXPIRY_HOURS);

        assert_eq!(decide(None, now, expiry), Decision::Invalid);
        assert_eq!(
            decide(Some(&entry(WaitlistStatus::Pending, fresh)), now, expiry),
            Decision::Confirm
        );
        assert_eq!(
            decide(Some(&entry(WaitlistStatus::Pending, boundary)), now, expiry),
            Decision::Confirm
        );
        assert_eq!(
            decide(Some(&entry(WaitlistStatus::Pending, stale)), now, expiry),
            Decision::Expired
        );
        assert_eq!(
            decide(Some(&entry(WaitlistStatus::Confirmed, fresh)), now, expiry),
            Decision::AlreadyConfirmed
        );
    }

    #[tokio::test]
    async fn test_pending_entry_is_confirmed_once() {
        let now = Utc::now();
        let (db, store) = store_with(
            vec![entry(WaitlistStatus::Pending, now - Duration::hours(2))],
            Some(1),
        );

        let outcome = confirm_token(&store, "tok", now, EXPIRY_HOURS).await.unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Success);

        drop(store);
        let log = Arc::try_unwrap(db).unwrap().into_transaction_log();
        assert_eq!(log.len(), 2);
        assert_eq!(
            log[1],
            Transaction::from_sql_and_values(
                DatabaseBackend::Postgres,
                r#"UPDATE "waitlist" SET "status" = $1, "confirmation_token" = $2, "consumed_token" = $3 WHERE "waitlist"."email" = $4 AND "waitlist"."status" = $5"#,
                [
                    "confirmed".into(),
                    Option::<String>::None.into(),
                    "tok".into(),
                    "a@example.com".into(),
                    "pending".into(),
                ]
            )
        );
    }

    #[tokio::test]
    async fn test_confirmed_entry_succeeds_without_writing() {
        let now = Utc::now();
        let (db, store) = store_with(
            vec![entry(WaitlistStatus::Confirmed, now - Duration::hours(2))],
            None,
        );

        let outcome = confirm_token(&store, "tok", now, EXPIRY_HOURS).await.unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Success);

        drop(store);
        assert_eq!(Arc::try_unwrap(db).unwrap().into_transaction_log().len(), 1);
    }

    #[tokio::test]
    async fn test_lost_race_still_succeeds() {
        let now = Utc::now();
        let (_db, store) = store_with(
            vec![entry(WaitlistStatus::Pending, now - Duration::hours(2))],
            Some(0),
        );

        let outcome = confirm_token(&store, "tok", now, EXPIRY_HOURS).await.unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Success);
    }

    #[tokio::test]
    async fn test_expired_token() {
        let now = Utc::now();
        let (_db, store) = store_with(
            vec![entry(
                WaitlistStatus::Pending,
                now - Duration::hours(EXPIRY_HOURS + 1),
            )],
            None,
        );

        let outcome = confirm_token(&store, "tok", now, EXPIRY_HOURS).await.unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Expired);
        assert_eq!(outcome.redirect_path(), "/confirm/invalid?reason=expired");
    }

    #[tokio::test]
    async fn test_unknown_token_is_invalid() {
        let (_db, store) = store_with(vec![], None);

        let outcome = confirm_token(&store, "nope", Utc::now(), EXPIRY_HOURS)
            .await
            .unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Invalid);
    }

    #[tokio::test]
    async fn test_blank_token_skips_lookup() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let store = SeaOrmStore::new(db.clone());

        let outcome = confirm_token(&store, "   ", Utc::now(), EXPIRY_HOURS)
            .await
            .unwrap();
        assert_eq!(outcome, ConfirmationOutcome::Invalid);

        drop(store);
        assert!(Arc::try_unwrap(db).unwrap().into_transaction_log().is_empty());
    }
}
