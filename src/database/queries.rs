use std::{marker::PhantomData, sync::Arc};

use chrono::{DateTime, Utc};
use sea_orm::{
    sea_query::{Expr, OnConflict},
    ActiveValue::Set,
    ColumnTrait, Condition, DatabaseConnection, DbErr, EntityTrait, QueryFilter, SqlErr,
};

use crate::models::{
    push_subscriptions, waitlist, InsertShape, PushSubscriptionRecord, SignupDetails,
    WaitlistEntry, WaitlistStatus,
};

use super::error::RepositoryError;

/// Thin typed handle over the shared connection, one per entity
pub struct SeaOrmStore<T> {
    db: Arc<DatabaseConnection>,
    _entity: PhantomData<T>,
}

impl<T> Clone for SeaOrmStore<T> {
    fn clone(&self) -> Self {
        Self {
            db: Arc::clone(&self.db),
            _entity: PhantomData,
        }
    }
}

impl<T> SeaOrmStore<T> {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self {
            db,
            _entity: PhantomData,
        }
    }
}

impl SeaOrmStore<WaitlistEntry> {
    pub async fn find_one_by(&self, email: &str) -> Result<Option<WaitlistEntry>, RepositoryError> {
        Ok(waitlist::Entity::find_by_id(email.to_owned())
            .one(self.db.as_ref())
            .await?)
    }

    /// Finds the entry holding `token` either as its live confirmation token
    /// or as the token that already confirmed it.
    pub async fn find_by_token(&self, token: &str) -> Result<Option<WaitlistEntry>, RepositoryError> {
        Ok(waitlist::Entity::find()
            .filter(
                Condition::any()
                    .add(waitlist::Column::ConfirmationToken.eq(token))
                    .add(waitlist::Column::ConsumedToken.eq(token)),
            )
            .one(self.db.as_ref())
            .await?)
    }

    async fn insert_extended(
        &self,
        email: &str,
        token: &str,
        sent_at: DateTime<Utc>,
        details: &SignupDetails,
    ) -> Result<(), DbErr> {
        let entry = waitlist::ActiveModel {
            email: Set(email.to_owned()),
            status: Set(WaitlistStatus::Pending),
            confirmation_token: Set(Some(token.to_owned())),
            confirmation_sent_at: Set(Some(sent_at)),
            zone: Set(details.zone.clone()),
            name: Set(details.name.clone()),
            user_agent: Set(details.user_agent.clone()),
            ip: Set(details.ip.clone()),
            created_at: Set(sent_at),
            ..Default::default()
        };
        waitlist::Entity::insert(entry)
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }

    async fn insert_minimal(&self, email: &str) -> Result<(), DbErr> {
        let entry = waitlist::ActiveModel {
            email: Set(email.to_owned()),
            ..Default::default()
        };
        waitlist::Entity::insert(entry)
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }

    /// Stores a signup, degrading to an email-only row when the extended
    /// shape is rejected (e.g. the deployed schema lags behind).
    pub async fn insert_with_fallback(
        &self,
        email: &str,
        token: &str,
        sent_at: DateTime<Utc>,
        details: &SignupDetails,
    ) -> Result<InsertShape, RepositoryError> {
        match self.insert_extended(email, token, sent_at, details).await {
            Ok(()) => return Ok(InsertShape::Extended),
            Err(e) => {
                tracing::warn!(error = ?e, "Extended waitlist insert failed, trying minimal shape");
            }
        }

        match self.insert_minimal(email).await {
            Ok(()) => Ok(InsertShape::Minimal),
            Err(e) if is_unique_violation(&e) => {
                tracing::info!(error = ?e, duplicate = true, "Email is already on the waitlist");
                Err(RepositoryError::AlreadyExists(e.to_string()))
            }
            Err(e) => {
                tracing::error!(error = ?e, duplicate = false, "Minimal waitlist insert failed");
                Err(RepositoryError::StoreFailed(e.to_string()))
            }
        }
    }

    /// Moves a pending entry to confirmed and retires its token.
    ///
    /// Returns `false` when no pending row matched, i.e. the entry was
    /// confirmed in the meantime.
    pub async fn confirm(&self, email: &str, token: &str) -> Result<bool, RepositoryError> {
        let result = waitlist::Entity::update_many()
            .col_expr(
                waitlist::Column::Status,
                Expr::value(WaitlistStatus::Confirmed),
            )
            .col_expr(
                waitlist::Column::ConfirmationToken,
                Expr::value(Option::<String>::None),
            )
            .col_expr(waitlist::Column::ConsumedToken, Expr::value(token))
            .filter(waitlist::Column::Email.eq(email))
            .filter(waitlist::Column::Status.eq(WaitlistStatus::Pending))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected > 0)
    }

    /// Records `email` as confirmed without a token round trip.
    ///
    /// A live token of an existing row moves to `consumed_token`, so the
    /// emailed link still resolves afterwards.
    pub async fn upsert_confirmed(&self, email: &str) -> Result<(), RepositoryError> {
        let entry = waitlist::ActiveModel {
            email: Set(email.to_owned()),
            status: Set(WaitlistStatus::Confirmed),
            confirmation_token: Set(None),
            ..Default::default()
        };
        waitlist::Entity::insert(entry)
            .on_conflict(
                OnConflict::column(waitlist::Column::Email)
                    .value(
                        waitlist::Column::ConsumedToken,
                        Expr::cust(
                            r#"COALESCE("waitlist"."confirmation_token", "waitlist"."consumed_token")"#,
                        ),
                    )
                    .update_columns([
                        waitlist::Column::Status,
                        waitlist::Column::ConfirmationToken,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }
}

fn is_unique_violation(e: &DbErr) -> bool {
    matches!(e.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

impl SeaOrmStore<PushSubscriptionRecord> {
    /// Inserts the subscription or rebinds an existing endpoint to new keys and user.
    pub async fn upsert(&self, record: PushSubscriptionRecord) -> Result<(), RepositoryError> {
        let entry = push_subscriptions::ActiveModel {
            endpoint: Set(record.endpoint),
            user_id: Set(record.user_id),
            p256dh: Set(record.p256dh),
            auth: Set(record.auth),
            created_at: Set(record.created_at),
        };
        push_subscriptions::Entity::insert(entry)
            .on_conflict(
                OnConflict::column(push_subscriptions::Column::Endpoint)
                    .update_columns([
                        push_subscriptions::Column::UserId,
                        push_subscriptions::Column::P256dh,
                        push_subscriptions::Column::Auth,
                    ])
                    .to_owned(),
            )
            .exec_without_returning(self.db.as_ref())
            .await?;
        Ok(())
    }

    pub async fn find_by_user(
        &self,
        user_id: &str,
    ) -> Result<Vec<PushSubscriptionRecord>, RepositoryError> {
        Ok(push_subscriptions::Entity::find()
            .filter(push_subscriptions::Column::UserId.eq(user_id))
            .all(self.db.as_ref())
            .await?)
    }

    pub async fn delete_by_endpoint(&self, endpoint: &str) -> Result<bool, RepositoryError> {
        let result = push_subscriptions::Entity::delete_many()
            .filter(push_subscriptions::Column::Endpoint.eq(endpoint))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected > 0)
    }

    pub async fn delete_by_user(&self, user_id: &str) -> Result<u64, RepositoryError> {
        let result = push_subscriptions::Entity::delete_many()
            .filter(push_subscriptions::Column::UserId.eq(user_id))
            .exec(self.db.as_ref())
            .await?;
        Ok(result.rows_affected)
    }
}
