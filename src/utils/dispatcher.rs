use std::sync::Arc;

use thiserror::Error;

use crate::{
    database::{RepositoryError, SeaOrmStore},
    models::{PushPayload, PushSubscriptionRecord},
    utils::push::{PushError, PushSender},
};

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Push(#[from] PushError),
    #[error("Failed to remove dead subscription: {0}")]
    Repository(#[from] RepositoryError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Delivered,
    /// The push service no longer knows the endpoint and its row was deleted
    Removed,
}

/// Sends notifications and prunes subscriptions the push service reports gone
#[derive(Clone)]
pub struct Dispatcher {
    sender: Arc<dyn PushSender>,
    subscriptions: SeaOrmStore<PushSubscriptionRecord>,
}

impl Dispatcher {
    pub fn new(sender: Arc<dyn PushSender>, subscriptions: SeaOrmStore<PushSubscriptionRecord>) -> Self {
        Self {
            sender,
            subscriptions,
        }
    }

    pub async fn dispatch(
        &self,
        subscription: &PushSubscriptionRecord,
        payload: &PushPayload,
    ) -> Result<DispatchOutcome, DispatchError> {
        match self.sender.send(subscription, payload).await {
            Ok(()) => Ok(DispatchOutcome::Delivered),
            Err(PushError::Gone(status)) => {
                tracing::info!(
                    endpoint = %subscription.endpoint,
                    status,
                    "Push subscription gone, removing it"
                );
                self.subscriptions
                    .delete_by_endpoint(&subscription.endpoint)
                    .await?;
                Ok(DispatchOutcome::Removed)
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::MockPushSender;
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult, Transaction};

    fn record() -> PushSubscriptionRecord {
        PushSubscriptionRecord {
            endpoint: "https://push.example.net/abc".to_string(),
            user_id: "user-1".to_string(),
            p256dh: "p256dh".to_string(),
            auth: "auth".to_string(),
            created_at: chrono::Utc::now(),
        }
    }

    fn payload() -> PushPayload {
        PushPayload {
            title: "Hi".to_string(),
            body: "There".to_string(),
            url: None,
        }
    }

    #[tokio::test]
    async fn test_gone_subscription_is_deleted() {
        let db = Arc::new(
            MockDatabase::new(DatabaseBackend::Postgres)
                .append_exec_results([MockExecResult {
                    last_insert_id: 0,
                    rows_affected: 1,
                }])
                .into_connection(),
        );
        let sender = Arc::new(MockPushSender::failing_with(|| PushError::Gone(410)));
        let dispatcher = Dispatcher::new(sender.clone(), SeaOrmStore::new(db.clone()));

        let outcome = dispatcher.dispatch(&record(), &payload()).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Removed);
        assert_eq!(sender.sent().len(), 1);

        drop(dispatcher);
        let log = Arc::try_unwrap(db).unwrap().into_transaction_log();
        assert_eq!(
            log,
            vec![Transaction::from_sql_and_values(
                DatabaseBackend::Postgres,
                r#"DELETE FROM "push_subscriptions" WHERE "push_subscriptions"."endpoint" = $1"#,
                ["https://push.example.net/abc".into()]
            )]
        );
    }

    #[tokio::test]
    async fn test_delivered_subscription_is_untouched() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let sender = Arc::new(MockPushSender::default());
        let dispatcher = Dispatcher::new(sender.clone(), SeaOrmStore::new(db.clone()));

        let outcome = dispatcher.dispatch(&record(), &payload()).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::Delivered);
        assert_eq!(sender.sent(), vec![("https://push.example.net/abc".to_string(), payload())]);

        drop(dispatcher);
        assert!(Arc::try_unwrap(db).unwrap().into_transaction_log().is_empty());
    }

    #[tokio::test]
    async fn test_other_failures_propagate_without_deleting() {
        let db = Arc::new(MockDatabase::new(DatabaseBackend::Postgres).into_connection());
        let sender = Arc::new(MockPushSender::failing_with(|| PushError::Rejected {
            status: 500,
            body: "oops".to_string(),
        }));
        let dispatcher = Dispatcher::new(sender, SeaOrmStore::new(db.clone()));

        let err = dispatcher.dispatch(&record(), &payload()).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Push(PushError::Rejected { status: 500, .. })
        ));

        drop(dispatcher);
        assert!(Arc::try_unwrap(db).unwrap().into_transaction_log().is_empty());
    }
}
