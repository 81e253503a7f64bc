use axum::{
    extract::{Query, State},
    response::Redirect,
};
use chrono::Utc;
use serde::Deserialize;

use crate::utils::{
    confirmation::{confirm_token, ConfirmationOutcome},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct ConfirmQuery {
    pub token: Option<String>,
}

/// Email link target; always answers with a redirect to a result page
pub async fn confirm(State(state): State<AppState>, Query(query): Query<ConfirmQuery>) -> Redirect {
    let token = query.token.unwrap_or_default();

    let outcome = match confirm_token(
        &state.waitlist_repo,
        &token,
        Utc::now(),
        state.settings.confirmation_expiry_hours,
    )
    .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            tracing::error!(error = ?e, "Failed to check confirmation token");
            ConfirmationOutcome::Invalid
        }
    };

    tracing::info!(outcome = ?outcome, "Processed waitlist confirmation");
    Redirect::to(outcome.redirect_path())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{WaitlistEntry, WaitlistStatus},
        startup::api_routes,
        test_utils::test_app_state,
    };
    use axum::{
        body::Body,
        http::{header, Request, StatusCode},
    };
    use chrono::Duration;
    use sea_orm::{DatabaseBackend, DbErr, MockDatabase, MockExecResult};
    use std::sync::Arc;
    use tower::ServiceExt;

    fn pending(sent_hours_ago: i64) -> WaitlistEntry {
        let sent_at = Utc::now() - Duration::hours(sent_hours_ago);
        WaitlistEntry {
            email: "a@example.com".to_string(),
            status: WaitlistStatus::Pending,
            confirmation_token: Some("tok".to_string()),
            confirmation_sent_at: Some(sent_at),
            consumed_token: None,
            zone: None,
            name: None,
            user_agent: None,
            ip: None,
            created_at: sent_at,
        }
    }

    async fn location_for(db: MockDatabase, uri: &str) -> String {
        let state = test_app_state(Some(Arc::new(db.into_connection()))).await;
        let app = api_routes(state.clone()).with_state(state);

        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        response.headers()[header::LOCATION]
            .to_str()
            .unwrap()
            .to_string()
    }

    #[tokio::test]
    async fn test_valid_token_redirects_to_success() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![pending(1)]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }]);

        assert_eq!(location_for(db, "/confirm?token=tok").await, "/confirm/success");
    }

    #[tokio::test]
    async fn test_link_still_works_after_self_confirm() {
        let self_confirmed = WaitlistEntry {
            status: WaitlistStatus::Confirmed,
            confirmation_token: None,
            consumed_token: Some("tok".to_string()),
            ..pending(1)
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![self_confirmed]]);

        assert_eq!(location_for(db, "/confirm?token=tok").await, "/confirm/success");
    }

    #[tokio::test]
    async fn test_expired_token_redirects_with_reason() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![pending(49)]]);

        assert_eq!(
            location_for(db, "/confirm?token=tok").await,
            "/confirm/invalid?reason=expired"
        );
    }

    #[tokio::test]
    async fn test_unknown_and_missing_tokens_are_invalid() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<WaitlistEntry>::new()]);
        assert_eq!(location_for(db, "/confirm?token=nope").await, "/confirm/invalid");

        let db = MockDatabase::new(DatabaseBackend::Postgres);
        assert_eq!(location_for(db, "/confirm").await, "/confirm/invalid");
    }

    #[tokio::test]
    async fn test_store_failure_redirects_to_invalid() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_errors([DbErr::Custom("connection reset".into())]);

        assert_eq!(location_for(db, "/confirm?token=tok").await, "/confirm/invalid");
    }
}
