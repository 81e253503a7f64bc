use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// Signup status of a waitlist entry. `Confirmed` is terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::None)")]
#[serde(rename_all = "lowercase")]
pub enum WaitlistStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "confirmed")]
    Confirmed,
}

// Waitlist entries
pub mod waitlist {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "waitlist")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false)]
        pub email: String,
        pub status: WaitlistStatus,
        pub confirmation_token: Option<String>,
        pub confirmation_sent_at: Option<DateTimeUtc>,
        /// Token that confirmed this entry, kept so replayed links resolve
        pub consumed_token: Option<String>,
        pub zone: Option<String>,
        pub name: Option<String>,
        pub user_agent: Option<String>,
        pub ip: Option<String>,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub type WaitlistEntry = waitlist::Model;

// Web Push subscriptions, one row per browser endpoint
pub mod push_subscriptions {
    use super::*;

    #[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
    #[sea_orm(table_name = "push_subscriptions")]
    pub struct Model {
        #[sea_orm(primary_key, auto_increment = false, column_type = "Text")]
        pub endpoint: String,
        #[sea_orm(indexed)]
        pub user_id: String,
        pub p256dh: String,
        pub auth: String,
        pub created_at: DateTimeUtc,
    }

    #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
    pub enum Relation {}

    impl ActiveModelBehavior for ActiveModel {}
}

pub type PushSubscriptionRecord = push_subscriptions::Model;

/// Fields captured alongside an email when someone joins the waitlist
#[derive(Clone, Debug, Default)]
pub struct SignupDetails {
    pub zone: Option<String>,
    pub name: Option<String>,
    pub user_agent: Option<String>,
    pub ip: Option<String>,
}

/// Record shape that a waitlist insert ended up using
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum InsertShape {
    Extended,
    Minimal,
}

/// Notification content delivered to a browser
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PushPayload {
    pub title: String,
    pub body: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}
