pub mod auth_client;
pub mod cache;
pub mod confirmation;
pub mod dispatcher;
pub mod mailer;
pub mod push;
pub mod rate_limit;
pub mod state;
