use axum::{
    http::HeaderValue,
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use color_eyre::eyre::Context;
use hyper::Method;
use tokio::net::TcpListener;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    config::Config,
    utils::state::AppState,
    web::{
        auth::require_user,
        handlers::{
            confirm, confirm_self, contact, delete_account, join_waitlist, notify, subscribe,
        },
    },
};

async fn health_check() -> impl IntoResponse {
    "OK"
}

pub struct HttpServer {
    listener: TcpListener,
    router: Router,
}

impl HttpServer {
    pub async fn new(config: &Config, state: AppState) -> color_eyre::Result<Self> {
        let cors = cors_layer(&config.server.cors_origins)?;

        let router = Router::new()
            .route("/health", get(health_check))
            .merge(api_routes(state.clone()))
            .layer(TraceLayer::new_for_http())
            .layer(CatchPanicLayer::new())
            .layer(cors)
            .with_state(state);

        let listener = TcpListener::bind(format!("{}:{}", config.server.host, config.server.port))
            .await
            .wrap_err_with(|| format!("Failed to bind to port {}", config.server.port))?;

        Ok(Self { router, listener })
    }

    pub async fn run(self) -> color_eyre::Result<()> {
        tracing::info!("listening on {}", self.listener.local_addr()?);
        axum::serve(self.listener, self.router)
            .await
            .wrap_err("Failed to start HTTP server")?;
        Ok(())
    }
}

fn cors_layer(origins: &[String]) -> color_eyre::Result<CorsLayer> {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    if origins.is_empty() {
        return Ok(layer.allow_origin(Any));
    }

    let origins = origins
        .iter()
        .map(|origin| {
            HeaderValue::from_str(origin)
                .wrap_err_with(|| format!("Invalid CORS origin: {origin}"))
        })
        .collect::<color_eyre::Result<Vec<_>>>()?;
    Ok(layer.allow_origin(AllowOrigin::list(origins)))
}

/// Every endpoint except the health check
pub fn api_routes(state: AppState) -> Router<AppState> {
    let protected_routes = Router::new()
        .route("/newsletter/confirm-self", post(confirm_self))
        .route("/push/notify", post(notify))
        .route("/account/delete", post(delete_account))
        .route_layer(from_fn_with_state(state, require_user));

    Router::new()
        .merge(protected_routes)
        .route("/confirm", get(confirm))
        .route("/contact", post(contact))
        .route("/waitlist", post(join_waitlist))
        .route("/push/subscribe", post(subscribe))
}
