mod config;
mod dto;
mod error;
mod handlers;
mod middleware;
mod models;
mod repositories;
mod services;
mod utils;

use axum::{
    http::{header, Method, StatusCode},
    middleware as axum_middleware,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use sqlx::mysql::MySqlPoolOptions;
use std::time::Duration;
use tokio::sync::watch;
use tower_http::{
    cors::{Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{AppState, Config};
use crate::handlers::oauth::{
    authorize_handler, consent_handler, device_authorization_handler, device_authorize_handler,
    device_verify_handler, device_verify_page_handler, introspect_handler, jwks_handler,
    openid_configuration_handler, register_client_handler, revoke_handler, token_handler,
    userinfo_handler,
};
use crate::middleware::bearer_auth_middleware;
use crate::services::rotation::RotationScheduler;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse { status: "healthy", version: env!("CARGO_PKG_VERSION") })
}

async fn ready_handler(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<Json<HealthResponse>, StatusCode> {
    sqlx::query("SELECT 1")
        .execute(&state.pool)
        .await
        .map_err(|_| StatusCode::SERVICE_UNAVAILABLE)?;

    Ok(Json(HealthResponse { status: "ready", version: env!("CARGO_PKG_VERSION") }))
}

/// Builds the OAuth2/OpenID Connect provider's router.
///
/// ## Routes
/// - GET `/.well-known/openid-configuration` - discovery document
/// - GET `{base}/jwks` - signing key set
/// - GET `{base}/authorize`, POST `{base}/consent` - authorization + consent
/// - POST `{base}/token` - token endpoint (all grant types)
/// - GET `{base}/userinfo` - bearer-token protected
/// - POST `{base}/introspect`, POST `{base}/revoke`
/// - POST `{base}/register` - dynamic client registration
/// - POST `{base}/device_authorization`, GET `{base}/device`,
///   POST `{base}/device/verify`, POST `{base}/device/authorize`
pub fn create_router(state: AppState) -> Router {
    let base_path = state.config.base_path.clone();

    let oauth_protected_routes = Router::new()
        .route("/userinfo", get(userinfo_handler))
        .layer(axum_middleware::from_fn_with_state(state.clone(), bearer_auth_middleware));

    let oauth_public_routes = Router::new()
        .route("/jwks", get(jwks_handler))
        .route("/authorize", get(authorize_handler))
        .route("/consent", post(consent_handler))
        .route("/token", post(token_handler))
        .route("/introspect", post(introspect_handler))
        .route("/revoke", post(revoke_handler))
        .route("/register", post(register_client_handler))
        .route("/device_authorization", post(device_authorization_handler))
        .route("/device", get(device_verify_page_handler))
        .route("/device/verify", post(device_verify_handler))
        .route("/device/authorize", post(device_authorize_handler));

    let wellknown_routes = Router::new().route("/openid-configuration", get(openid_configuration_handler));

    Router::new()
        .route("/health", get(health_handler))
        .route("/ready", get(ready_handler))
        .nest(&base_path, oauth_public_routes)
        .nest(&base_path, oauth_protected_routes)
        .nest("/.well-known", wellknown_routes)
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
                .max_age(Duration::from_secs(3600)),
        )
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "oidc_provider=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = Config::from_env()?;

    let pool = MySqlPoolOptions::new()
        .max_connections(10)
        .min_connections(2)
        .acquire_timeout(Duration::from_secs(5))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .connect(&config.database_url)
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;

    let addr = config.socket_addr();

    let state = AppState::new(pool, config).await?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = RotationScheduler::new(state.clone());
    let scheduler_handle = tokio::spawn(scheduler.run(shutdown_rx));

    let app = create_router(state);

    tracing::info!("OIDC provider v{} listening on {}", env!("CARGO_PKG_VERSION"), addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    shutdown_tx.send(true).ok();
    scheduler_handle.await.ok();

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown...");
        },
    }
}
