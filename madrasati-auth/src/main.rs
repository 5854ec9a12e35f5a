use axum::{routing::{get, post}, Router};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

mod config;
mod events;
mod models;
mod routes;
mod schema;
mod services;

use config::AppConfig;
use madrasati_shared::clients::db::{self, DbPool};
use madrasati_shared::clients::rabbitmq::RabbitMQClient;
use madrasati_shared::clients::redis::RedisClient;

pub struct AppState {
    pub db: DbPool,
    pub config: AppConfig,
    pub rabbitmq: RabbitMQClient,
    pub redis: RedisClient,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    madrasati_shared::middleware::init_tracing("madrasati-auth");

    let config = AppConfig::load()?;
    let port = config.port;

    let db = db::create_pool(&config.database_url, 10)?;
    let rabbitmq = RabbitMQClient::connect(&config.rabbitmq_url).await?;
    let redis = RedisClient::connect(&config.redis_url).await?;

    let state = Arc::new(AppState { db, config, rabbitmq, redis });

    let sub_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = events::subscriber::listen_school_admin_changes(sub_state).await {
            tracing::error!(error = %e, "school admin subscriber failed");
        }
    });

    let internal = Router::new()
        .route("/users/batch", post(routes::internal::get_users_batch))
        .route("/users/:id", get(routes::internal::get_user))
        .route(
            "/school-admins",
            get(routes::internal::list_school_admins).post(routes::internal::create_school_admin),
        )
        .route_layer(axum::middleware::from_fn(madrasati_shared::middleware::require_internal_token));

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/register", post(routes::register::register))
        .route("/login", post(routes::login::login))
        .route("/refresh", post(routes::refresh::refresh_token))
        .route("/logout", post(routes::logout::logout))
        .route("/user", get(routes::me::me))
        .nest("/internal", internal)
        .layer(axum::middleware::from_fn(madrasati_shared::middleware::metrics_middleware))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!(addr = %addr, "madrasati-auth starting");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
