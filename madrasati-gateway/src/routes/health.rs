use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use std::time::Duration;

use madrasati_shared::types::api::{HealthCheck, HealthResponse, HealthStatus};

use crate::config::Upstream;
use crate::AppState;

async fn probe(state: &AppState, upstream: Upstream) -> HealthCheck {
    let url = format!("{}/health", state.config.upstream_url(upstream));
    let name = upstream.name().to_string();
    match state.http_client.get(&url).timeout(Duration::from_secs(3)).send().await {
        Ok(resp) if resp.status().is_success() => HealthCheck { name, status: HealthStatus::Healthy, message: None },
        Ok(resp) => HealthCheck {
            name,
            status: HealthStatus::Degraded,
            message: Some(format!("status {}", resp.status())),
        },
        Err(e) => HealthCheck { name, status: HealthStatus::Unhealthy, message: Some(e.to_string()) },
    }
}

async fn redis_check(state: &AppState) -> HealthCheck {
    let name = "redis".to_string();
    match &state.redis {
        None => HealthCheck {
            name,
            status: HealthStatus::Degraded,
            message: Some("not connected, rate limiting disabled".into()),
        },
        Some(redis) => match redis.counter("health:ping").await {
            Ok(_) => HealthCheck { name, status: HealthStatus::Healthy, message: None },
            Err(e) => HealthCheck { name, status: HealthStatus::Degraded, message: Some(e.to_string()) },
        },
    }
}

/// Aggregates the health of both services and Redis.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let (auth, school, redis) = tokio::join!(
        probe(&state, Upstream::Auth),
        probe(&state, Upstream::School),
        redis_check(&state),
    );

    let response = HealthResponse::healthy("madrasati-gateway", env!("CARGO_PKG_VERSION"))
        .with_checks(vec![auth, school, redis]);

    let status = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(response)).into_response()
}

pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}
