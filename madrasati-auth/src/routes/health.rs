use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use madrasati_shared::types::api::{HealthCheck, HealthResponse, HealthStatus};

use crate::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let db = match state.db.get() {
        Ok(_) => HealthCheck { name: "postgres".into(), status: HealthStatus::Healthy, message: None },
        Err(e) => HealthCheck {
            name: "postgres".into(),
            status: HealthStatus::Unhealthy,
            message: Some(e.to_string()),
        },
    };

    Json(HealthResponse::healthy("madrasati-auth", env!("CARGO_PKG_VERSION")).with_checks(vec![db]))
}
