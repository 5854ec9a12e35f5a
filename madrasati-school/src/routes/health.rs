use axum::extract::State;
use axum::Json;
use std::sync::Arc;

use madrasati_shared::types::api::{HealthCheck, HealthResponse, HealthStatus};

use crate::AppState;

pub async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let postgres = match state.db.get() {
        Ok(_) => HealthCheck { name: "postgres".into(), status: HealthStatus::Healthy, message: None },
        Err(e) => HealthCheck {
            name: "postgres".into(),
            status: HealthStatus::Unhealthy,
            message: Some(e.to_string()),
        },
    };

    let rabbitmq = if state.rabbitmq.is_connected() {
        HealthCheck { name: "rabbitmq".into(), status: HealthStatus::Healthy, message: None }
    } else {
        HealthCheck {
            name: "rabbitmq".into(),
            status: HealthStatus::Degraded,
            message: Some("connection lost, events are not published".into()),
        }
    };

    Json(
        HealthResponse::healthy("madrasati-school", env!("CARGO_PKG_VERSION"))
            .with_checks(vec![postgres, rabbitmq]),
    )
}
