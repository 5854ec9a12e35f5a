pub mod config;
pub mod routes;

use axum::http::{header, HeaderValue, Method};
use axum::routing::get;
use axum::{middleware, Router};
use std::sync::Arc;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use madrasati_shared::clients::redis::RedisClient;
use madrasati_shared::middleware::metrics_middleware;

use routes::{health, proxy};

pub struct AppState {
    pub config: config::AppConfig,
    pub http_client: reqwest::Client,
    /// Rate limiting is skipped while Redis is unavailable.
    pub redis: Option<RedisClient>,
    pub metrics_handle: metrics_exporter_prometheus::PrometheusHandle,
}

fn cors(config: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .allowed_origins()
        .iter()
        .filter_map(|o| match o.parse() {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!(origin = %o, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(AllowMethods::list([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ]))
        .allow_headers(AllowHeaders::list([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            header::ACCEPT,
        ]))
        .allow_credentials(true)
}

pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors(&state.config);
    Router::new()
        .route("/health", get(health::health_check))
        .route("/metrics", get(health::metrics))
        .fallback(proxy::proxy_handler)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use madrasati_shared::types::auth::{Claims, UserRole};
    use metrics_exporter_prometheus::PrometheusBuilder;
    use tower::ServiceExt;

    const SECRET: &str = "gateway-test-secret";

    fn app() -> Router {
        let config = config::AppConfig {
            jwt_secret: SECRET.into(),
            // Nothing listens on port 1.
            auth_url: "http://127.0.0.1:1".into(),
            school_url: "http://127.0.0.1:1".into(),
            ..Default::default()
        };
        router(Arc::new(AppState {
            config,
            http_client: reqwest::Client::new(),
            redis: None,
            metrics_handle: PrometheusBuilder::new().build_recorder().handle(),
        }))
    }

    fn token(role: UserRole) -> String {
        let claims = Claims::new(7, role, 3600);
        encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
    }

    async fn send(request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null))
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    #[tokio::test]
    async fn internal_endpoints_are_not_forwarded() {
        let request = Request::get("/api/internal/users/1")
            .header("Authorization", format!("Bearer {}", token(UserRole::SuperAdmin)))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "E0003");
    }

    #[tokio::test]
    async fn dot_segments_cannot_reach_internal_endpoints() {
        for (method, uri) in [
            ("POST", "/api/login/../internal/school-admins"),
            ("GET", "/api/login/%2e%2e/internal/users/1"),
            ("GET", "/api/schools/../admin/stats"),
        ] {
            let request = Request::builder()
                .method(method)
                .uri(uri)
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"name":"x","email":"x@example.ly","password":"password1"}"#))
                .unwrap();
            let (status, body) = send(request).await;
            // A forwarded request would surface as 502 from the dead upstream.
            assert_eq!(status, StatusCode::NOT_FOUND, "{uri}");
            assert_eq!(body["error"]["code"], "E0003", "{uri}");
        }
    }

    #[tokio::test]
    async fn protected_paths_need_a_token() {
        let (status, body) = send(get("/api/my-reviews")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "E0004");
    }

    #[tokio::test]
    async fn forged_token_is_rejected() {
        let claims = Claims::new(7, UserRole::SuperAdmin, 3600);
        let forged = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"other")).unwrap();
        let request = Request::get("/api/admin/moderation")
            .header("Authorization", format!("Bearer {forged}"))
            .body(Body::empty())
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["error"]["code"], "E1004");
    }

    #[tokio::test]
    async fn unreachable_upstream_is_a_bad_gateway() {
        let (status, body) = send(get("/api/schools?search=sunrise")).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"]["code"], "E0007");
    }

    #[tokio::test]
    async fn authenticated_requests_reach_the_upstream() {
        let request = Request::post("/api/reviews/3/report")
            .header("Authorization", format!("Bearer {}", token(UserRole::Parent)))
            .header("Content-Type", "application/json")
            .body(Body::from(r#"{"report_reason":"not a parent"}"#))
            .unwrap();
        let (status, body) = send(request).await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"]["code"], "E0007");
    }

    #[tokio::test]
    async fn health_reports_unreachable_services() {
        let (status, body) = send(get("/health")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["service"], "madrasati-gateway");
        assert_eq!(body["status"], "unhealthy");
    }
}
