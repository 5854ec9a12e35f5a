use axum::body::Body;
use axum::http::Request;
use axum::middleware::Next;
use axum::response::Response;

use crate::errors::AppError;

/// Header carrying the service-to-service token.
pub const INTERNAL_TOKEN_HEADER: &str = "x-internal-token";

const DEV_INTERNAL_TOKEN: &str = "development-internal-token-change-in-production";

/// Token shared by the services that call each other's `/internal` routes.
pub fn internal_token() -> String {
    std::env::var("INTERNAL_TOKEN").unwrap_or_else(|_| DEV_INTERNAL_TOKEN.to_string())
}

/// Route layer for `/internal` routers: callers must present the shared token.
pub async fn require_internal_token(req: Request<Body>, next: Next) -> Result<Response, AppError> {
    let presented = req
        .headers()
        .get(INTERNAL_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());

    if presented != Some(internal_token().as_str()) {
        tracing::warn!(path = %req.uri().path(), "internal call without a valid token");
        return Err(AppError::unauthorized("internal endpoint"));
    }

    Ok(next.run(req).await)
}
