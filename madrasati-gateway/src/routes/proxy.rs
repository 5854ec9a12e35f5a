use axum::body::Body;
use axum::extract::{OriginalUri, State};
use axum::http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;

use madrasati_shared::errors::{AppError, AppResult, ErrorCode};
use madrasati_shared::middleware::{decode_access_token, extract_bearer_token};
use madrasati_shared::types::auth::AuthUser;
use madrasati_shared::ApiErrorResponse;

use crate::config::{is_public, resolve_upstream, strip_prefix, Upstream};
use crate::AppState;

use super::rate_limit::check_rate_limit;

/// Headers that must not be forwarded (hop-by-hop).
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailers",
    "transfer-encoding",
    "upgrade",
    "host",
];

const REQUEST_ID: &str = "x-request-id";

fn is_hop_by_hop(name: &str) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.to_ascii_lowercase().as_str())
}

fn authenticate(headers: &HeaderMap, secret: &str) -> AppResult<AuthUser> {
    let token = extract_bearer_token(headers)?;
    let claims = decode_access_token(token, secret)?;
    if claims.is_expired() {
        return Err(AppError::new(ErrorCode::TokenExpired, "token has expired"));
    }
    Ok(AuthUser::from(claims))
}

fn bad_gateway(upstream: Upstream) -> Response {
    metrics::counter!("gateway_upstream_failures_total", "upstream" => upstream.name()).increment(1);
    (
        StatusCode::BAD_GATEWAY,
        Json(ApiErrorResponse::new(ErrorCode::ServiceUnavailable.code(), "service unavailable")),
    )
        .into_response()
}

/// Catch-all handler: resolves the service, checks the token and rate limit
/// for protected paths, then forwards the request with `/api` stripped.
pub async fn proxy_handler(
    State(state): State<Arc<AppState>>,
    OriginalUri(original_uri): OriginalUri,
    method: Method,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let path = original_uri.path();

    let (Some(upstream), Some(upstream_path)) = (resolve_upstream(path), strip_prefix(path)) else {
        return AppError::not_found("no route for this path").into_response();
    };

    if !is_public(&method, path) {
        let user = match authenticate(&headers, &state.config.jwt_secret) {
            Ok(user) => user,
            Err(e) => return e.into_response(),
        };

        if let Some(redis) = &state.redis {
            if let Err(e) = check_rate_limit(redis, &user, &state.config).await {
                return e.into_response();
            }
        }
    }

    let base = state.config.upstream_url(upstream);
    let upstream_url = match original_uri.query() {
        Some(q) => format!("{base}{upstream_path}?{q}"),
        None => format!("{base}{upstream_path}"),
    };

    let body_bytes = match axum::body::to_bytes(body, state.config.max_body_bytes).await {
        Ok(b) => b,
        Err(_) => {
            return AppError::new(ErrorCode::PayloadTooLarge, "request body too large").into_response();
        }
    };

    let request_id = headers
        .get(REQUEST_ID)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::now_v7().to_string());

    let mut upstream_req = state
        .http_client
        .request(method.clone(), &upstream_url)
        .header(REQUEST_ID, &request_id)
        .body(body_bytes);

    for (name, value) in headers.iter() {
        if is_hop_by_hop(name.as_str()) || name.as_str() == REQUEST_ID {
            continue;
        }
        upstream_req = upstream_req.header(name, value);
    }

    let upstream_resp = match upstream_req.send().await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, upstream = upstream.name(), url = %upstream_url, request_id = %request_id, "upstream request failed");
            return bad_gateway(upstream);
        }
    };

    let status = upstream_resp.status();
    tracing::debug!(%method, path, upstream = upstream.name(), status = status.as_u16(), request_id = %request_id, "proxied");

    let mut response_headers = HeaderMap::new();
    for (name, value) in upstream_resp.headers().iter() {
        if is_hop_by_hop(name.as_str()) {
            continue;
        }
        if let (Ok(hn), Ok(hv)) = (
            HeaderName::from_bytes(name.as_str().as_bytes()),
            HeaderValue::from_bytes(value.as_bytes()),
        ) {
            response_headers.append(hn, hv);
        }
    }

    let resp_body = match upstream_resp.bytes().await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(error = %e, upstream = upstream.name(), "failed to read upstream response body");
            return bad_gateway(upstream);
        }
    };

    (status, response_headers, resp_body).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hop_by_hop_headers_are_matched_case_insensitively() {
        assert!(is_hop_by_hop("Connection"));
        assert!(is_hop_by_hop("transfer-encoding"));
        assert!(is_hop_by_hop("Host"));
        assert!(!is_hop_by_hop("authorization"));
        assert!(!is_hop_by_hop("content-type"));
    }

    #[test]
    fn missing_token_is_unauthorized() {
        let err = authenticate(&HeaderMap::new(), "secret").unwrap_err();
        assert_eq!(err.error_code(), ErrorCode::Unauthorized);
    }
}
