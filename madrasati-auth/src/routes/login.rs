use axum::extract::State;
use axum::Json;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;

use madrasati_shared::clients::db;
use madrasati_shared::errors::{AppError, AppResult, ErrorCode};
use madrasati_shared::types::ApiResponse;

use crate::models::{User, UserView};
use crate::routes::AuthResponse;
use crate::schema::users;
use crate::services::{auth_service, token_service};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

fn attempts_key(email: &str) -> String {
    format!("login_attempts:{email}")
}

pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<ApiResponse<AuthResponse>>> {
    let email = auth_service::normalize_email(&req.email);
    let key = attempts_key(&email);

    // Redis outages never lock users out.
    match state.redis.counter(&key).await {
        Ok(count) if count >= state.config.login_max_attempts => {
            tracing::warn!(email = %email, "login throttled");
            return Err(AppError::new(
                ErrorCode::LoginRateLimited,
                "too many login attempts, please try again later",
            ));
        }
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "login throttle unavailable"),
    }

    let mut conn = db::checkout(&state.db)?;

    let user: Option<User> = users::table
        .filter(users::email.eq(&email))
        .first(&mut conn)
        .optional()?;

    let user = match user {
        Some(user) if auth_service::verify_password(&req.password, &user.password_hash)? => user,
        _ => {
            if let Err(e) = state
                .redis
                .rate_limit_check(&key, state.config.login_max_attempts, state.config.login_window_secs)
                .await
            {
                tracing::warn!(error = %e, "failed to record login attempt");
            }
            return Err(AppError::new(ErrorCode::InvalidCredentials, "invalid email or password"));
        }
    };

    if let Err(e) = state.redis.del(&key).await {
        tracing::warn!(error = %e, "failed to reset login attempts");
    }

    let tokens = token_service::issue_tokens(&mut conn, &state.config, user.id, user.role())?;

    tracing::info!(user_id = user.id, role = %user.role, "user logged in");

    Ok(Json(ApiResponse::ok(AuthResponse { user: UserView::from(user), tokens })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempts_are_keyed_by_normalized_email() {
        let email = auth_service::normalize_email(" Parent@Example.LY");
        assert_eq!(attempts_key(&email), "login_attempts:parent@example.ly");
    }
}
