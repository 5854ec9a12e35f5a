use axum::extract::State;
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;

use madrasati_shared::clients::db;
use madrasati_shared::errors::{AppError, AppResult, ErrorCode};
use madrasati_shared::types::auth::TokenPair;
use madrasati_shared::types::ApiResponse;

use crate::models::{RefreshToken, User};
use crate::schema::{refresh_tokens, users};
use crate::services::token_service;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

pub async fn refresh_token(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<Json<ApiResponse<TokenPair>>> {
    let token_hash = token_service::hash_token(&req.refresh_token);
    let mut conn = db::checkout(&state.db)?;

    let stored: RefreshToken = refresh_tokens::table
        .filter(refresh_tokens::token_hash.eq(&token_hash))
        .first::<RefreshToken>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::TokenInvalid, "invalid refresh token"))?;

    if stored.revoked_at.is_some() {
        return Err(AppError::new(ErrorCode::RefreshTokenRevoked, "refresh token has been revoked"));
    }
    if stored.expires_at < Utc::now() {
        return Err(AppError::new(ErrorCode::TokenExpired, "refresh token expired"));
    }

    let user: User = users::table
        .find(stored.user_id)
        .first::<User>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

    // Rotation: the old token is revoked in the same transaction that mints the new one.
    let pair = conn.transaction::<_, AppError, _>(|conn| {
        let revoked = diesel::update(
            refresh_tokens::table
                .filter(refresh_tokens::id.eq(stored.id))
                .filter(refresh_tokens::revoked_at.is_null()),
        )
        .set(refresh_tokens::revoked_at.eq(Some(Utc::now())))
        .execute(conn)?;

        if revoked == 0 {
            return Err(AppError::new(ErrorCode::RefreshTokenRevoked, "refresh token has been revoked"));
        }

        token_service::issue_tokens(conn, &state.config, user.id, user.role())
    })?;

    tracing::debug!(user_id = user.id, "refresh token rotated");

    Ok(Json(ApiResponse::ok(pair)))
}
