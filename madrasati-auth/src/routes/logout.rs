use axum::extract::State;
use axum::Json;
use chrono::Utc;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;

use madrasati_shared::clients::db;
use madrasati_shared::errors::AppResult;
use madrasati_shared::types::ApiResponse;

use crate::schema::refresh_tokens;
use crate::services::token_service;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LogoutRequest {
    pub refresh_token: Option<String>,
}

/// Revokes the given refresh token. Logging out twice is not an error.
pub async fn logout(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LogoutRequest>,
) -> AppResult<Json<ApiResponse<&'static str>>> {
    if let Some(token) = req.refresh_token.as_deref().filter(|t| !t.is_empty()) {
        let token_hash = token_service::hash_token(token);
        let mut conn = db::checkout(&state.db)?;

        diesel::update(
            refresh_tokens::table
                .filter(refresh_tokens::token_hash.eq(&token_hash))
                .filter(refresh_tokens::revoked_at.is_null()),
        )
        .set(refresh_tokens::revoked_at.eq(Some(Utc::now())))
        .execute(&mut conn)?;
    }

    Ok(Json(ApiResponse::ok("logged out")))
}
