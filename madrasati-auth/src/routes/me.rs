use axum::extract::State;
use axum::Json;
use diesel::prelude::*;
use std::sync::Arc;

use madrasati_shared::clients::db;
use madrasati_shared::errors::{AppError, AppResult, ErrorCode};
use madrasati_shared::types::auth::AuthUser;
use madrasati_shared::types::ApiResponse;

use crate::models::{User, UserView};
use crate::schema::users;
use crate::AppState;

pub async fn me(
    user: AuthUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<UserView>>> {
    let mut conn = db::checkout(&state.db)?;

    let record = users::table
        .find(user.id)
        .first::<User>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

    Ok(Json(ApiResponse::ok(UserView::from(record))))
}
