//! Service-to-service user directory. The gateway never forwards `/internal`,
//! and callers must present the shared internal token.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use madrasati_shared::clients::db;
use madrasati_shared::errors::{AppError, AppResult, ErrorCode, FieldErrors};
use madrasati_shared::types::auth::UserRole;
use madrasati_shared::types::ApiResponse;

use crate::models::{NewUser, User, UserView};
use crate::schema::users;
use crate::services::auth_service;
use crate::AppState;

const MAX_BATCH: usize = 200;

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    pub ids: Vec<i64>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateSchoolAdminRequest {
    #[serde(default)]
    pub name: String,
    #[validate(email(message = "invalid email format"))]
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

impl CreateSchoolAdminRequest {
    pub fn check(&self) -> FieldErrors {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => FieldErrors::from(e),
        };
        auth_service::check_name(&self.name, &mut errors);
        auth_service::check_password(&self.password, None, &mut errors);
        errors
    }
}

pub async fn get_user(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<i64>,
) -> AppResult<Json<ApiResponse<UserView>>> {
    let mut conn = db::checkout(&state.db)?;

    let user = users::table
        .find(user_id)
        .first::<User>(&mut conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::UserNotFound, "user not found"))?;

    Ok(Json(ApiResponse::ok(UserView::from(user))))
}

pub async fn get_users_batch(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BatchRequest>,
) -> AppResult<Json<ApiResponse<Vec<UserView>>>> {
    if req.ids.len() > MAX_BATCH {
        return Err(AppError::bad_request(format!("at most {MAX_BATCH} ids per batch")));
    }
    if req.ids.is_empty() {
        return Ok(Json(ApiResponse::ok(Vec::new())));
    }

    let mut conn = db::checkout(&state.db)?;

    let found: Vec<User> = users::table
        .filter(users::id.eq_any(&req.ids))
        .load(&mut conn)?;

    Ok(Json(ApiResponse::ok(found.into_iter().map(UserView::from).collect())))
}

pub async fn list_school_admins(
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<UserView>>>> {
    let mut conn = db::checkout(&state.db)?;

    let admins: Vec<User> = users::table
        .filter(users::role.eq(UserRole::SchoolAdmin.as_str()))
        .order(users::name.asc())
        .load(&mut conn)?;

    Ok(Json(ApiResponse::ok(admins.into_iter().map(UserView::from).collect())))
}

pub async fn create_school_admin(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateSchoolAdminRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<UserView>>)> {
    let mut errors = req.check();
    let email = auth_service::normalize_email(&req.email);

    let mut conn = db::checkout(&state.db)?;

    let exists: bool = diesel::select(diesel::dsl::exists(
        users::table.filter(users::email.eq(&email)),
    ))
    .get_result(&mut conn)?;
    if exists {
        errors.add("email", "email already registered");
    }
    errors.into_result()?;

    let user: User = diesel::insert_into(users::table)
        .values(&NewUser {
            name: req.name.trim().to_string(),
            email,
            phone: None,
            city: None,
            password_hash: auth_service::hash_password(&req.password)?,
            role: UserRole::SchoolAdmin.as_str().to_string(),
        })
        .get_result(&mut conn)?;

    tracing::info!(user_id = user.id, "school admin account created");

    Ok((StatusCode::CREATED, Json(ApiResponse::ok(UserView::from(user)))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn school_admin_request_checks_every_field() {
        let req = CreateSchoolAdminRequest {
            name: "".into(),
            email: "bad".into(),
            password: "1234".into(),
        };
        let errors = req.check();
        assert!(errors.contains("name"));
        assert!(errors.contains("email"));
        assert!(errors.contains("password"));

        let ok = CreateSchoolAdminRequest {
            name: "Sunrise Admin".into(),
            email: "admin@sunrise.ly".into(),
            password: "password123".into(),
        };
        assert!(ok.check().is_empty());
    }
}
