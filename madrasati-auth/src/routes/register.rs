use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use diesel::prelude::*;
use serde::Deserialize;
use std::sync::Arc;
use validator::Validate;

use madrasati_shared::clients::db;
use madrasati_shared::errors::{AppResult, FieldErrors};
use madrasati_shared::types::auth::UserRole;
use madrasati_shared::types::ApiResponse;

use crate::models::{NewUser, User, UserView};
use crate::routes::AuthResponse;
use crate::schema::users;
use crate::services::{auth_service, token_service};
use crate::AppState;

#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[validate(email(message = "invalid email format"))]
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub city: Option<String>,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub password_confirmation: String,
    #[serde(default)]
    pub terms_accepted: bool,
}

impl RegisterRequest {
    /// Collects every field problem at once so the form can show them together.
    pub fn check(&self) -> FieldErrors {
        let mut errors = match self.validate() {
            Ok(()) => FieldErrors::new(),
            Err(e) => FieldErrors::from(e),
        };

        auth_service::check_name(&self.name, &mut errors);

        if !auth_service::is_libyan_phone(&auth_service::normalize_phone(&self.phone)) {
            errors.add("phone", "phone must be a Libyan mobile number (09xxxxxxxx or +2189xxxxxxxx)");
        }

        auth_service::check_password(&self.password, Some(&self.password_confirmation), &mut errors);

        if !self.terms_accepted {
            errors.add("terms_accepted", "you must accept the terms and conditions");
        }

        errors
    }
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<ApiResponse<AuthResponse>>)> {
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

    let new_user = NewUser {
        name: req.name.trim().to_string(),
        email,
        phone: Some(auth_service::normalize_phone(&req.phone)),
        city: req.city.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
        password_hash: auth_service::hash_password(&req.password)?,
        role: UserRole::Parent.as_str().to_string(),
    };

    let user: User = diesel::insert_into(users::table)
        .values(&new_user)
        .get_result(&mut conn)?;

    let tokens = token_service::issue_tokens(&mut conn, &state.config, user.id, UserRole::Parent)?;

    crate::events::publisher::publish_user_registered(&state.rabbitmq, &user).await;

    tracing::info!(user_id = user.id, "parent registered");

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok(AuthResponse { user: UserView::from(user), tokens })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid() -> RegisterRequest {
        RegisterRequest {
            name: "Amina Ali".into(),
            email: "amina@example.ly".into(),
            phone: "091 234 5678".into(),
            city: Some("Benghazi".into()),
            password: "password123".into(),
            password_confirmation: "password123".into(),
            terms_accepted: true,
        }
    }

    #[test]
    fn valid_request_has_no_errors() {
        assert!(valid().check().is_empty());
    }

    #[test]
    fn every_invalid_field_is_reported() {
        let req = RegisterRequest {
            name: "Al".into(),
            email: "not-an-email".into(),
            phone: "12345".into(),
            city: None,
            password: "short".into(),
            password_confirmation: "other".into(),
            terms_accepted: false,
        };
        let errors = req.check();
        for field in ["name", "email", "phone", "password", "password_confirmation", "terms_accepted"] {
            assert!(errors.contains(field), "missing error for {field}");
        }
    }

    #[test]
    fn missing_fields_deserialize_to_validation_errors() {
        let req: RegisterRequest = serde_json::from_str(r#"{"email":"a@b.ly"}"#).unwrap();
        let errors = req.check();
        assert!(errors.contains("name"));
        assert!(errors.contains("terms_accepted"));
        assert!(!errors.contains("email"));
    }
}
