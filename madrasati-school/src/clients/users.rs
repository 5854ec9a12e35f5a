//! Client for the auth service's internal user directory.

use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use madrasati_shared::errors::{AppError, AppResult, ErrorCode};
use madrasati_shared::middleware::{internal_token, INTERNAL_TOKEN_HEADER};
use madrasati_shared::types::auth::UserRole;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AdminSchoolRef {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectoryUser {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub role: UserRole,
    #[serde(default)]
    pub admin_school: Option<AdminSchoolRef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewSchoolAdmin {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
    details: Option<serde_json::Value>,
}

#[derive(Clone)]
pub struct UserDirectory {
    http: reqwest::Client,
    base_url: String,
}

impl UserDirectory {
    pub fn new(base_url: &str) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(INTERNAL_TOKEN_HEADER, HeaderValue::from_str(&internal_token())?);
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .default_headers(headers)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/internal{path}", self.base_url)
    }

    pub async fn get_user(&self, id: i64) -> AppResult<DirectoryUser> {
        let resp = self.http.get(self.url(&format!("/users/{id}"))).send().await;
        read(resp).await
    }

    pub async fn get_users(&self, ids: &[i64]) -> AppResult<Vec<DirectoryUser>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let resp = self
            .http
            .post(self.url("/users/batch"))
            .json(&serde_json::json!({ "ids": ids }))
            .send()
            .await;
        read(resp).await
    }

    pub async fn list_school_admins(&self) -> AppResult<Vec<DirectoryUser>> {
        let resp = self.http.get(self.url("/school-admins")).send().await;
        read(resp).await
    }

    pub async fn create_school_admin(&self, admin: &NewSchoolAdmin) -> AppResult<DirectoryUser> {
        let resp = self.http.post(self.url("/school-admins")).json(admin).send().await;
        read(resp).await
    }
}

/// Decodes a directory response. Transport failures and 5xx become 503 so
/// callers never act on made-up user data.
async fn read<T: DeserializeOwned>(resp: Result<reqwest::Response, reqwest::Error>) -> AppResult<T> {
    let resp = resp.map_err(|e| {
        tracing::error!(error = %e, "auth service unreachable");
        AppError::unavailable("user directory unavailable")
    })?;

    let status = resp.status();
    if status.is_success() {
        return resp
            .json::<Envelope<T>>()
            .await
            .map(|env| env.data)
            .map_err(|e| AppError::internal(format!("malformed user directory response: {e}")));
    }

    if status.is_server_error() {
        tracing::error!(status = %status, "auth service error");
        return Err(AppError::unavailable("user directory unavailable"));
    }

    let body = resp.json::<ErrorEnvelope>().await.ok().map(|e| e.error);
    Err(map_client_error(status, body))
}

fn map_client_error(status: StatusCode, body: Option<ErrorBody>) -> AppError {
    let Some(body) = body else {
        return AppError::internal(format!("user directory returned {status}"));
    };

    let code = match body.code.as_str() {
        "E0002" => ErrorCode::ValidationError,
        "E1007" => ErrorCode::UserNotFound,
        "E1002" => ErrorCode::EmailAlreadyExists,
        _ if status == StatusCode::NOT_FOUND => ErrorCode::UserNotFound,
        _ => ErrorCode::BadRequest,
    };

    match body.details {
        Some(details) => AppError::with_details(code, body.message, details),
        None => AppError::new(code, body.message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_pass_through_with_details() {
        let body = ErrorBody {
            code: "E0002".into(),
            message: "email already registered".into(),
            details: Some(serde_json::json!({ "errors": { "email": ["email already registered"] } })),
        };
        let err = map_client_error(StatusCode::UNPROCESSABLE_ENTITY, Some(body));
        assert_eq!(err.error_code(), ErrorCode::ValidationError);
    }

    #[test]
    fn missing_user_maps_to_user_not_found() {
        let body = ErrorBody { code: "E0003".into(), message: "nope".into(), details: None };
        let err = map_client_error(StatusCode::NOT_FOUND, Some(body));
        assert_eq!(err.error_code(), ErrorCode::UserNotFound);
    }

    #[test]
    fn directory_user_reads_auth_view() {
        let user: DirectoryUser = serde_json::from_str(
            r#"{"id":4,"name":"Admin","email":"a@s.ly","phone":null,"city":null,"role":"school_admin","admin_school":{"id":2,"name":"Sunrise"},"created_at":"2024-01-01T00:00:00Z"}"#,
        )
        .unwrap();
        assert_eq!(user.role, UserRole::SchoolAdmin);
        assert_eq!(user.admin_school, Some(AdminSchoolRef { id: 2, name: "Sunrise".into() }));
    }

    #[test]
    fn base_url_is_normalized() {
        let directory = UserDirectory::new("http://auth:4001/").unwrap();
        assert_eq!(directory.url("/users/1"), "http://auth:4001/internal/users/1");
    }
}
