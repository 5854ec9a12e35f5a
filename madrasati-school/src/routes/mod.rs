pub mod admin;
pub mod admin_schools;
pub mod health;
pub mod parent;
pub mod public;
pub mod school_admin;

use diesel::PgConnection;
use serde::Deserialize;

use madrasati_shared::errors::AppResult;
use madrasati_shared::types::auth::{AuthUser, UserRole};

use crate::lifecycle::Actor;
use crate::services::school_service;

#[derive(Debug, Default, Deserialize)]
pub struct RejectRequest {
    #[serde(alias = "reason")]
    pub rejection_reason: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ReportRequest {
    #[serde(alias = "reason")]
    pub report_reason: Option<String>,
}

#[derive(Debug, serde::Serialize)]
pub struct Deleted {
    pub id: i64,
    pub deleted: bool,
}

/// Resolves the acting user. A school admin's school comes from the school
/// table, never from the token.
pub fn actor_for(conn: &mut PgConnection, user: &AuthUser) -> AppResult<Actor> {
    let school_id = match user.role {
        UserRole::SchoolAdmin => school_service::administered_by(conn, user.id)?.map(|s| s.id),
        _ => None,
    };
    Ok(Actor::new(user, school_id))
}
