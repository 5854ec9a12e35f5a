//! Super-admin school directory management and admin assignment.

use axum::extract::{FromRequest, Multipart, Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use madrasati_shared::clients::db;
use madrasati_shared::errors::{AppError, AppResult, ErrorCode};
use madrasati_shared::middleware::SuperAdminUser;
use madrasati_shared::types::auth::UserRole;
use madrasati_shared::types::pagination::Paginated;
use madrasati_shared::types::ApiResponse;

use crate::clients::users::{DirectoryUser, NewSchoolAdmin};
use crate::events::publisher;
use crate::models::{School, SchoolPhoto};
use crate::routes::public::SchoolListParams;
use crate::routes::Deleted;
use crate::services::audit;
use crate::services::photo_service::{self, ImageUpload};
use crate::services::school_service::{self, SchoolInput};
use crate::AppState;

#[derive(Debug, Clone, Serialize)]
pub struct AdminRef {
    pub id: i64,
    pub name: String,
    pub email: String,
}

impl From<&DirectoryUser> for AdminRef {
    fn from(user: &DirectoryUser) -> Self {
        Self { id: user.id, name: user.name.clone(), email: user.email.clone() }
    }
}

/// A school as the super admin sees it, with its assigned admin.
#[derive(Debug, Serialize)]
pub struct AdminSchoolView {
    #[serde(flatten)]
    pub school: School,
    pub average_rating: Option<f64>,
    pub review_count: u64,
    pub admin_user_id: Option<i64>,
    pub admin: Option<AdminRef>,
}

/// The school admin account registered under `email`, if any.
fn matching_admin(admins: Vec<DirectoryUser>, email: &str) -> Option<DirectoryUser> {
    let email = email.trim().to_lowercase();
    admins
        .into_iter()
        .find(|u| u.role == UserRole::SchoolAdmin && u.email.to_lowercase() == email)
}

/// Assign an existing school admin, or create one and assign it.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum AssignAdminRequest {
    Existing { admin_user_id: i64 },
    New { name: String, email: String, password: String },
}

async fn admins_by_id(state: &AppState, ids: Vec<i64>) -> AppResult<HashMap<i64, AdminRef>> {
    let users = state.users.get_users(&ids).await?;
    Ok(users.iter().map(|u| (u.id, AdminRef::from(u))).collect())
}

pub async fn list_schools(
    SuperAdminUser(_admin): SuperAdminUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<SchoolListParams>,
) -> AppResult<Json<ApiResponse<Paginated<AdminSchoolView>>>> {
    let (filter, pagination) = params.split();
    let page = {
        let mut conn = db::checkout(&state.db)?;
        school_service::list(&mut conn, &filter, &pagination)?
    };

    let ids: Vec<i64> = page.items.iter().filter_map(|s| s.school.admin_user_id).collect();
    let admins = admins_by_id(&state, ids).await?;

    let items = page
        .items
        .into_iter()
        .map(|summary| AdminSchoolView {
            admin_user_id: summary.school.admin_user_id,
            admin: summary.school.admin_user_id.and_then(|id| admins.get(&id).cloned()),
            average_rating: summary.average_rating,
            review_count: summary.review_count,
            school: summary.school,
        })
        .collect();

    Ok(Json(ApiResponse::ok(Paginated {
        items,
        total: page.total,
        page: page.page,
        per_page: page.per_page,
        total_pages: page.total_pages,
    })))
}

async fn admin_view(state: &AppState, school: School) -> AppResult<AdminSchoolView> {
    let admin = match school.admin_user_id {
        Some(id) => Some(AdminRef::from(&state.users.get_user(id).await?)),
        None => None,
    };

    let (average_rating, review_count) = {
        let mut conn = db::checkout(&state.db)?;
        let approved = school_service::approved_reviews(&mut conn, school.id)?;
        let rated: Vec<f64> = approved.iter().filter_map(|r| r.overall_rating).collect();
        let average = (!rated.is_empty())
            .then(|| crate::rating::round1(rated.iter().sum::<f64>() / rated.len() as f64));
        (average, approved.len() as u64)
    };

    Ok(AdminSchoolView { admin_user_id: school.admin_user_id, admin, average_rating, review_count, school })
}

pub async fn get_school(
    SuperAdminUser(_admin): SuperAdminUser,
    State(state): State<Arc<AppState>>,
    Path(school_id): Path<i64>,
) -> AppResult<Json<ApiResponse<AdminSchoolView>>> {
    let school = {
        let mut conn = db::checkout(&state.db)?;
        school_service::find(&mut conn, school_id)?
    };
    Ok(Json(ApiResponse::ok(admin_view(&state, school).await?)))
}

/// Reads a school form sent either as JSON or as multipart with a logo.
async fn read_school_form(state: &AppState, req: Request) -> AppResult<(SchoolInput, Option<ImageUpload>)> {
    let is_multipart = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("multipart/form-data"))
        .unwrap_or(false);

    if is_multipart {
        let mut multipart = Multipart::from_request(req, &())
            .await
            .map_err(|e| AppError::bad_request(e.body_text()))?;
        photo_service::read_school_form(&mut multipart, state.config.max_upload_bytes).await
    } else {
        let Json(input) = Json::<SchoolInput>::from_request(req, &())
            .await
            .map_err(|e| AppError::bad_request(e.body_text()))?;
        Ok((input, None))
    }
}

pub async fn create_school(
    SuperAdminUser(admin): SuperAdminUser,
    State(state): State<Arc<AppState>>,
    req: Request,
) -> AppResult<(StatusCode, Json<ApiResponse<School>>)> {
    let (input, logo) = read_school_form(&state, req).await?;

    let school = {
        let mut conn = db::checkout(&state.db)?;
        let school = school_service::create(&mut conn, input)?;
        audit::log(&mut conn, admin.id, "school_create", None, Some(school.id), None)?;
        school
    };

    let school = match logo {
        Some(upload) => photo_service::replace_logo(&state.db, &state.minio, &school, upload).await?,
        None => school,
    };

    Ok((StatusCode::CREATED, Json(ApiResponse::ok_with_message(school, "school created"))))
}

pub async fn update_school(
    SuperAdminUser(admin): SuperAdminUser,
    State(state): State<Arc<AppState>>,
    Path(school_id): Path<i64>,
    req: Request,
) -> AppResult<Json<ApiResponse<School>>> {
    let (input, logo) = read_school_form(&state, req).await?;

    let school = {
        let mut conn = db::checkout(&state.db)?;
        let school = school_service::update(&mut conn, school_id, &input, true)?;
        audit::log(&mut conn, admin.id, "school_update", None, Some(school.id), None)?;
        school
    };

    let school = match logo {
        Some(upload) => photo_service::replace_logo(&state.db, &state.minio, &school, upload).await?,
        None => school,
    };

    tracing::info!(school_id, admin_id = admin.id, "school updated");
    Ok(Json(ApiResponse::ok_with_message(school, "school updated")))
}

pub async fn delete_school(
    SuperAdminUser(admin): SuperAdminUser,
    State(state): State<Arc<AppState>>,
    Path(school_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Deleted>>> {
    let deleted = {
        let mut conn = db::checkout(&state.db)?;
        let deleted = school_service::delete(&mut conn, school_id)?;
        audit::log(
            &mut conn,
            admin.id,
            "school_delete",
            None,
            Some(school_id),
            Some(serde_json::json!({ "name": deleted.school.name, "slug": deleted.school.slug })),
        )?;
        deleted
    };

    for key in &deleted.object_keys {
        photo_service::discard(&state.minio, key).await;
    }

    publisher::publish_school_deleted(&state.rabbitmq, school_id, deleted.school.admin_user_id, admin.id).await;
    tracing::info!(school_id, admin_id = admin.id, "school deleted");

    Ok(Json(ApiResponse::ok(Deleted { id: school_id, deleted: true })))
}

pub async fn upload_logo(
    SuperAdminUser(_admin): SuperAdminUser,
    State(state): State<Arc<AppState>>,
    Path(school_id): Path<i64>,
    mut multipart: Multipart,
) -> AppResult<Json<ApiResponse<School>>> {
    let school = {
        let mut conn = db::checkout(&state.db)?;
        school_service::find(&mut conn, school_id)?
    };
    let upload = photo_service::read_image(&mut multipart, state.config.max_upload_bytes).await?;
    let school = photo_service::replace_logo(&state.db, &state.minio, &school, upload).await?;
    Ok(Json(ApiResponse::ok(school)))
}

pub async fn upload_photo(
    SuperAdminUser(_admin): SuperAdminUser,
    State(state): State<Arc<AppState>>,
    Path(school_id): Path<i64>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<ApiResponse<SchoolPhoto>>)> {
    {
        let mut conn = db::checkout(&state.db)?;
        school_service::find(&mut conn, school_id)?;
    }
    let upload = photo_service::read_image(&mut multipart, state.config.max_upload_bytes).await?;
    let photo =
        photo_service::add_photo(&state.db, &state.minio, school_id, state.config.gallery_limit, upload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(photo))))
}

pub async fn list_school_admins(
    SuperAdminUser(_admin): SuperAdminUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<DirectoryUser>>>> {
    Ok(Json(ApiResponse::ok(state.users.list_school_admins().await?)))
}

pub async fn assign_admin(
    SuperAdminUser(admin): SuperAdminUser,
    State(state): State<Arc<AppState>>,
    Path(school_id): Path<i64>,
    Json(body): Json<AssignAdminRequest>,
) -> AppResult<Json<ApiResponse<AdminSchoolView>>> {
    {
        let mut conn = db::checkout(&state.db)?;
        school_service::find(&mut conn, school_id)?;
    }

    let target = match body {
        AssignAdminRequest::Existing { admin_user_id } => {
            let user = state.users.get_user(admin_user_id).await?;
            if user.role != UserRole::SchoolAdmin {
                return Err(AppError::new(ErrorCode::NotSchoolAdmin, "user is not a school admin"));
            }
            user
        }
        AssignAdminRequest::New { name, email, password } => {
            let admins = state.users.list_school_admins().await?;
            let leftover = match matching_admin(admins, &email) {
                Some(user) => {
                    let mut conn = db::checkout(&state.db)?;
                    school_service::administered_by(&mut conn, user.id)?.is_none().then_some(user)
                }
                None => None,
            };
            match leftover {
                // An earlier attempt created the account but failed to assign it.
                Some(user) => {
                    tracing::info!(admin_user_id = user.id, school_id, "reusing unassigned school admin account");
                    user
                }
                None => {
                    state
                        .users
                        .create_school_admin(&NewSchoolAdmin { name, email, password })
                        .await?
                }
            }
        }
    };

    let assignment = {
        let mut conn = db::checkout(&state.db)?;
        let assignment = school_service::assign_admin(&mut conn, school_id, target.id).map_err(|e| {
            tracing::warn!(error = %e, school_id, admin_user_id = target.id, "admin account left unassigned");
            e
        })?;
        audit::log(
            &mut conn,
            admin.id,
            "admin_assign",
            None,
            Some(school_id),
            Some(serde_json::json!({
                "admin_user_id": target.id,
                "previous_admin_user_id": assignment.previous_admin,
                "released_school_id": assignment.released_school,
            })),
        )?;
        assignment
    };

    if let Some(released) = assignment.released_school {
        tracing::info!(school_id = released, admin_user_id = target.id, "admin moved away from school");
    }
    publisher::publish_admin_assigned(
        &state.rabbitmq,
        &assignment.school,
        target.id,
        assignment.previous_admin,
        admin.id,
    )
    .await;

    tracing::info!(school_id, admin_user_id = target.id, "school admin assigned");
    let view = admin_view(&state, assignment.school).await?;
    Ok(Json(ApiResponse::ok_with_message(view, "school admin assigned")))
}

pub async fn unassign_admin(
    SuperAdminUser(admin): SuperAdminUser,
    State(state): State<Arc<AppState>>,
    Path(school_id): Path<i64>,
) -> AppResult<Json<ApiResponse<AdminSchoolView>>> {
    let (school, previous) = {
        let mut conn = db::checkout(&state.db)?;
        let (school, previous) = school_service::unassign_admin(&mut conn, school_id)?;
        audit::log(
            &mut conn,
            admin.id,
            "admin_unassign",
            None,
            Some(school_id),
            Some(serde_json::json!({ "admin_user_id": previous })),
        )?;
        (school, previous)
    };

    if let Some(previous) = previous {
        publisher::publish_admin_unassigned(&state.rabbitmq, school_id, previous, admin.id).await;
    }

    tracing::info!(school_id, previous_admin = ?previous, "school admin unassigned");
    Ok(Json(ApiResponse::ok_with_message(admin_view(&state, school).await?, "school admin removed")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assign_body_selects_existing_or_new() {
        let body: AssignAdminRequest = serde_json::from_str(r#"{"admin_user_id": 12}"#).unwrap();
        assert!(matches!(body, AssignAdminRequest::Existing { admin_user_id: 12 }));

        let body: AssignAdminRequest =
            serde_json::from_str(r#"{"name":"Huda","email":"huda@school.ly","password":"secret123"}"#).unwrap();
        assert!(matches!(body, AssignAdminRequest::New { .. }));

        assert!(serde_json::from_str::<AssignAdminRequest>(r#"{"name":"Huda"}"#).is_err());
    }

    fn directory_user(id: i64, email: &str, role: UserRole) -> DirectoryUser {
        DirectoryUser { id, name: "Huda Ali".into(), email: email.into(), role, admin_school: None }
    }

    #[test]
    fn retry_finds_the_account_created_earlier() {
        let admins = vec![
            directory_user(3, "other@school.ly", UserRole::SchoolAdmin),
            directory_user(9, "huda@school.ly", UserRole::SchoolAdmin),
        ];
        let found = matching_admin(admins, "  Huda@School.ly ").unwrap();
        assert_eq!(found.id, 9);
    }

    #[test]
    fn unknown_email_creates_a_new_account() {
        let admins = vec![directory_user(3, "other@school.ly", UserRole::SchoolAdmin)];
        assert!(matching_admin(admins, "huda@school.ly").is_none());

        let parents = vec![directory_user(4, "huda@school.ly", UserRole::Parent)];
        assert!(matching_admin(parents, "huda@school.ly").is_none());
    }
}
