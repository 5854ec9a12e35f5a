//! Endpoints for the admin of one school. The school always comes from
//! `schools.admin_user_id`.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;
use std::sync::Arc;

use madrasati_shared::clients::db;
use madrasati_shared::errors::AppResult;
use madrasati_shared::middleware::SchoolAdminUser;
use madrasati_shared::types::ApiResponse;

use crate::events::publisher;
use crate::models::{School, SchoolPhoto};
use crate::routes::{actor_for, Deleted, RejectRequest};
use crate::services::photo_service;
use crate::services::review_service::{self, Transitioned};
use crate::services::school_service::{self, SchoolInput};
use crate::views::StaffReview;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SchoolProfile {
    pub school: School,
}

fn own_school(state: &AppState, user_id: i64) -> AppResult<School> {
    let mut conn = db::checkout(&state.db)?;
    school_service::require_administered(&mut conn, user_id)
}

pub async fn get_profile(
    SchoolAdminUser(user): SchoolAdminUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<SchoolProfile>>> {
    let school = own_school(&state, user.id)?;
    Ok(Json(ApiResponse::ok(SchoolProfile { school })))
}

pub async fn update_profile(
    SchoolAdminUser(user): SchoolAdminUser,
    State(state): State<Arc<AppState>>,
    Json(input): Json<SchoolInput>,
) -> AppResult<Json<ApiResponse<SchoolProfile>>> {
    let mut conn = db::checkout(&state.db)?;
    let school = school_service::require_administered(&mut conn, user.id)?;
    let school = school_service::update(&mut conn, school.id, &input, false)?;

    tracing::info!(school_id = school.id, admin_id = user.id, "school profile updated");
    Ok(Json(ApiResponse::ok_with_message(SchoolProfile { school }, "profile updated")))
}

pub async fn upload_logo(
    SchoolAdminUser(user): SchoolAdminUser,
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> AppResult<Json<ApiResponse<SchoolProfile>>> {
    let school = own_school(&state, user.id)?;
    let upload = photo_service::read_image(&mut multipart, state.config.max_upload_bytes).await?;
    let school = photo_service::replace_logo(&state.db, &state.minio, &school, upload).await?;
    Ok(Json(ApiResponse::ok(SchoolProfile { school })))
}

pub async fn list_photos(
    SchoolAdminUser(user): SchoolAdminUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<SchoolPhoto>>>> {
    let mut conn = db::checkout(&state.db)?;
    let school = school_service::require_administered(&mut conn, user.id)?;
    Ok(Json(ApiResponse::ok(photo_service::list(&mut conn, school.id)?)))
}

pub async fn upload_photo(
    SchoolAdminUser(user): SchoolAdminUser,
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> AppResult<(StatusCode, Json<ApiResponse<SchoolPhoto>>)> {
    let school = own_school(&state, user.id)?;
    let upload = photo_service::read_image(&mut multipart, state.config.max_upload_bytes).await?;
    let photo =
        photo_service::add_photo(&state.db, &state.minio, school.id, state.config.gallery_limit, upload).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::ok(photo))))
}

pub async fn delete_photo(
    SchoolAdminUser(user): SchoolAdminUser,
    State(state): State<Arc<AppState>>,
    Path(photo_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Deleted>>> {
    let school = own_school(&state, user.id)?;
    photo_service::delete_photo(&state.db, &state.minio, school.id, photo_id).await?;
    Ok(Json(ApiResponse::ok(Deleted { id: photo_id, deleted: true })))
}

pub async fn pending_reviews(
    SchoolAdminUser(user): SchoolAdminUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<StaffReview>>>> {
    let mut conn = db::checkout(&state.db)?;
    let school = school_service::require_administered(&mut conn, user.id)?;
    Ok(Json(ApiResponse::ok(review_service::pending_for_school(&mut conn, &school)?)))
}

pub async fn published_reviews(
    SchoolAdminUser(user): SchoolAdminUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<StaffReview>>>> {
    let mut conn = db::checkout(&state.db)?;
    let school = school_service::require_administered(&mut conn, user.id)?;
    Ok(Json(ApiResponse::ok(review_service::published_for_school(&mut conn, &school)?)))
}

async fn verified(state: &AppState, user_id: i64, outcome: Transitioned) -> StaffReview {
    let Transitioned { review, record, applied } = outcome;
    publisher::publish_review_transition(&state.rabbitmq, applied.transition, &record, user_id).await;
    StaffReview::new(&review, None)
}

pub async fn approve_review(
    SchoolAdminUser(user): SchoolAdminUser,
    State(state): State<Arc<AppState>>,
    Path(review_id): Path<i64>,
) -> AppResult<Json<ApiResponse<StaffReview>>> {
    let outcome = {
        let mut conn = db::checkout(&state.db)?;
        let actor = actor_for(&mut conn, &user)?;
        review_service::apply(&mut conn, review_id, &actor, |record, actor| record.verify_approve(actor))?
    };

    let review = verified(&state, user.id, outcome).await;
    Ok(Json(ApiResponse::ok_with_message(review, "review approved and published")))
}

pub async fn reject_review(
    SchoolAdminUser(user): SchoolAdminUser,
    State(state): State<Arc<AppState>>,
    Path(review_id): Path<i64>,
    body: Option<Json<RejectRequest>>,
) -> AppResult<Json<ApiResponse<StaffReview>>> {
    let reason = body.and_then(|Json(b)| b.rejection_reason);
    let outcome = {
        let mut conn = db::checkout(&state.db)?;
        let actor = actor_for(&mut conn, &user)?;
        review_service::apply(&mut conn, review_id, &actor, |record, actor| {
            record.verify_reject(actor, reason.as_deref())
        })?
    };

    let review = verified(&state, user.id, outcome).await;
    Ok(Json(ApiResponse::ok_with_message(review, "review rejected")))
}
