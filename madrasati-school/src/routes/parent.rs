//! Review submission, a parent's own reviews, and reporting.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use std::sync::Arc;

use madrasati_shared::clients::db;
use madrasati_shared::errors::AppResult;
use madrasati_shared::middleware::{ParentUser, ReporterUser};
use madrasati_shared::types::auth::UserRole;
use madrasati_shared::types::ApiResponse;

use crate::events::publisher;
use crate::lifecycle::{self, Actor, ReviewDraft};
use crate::routes::ReportRequest;
use crate::services::review_service::{self, Reporter};
use crate::services::school_service;
use crate::views::{ParentReview, ReviewState};
use crate::AppState;

pub async fn submit_review(
    ParentUser(user): ParentUser,
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Json(draft): Json<ReviewDraft>,
) -> AppResult<(StatusCode, Json<ApiResponse<ParentReview>>)> {
    let (school, submission) = {
        let mut conn = db::checkout(&state.db)?;
        let school = school_service::find_by_slug(&mut conn, &slug)?;
        let submission = lifecycle::submit(&Actor::new(&user, None), school.id, draft)?;
        (school, submission)
    };

    let parent = state.users.get_user(user.id).await?;

    let review = {
        let mut conn = db::checkout(&state.db)?;
        review_service::insert(&mut conn, submission, parent.name, parent.email)?
    };

    tracing::info!(review_id = review.id, school_id = school.id, parent_id = user.id, "review submitted");
    publisher::publish_review_transition(
        &state.rabbitmq,
        lifecycle::Transition::Submit,
        &review.to_record(),
        user.id,
    )
    .await;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok_with_message(
            ParentReview::new(&review, Some(&school)),
            "review submitted and waiting for the school's verification",
        )),
    ))
}

pub async fn my_reviews(
    ParentUser(user): ParentUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<Vec<ParentReview>>>> {
    let mut conn = db::checkout(&state.db)?;
    let reviews = review_service::for_parent(&mut conn, user.id)?;
    Ok(Json(ApiResponse::ok(reviews)))
}

pub async fn report_review(
    ReporterUser(user): ReporterUser,
    State(state): State<Arc<AppState>>,
    Path(review_id): Path<i64>,
    Json(body): Json<ReportRequest>,
) -> AppResult<Json<ApiResponse<ReviewState>>> {
    // Validate against the current row before calling the user directory.
    let (actor, school_name) = {
        let mut conn = db::checkout(&state.db)?;
        let school = match user.role {
            UserRole::SchoolAdmin => school_service::administered_by(&mut conn, user.id)?,
            _ => None,
        };
        let actor = Actor::new(&user, school.as_ref().map(|s| s.id));
        let mut record = review_service::find(&mut conn, review_id)?.to_record();
        record.report(&actor, body.report_reason.as_deref())?;
        (actor, school.map(|s| s.name))
    };

    let profile = state.users.get_user(user.id).await?;
    let reporter = Reporter {
        user_id: user.id,
        name: profile.name,
        email: profile.email,
        role: user.role.as_str().to_string(),
        school_name,
    };

    let (review, record) = {
        let mut conn = db::checkout(&state.db)?;
        let review = review_service::find(&mut conn, review_id)?;
        let before = review.status();
        let mut record = review.to_record();
        let applied = record.report(&actor, body.report_reason.as_deref())?;
        let review = review_service::persist_report(&mut conn, before, &record, applied, &reporter)?;
        review_service::record_transition(applied.transition);
        (review, record)
    };

    tracing::info!(review_id, reporter_id = user.id, role = %user.role, "review reported");
    publisher::publish_review_transition(&state.rabbitmq, lifecycle::Transition::Report, &record, user.id)
        .await;

    Ok(Json(ApiResponse::ok_with_message(
        ReviewState::from(&review),
        "report received, the review is hidden until a moderator decides",
    )))
}
