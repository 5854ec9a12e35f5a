//! Super-admin moderation: the pending queue, reports, stats and the audit log.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::Deserialize;
use std::sync::Arc;

use madrasati_shared::clients::db;
use madrasati_shared::errors::{AppError, AppResult};
use madrasati_shared::middleware::SuperAdminUser;
use madrasati_shared::types::pagination::{Paginated, PaginationParams};
use madrasati_shared::types::ApiResponse;

use crate::events::publisher;
use crate::lifecycle::{Actor, ReportStatus, Transition};
use crate::models::{ModerationAction, Review};
use crate::routes::{Deleted, RejectRequest};
use crate::services::audit::{self, DashboardStats};
use crate::services::review_service::{self, Transitioned};
use crate::views::{ReportView, StaffReview};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct ReportFilterParams {
    pub status: Option<String>,
    #[serde(default = "default_page")]
    pub page: u64,
    #[serde(default = "default_per_page")]
    pub per_page: u64,
}

fn default_page() -> u64 { 1 }
fn default_per_page() -> u64 { 20 }

impl ReportFilterParams {
    fn status(&self) -> AppResult<Option<ReportStatus>> {
        match self.status.as_deref().map(str::trim) {
            None | Some("") | Some("all") => Ok(None),
            Some(s) => s
                .parse()
                .map(Some)
                .map_err(|_| AppError::field("status", "status must be open or dismissed")),
        }
    }
}

pub async fn moderation_queue(
    SuperAdminUser(_admin): SuperAdminUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<StaffReview>>>> {
    let mut conn = db::checkout(&state.db)?;
    Ok(Json(ApiResponse::ok(review_service::moderation_queue(&mut conn, &params)?)))
}

/// Staff view of one review, with its school reference.
fn staff_view(state: &AppState, review: &Review) -> AppResult<StaffReview> {
    let mut conn = db::checkout(&state.db)?;
    let view = review_service::staff_views(&mut conn, std::slice::from_ref(review))?
        .pop()
        .unwrap_or_else(|| StaffReview::new(review, None));
    Ok(view)
}

async fn moderated(state: &AppState, admin_id: i64, outcome: Transitioned) -> AppResult<StaffReview> {
    let Transitioned { review, record, applied } = outcome;
    publisher::publish_review_transition(&state.rabbitmq, applied.transition, &record, admin_id).await;
    staff_view(state, &review)
}

/// Clears a pending review for the school's verification queue.
pub async fn clear_review(
    SuperAdminUser(admin): SuperAdminUser,
    State(state): State<Arc<AppState>>,
    Path(review_id): Path<i64>,
) -> AppResult<Json<ApiResponse<StaffReview>>> {
    let actor = Actor::new(&admin, None);
    let outcome = {
        let mut conn = db::checkout(&state.db)?;
        review_service::apply(&mut conn, review_id, &actor, |record, actor| record.moderation_clear(actor))?
    };

    let review = moderated(&state, admin.id, outcome).await?;
    Ok(Json(ApiResponse::ok_with_message(
        review,
        "review cleared, waiting for the school's verification",
    )))
}

pub async fn reject_review(
    SuperAdminUser(admin): SuperAdminUser,
    State(state): State<Arc<AppState>>,
    Path(review_id): Path<i64>,
    body: Option<Json<RejectRequest>>,
) -> AppResult<Json<ApiResponse<StaffReview>>> {
    let reason = body.and_then(|Json(b)| b.rejection_reason);
    let actor = Actor::new(&admin, None);
    let outcome = {
        let mut conn = db::checkout(&state.db)?;
        review_service::apply(&mut conn, review_id, &actor, |record, actor| {
            record.moderation_reject(actor, reason.as_deref())
        })?
    };

    let review = moderated(&state, admin.id, outcome).await?;
    Ok(Json(ApiResponse::ok_with_message(review, "review rejected")))
}

pub async fn delete_review(
    SuperAdminUser(admin): SuperAdminUser,
    State(state): State<Arc<AppState>>,
    Path(review_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Deleted>>> {
    let actor = Actor::new(&admin, None);
    let record = {
        let mut conn = db::checkout(&state.db)?;
        let review = review_service::find(&mut conn, review_id)?;
        let record = review.to_record();
        record.delete(&actor)?;
        review_service::delete(&mut conn, &review, admin.id, None)?;
        record
    };

    review_service::record_transition(Transition::Delete);
    tracing::info!(review_id, admin_id = admin.id, "review deleted");
    publisher::publish_review_transition(&state.rabbitmq, Transition::Delete, &record, admin.id).await;

    Ok(Json(ApiResponse::ok(Deleted { id: review_id, deleted: true })))
}

pub async fn list_reports(
    SuperAdminUser(_admin): SuperAdminUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<ReportFilterParams>,
) -> AppResult<Json<ApiResponse<Paginated<ReportView>>>> {
    let status = params.status()?;
    let pagination = PaginationParams::new(params.page, params.per_page);
    let mut conn = db::checkout(&state.db)?;
    Ok(Json(ApiResponse::ok(review_service::reports(&mut conn, status, &pagination)?)))
}

/// Keeps the review: it returns to approved and the report is marked dismissed.
pub async fn dismiss_report(
    SuperAdminUser(admin): SuperAdminUser,
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<i64>,
) -> AppResult<Json<ApiResponse<StaffReview>>> {
    let actor = Actor::new(&admin, None);
    let (review, record) = {
        let mut conn = db::checkout(&state.db)?;
        let report = review_service::find_report(&mut conn, report_id)?;
        review_service::require_open(&report)?;

        let review = review_service::find(&mut conn, report.review_id)?;
        let mut record = review.to_record();
        let applied = record.dismiss(&actor)?;
        let review = review_service::persist_dismissal(&mut conn, &report, &record, applied, admin.id)?;
        (review, record)
    };

    review_service::record_transition(Transition::Dismiss);
    tracing::info!(report_id, review_id = review.id, admin_id = admin.id, "report dismissed");
    publisher::publish_review_transition(&state.rabbitmq, Transition::Dismiss, &record, admin.id).await;

    let view = staff_view(&state, &review)?;
    Ok(Json(ApiResponse::ok_with_message(view, "report dismissed, the review is public again")))
}

/// Upholds a report by deleting the disputed review.
pub async fn delete_reported_review(
    SuperAdminUser(admin): SuperAdminUser,
    State(state): State<Arc<AppState>>,
    Path(report_id): Path<i64>,
) -> AppResult<Json<ApiResponse<Deleted>>> {
    let actor = Actor::new(&admin, None);
    let record = {
        let mut conn = db::checkout(&state.db)?;
        let report = review_service::find_report(&mut conn, report_id)?;
        review_service::require_open(&report)?;

        let review = review_service::find(&mut conn, report.review_id)?;
        let record = review.to_record();
        record.delete(&actor)?;
        review_service::delete(&mut conn, &review, admin.id, Some(report.id))?;
        record
    };

    review_service::record_transition(Transition::Delete);
    tracing::info!(report_id, review_id = record.id, admin_id = admin.id, "reported review deleted");
    publisher::publish_review_transition(&state.rabbitmq, Transition::Delete, &record, admin.id).await;

    Ok(Json(ApiResponse::ok(Deleted { id: record.id, deleted: true })))
}

pub async fn get_stats(
    SuperAdminUser(_admin): SuperAdminUser,
    State(state): State<Arc<AppState>>,
) -> AppResult<Json<ApiResponse<DashboardStats>>> {
    let mut conn = db::checkout(&state.db)?;
    Ok(Json(ApiResponse::ok(audit::stats(&mut conn)?)))
}

pub async fn get_audit_log(
    SuperAdminUser(_admin): SuperAdminUser,
    State(state): State<Arc<AppState>>,
    Query(params): Query<PaginationParams>,
) -> AppResult<Json<ApiResponse<Paginated<ModerationAction>>>> {
    let mut conn = db::checkout(&state.db)?;
    Ok(Json(ApiResponse::ok(audit::list(&mut conn, &params)?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(status: Option<&str>) -> ReportFilterParams {
        ReportFilterParams { status: status.map(str::to_string), page: 1, per_page: 20 }
    }

    #[test]
    fn report_status_filter() {
        assert_eq!(params(None).status().unwrap(), None);
        assert_eq!(params(Some("all")).status().unwrap(), None);
        assert_eq!(params(Some("open")).status().unwrap(), Some(ReportStatus::Open));
        assert_eq!(params(Some("dismissed")).status().unwrap(), Some(ReportStatus::Dismissed));
        assert!(params(Some("closed")).status().is_err());
    }
}
