use std::collections::HashMap;

use chrono::Utc;
use diesel::prelude::*;
use diesel::PgConnection;

use madrasati_shared::errors::{AppError, AppResult, ErrorCode};
use madrasati_shared::types::pagination::{Paginated, PaginationParams};

use madrasati_shared::types::auth::UserRole;

use crate::lifecycle::{
    Actor, Applied, LifecycleError, ReportStatus, ReviewRecord, ReviewStatus, Submission, Transition,
};
use crate::models::{NewReview, NewReviewReport, Review, ReviewChangeset, ReviewReport, School};
use crate::schema::{review_reports, reviews};
use crate::services::{audit, school_service};
use crate::views::{ParentReview, ReportView, StaffReview};

pub fn record_transition(transition: Transition) {
    metrics::counter!("review_transitions_total", "transition" => transition.as_str()).increment(1);
}

pub fn find(conn: &mut PgConnection, review_id: i64) -> AppResult<Review> {
    reviews::table
        .find(review_id)
        .first::<Review>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::ReviewNotFound, "review not found"))
}

/// Stores a validated submission as a pending review.
pub fn insert(
    conn: &mut PgConnection,
    submission: Submission,
    parent_name: String,
    parent_email: String,
) -> AppResult<Review> {
    let review: Review = diesel::insert_into(reviews::table)
        .values(&NewReview::from_submission(submission, parent_name, parent_email))
        .get_result(conn)?;
    record_transition(Transition::Submit);
    Ok(review)
}

/// Explains why a compare-and-set touched no row.
fn lost_race(conn: &mut PgConnection, review_id: i64, transition: Transition) -> AppError {
    let current: QueryResult<Option<String>> = reviews::table
        .find(review_id)
        .select(reviews::status)
        .first(conn)
        .optional();

    match current {
        Ok(Some(status)) => AppError::new(
            ErrorCode::ReviewStateConflict,
            format!("cannot {transition}: review is now {status}"),
        ),
        Ok(None) => AppError::new(ErrorCode::ReviewNotFound, "review not found"),
        Err(e) => e.into(),
    }
}

/// Writes a transition back with `WHERE status = <before>`. Zero affected
/// rows means another request won the race.
pub fn persist(
    conn: &mut PgConnection,
    before: ReviewStatus,
    record: &ReviewRecord,
    applied: Applied,
) -> AppResult<Review> {
    let changes = ReviewChangeset::from(record);
    let target = reviews::table
        .filter(reviews::id.eq(record.id))
        .filter(reviews::status.eq(before.as_str()));

    let updated: Option<Review> = match applied.transition {
        // Clearance keeps the status, so the clearance column is the guard.
        Transition::ModerationClear => diesel::update(target.filter(reviews::moderation_cleared_at.is_null()))
            .set(&changes)
            .get_result(conn)
            .optional()?,
        _ => diesel::update(target).set(&changes).get_result(conn).optional()?,
    };

    updated.ok_or_else(|| lost_race(conn, record.id, applied.transition))
}

/// Result of a transition written to storage.
pub struct Transitioned {
    pub review: Review,
    pub record: ReviewRecord,
    pub applied: Applied,
}

/// Loads a review, runs one lifecycle step on it and writes the result back.
/// Super-admin steps are recorded in the audit log in the same transaction.
pub fn apply<F>(conn: &mut PgConnection, review_id: i64, actor: &Actor, step: F) -> AppResult<Transitioned>
where
    F: FnOnce(&mut ReviewRecord, &Actor) -> Result<Applied, LifecycleError>,
{
    let review = find(conn, review_id)?;
    let before = review.status();
    let mut record = review.to_record();
    let applied = step(&mut record, actor)?;

    let review = conn.transaction::<_, AppError, _>(|conn| {
        let stored = persist(conn, before, &record, applied)?;
        if actor.role == UserRole::SuperAdmin {
            audit::log(
                conn,
                actor.user_id,
                applied.transition.as_str(),
                Some(record.id),
                Some(record.school_id),
                Some(serde_json::json!({
                    "from": applied.from,
                    "to": applied.to,
                    "reason": record.rejection_reason,
                })),
            )?;
        }
        Ok(stored)
    })?;

    record_transition(applied.transition);
    tracing::info!(
        review_id,
        actor_id = actor.user_id,
        transition = %applied.transition,
        from = %applied.from,
        "review transition applied"
    );

    Ok(Transitioned { review, record, applied })
}

/// Reporter identity captured with a dispute.
pub struct Reporter {
    pub user_id: i64,
    pub name: String,
    pub email: String,
    pub role: String,
    pub school_name: Option<String>,
}

/// Applies a report: the review flag and the report row commit together.
pub fn persist_report(
    conn: &mut PgConnection,
    before: ReviewStatus,
    record: &ReviewRecord,
    applied: Applied,
    reporter: &Reporter,
) -> AppResult<Review> {
    let reason = record
        .report
        .as_ref()
        .map(|r| r.reason.clone())
        .unwrap_or_default();

    conn.transaction::<_, AppError, _>(|conn| {
        let review = persist(conn, before, record, applied)?;

        diesel::insert_into(review_reports::table)
            .values(&NewReviewReport {
                review_id: record.id,
                school_id: record.school_id,
                reporter_id: reporter.user_id,
                reporter_name: reporter.name.clone(),
                reporter_email: reporter.email.clone(),
                reporter_role: reporter.role.clone(),
                reporter_school_name: reporter.school_name.clone(),
                reason: reason.clone(),
                status: ReportStatus::Open.as_str().to_string(),
            })
            .execute(conn)?;

        audit::log(
            conn,
            reporter.user_id,
            Transition::Report.as_str(),
            Some(record.id),
            Some(record.school_id),
            Some(serde_json::json!({ "reason": reason })),
        )?;

        Ok(review)
    })
}

pub fn find_report(conn: &mut PgConnection, report_id: i64) -> AppResult<ReviewReport> {
    review_reports::table
        .find(report_id)
        .first::<ReviewReport>(conn)
        .optional()?
        .ok_or_else(|| AppError::new(ErrorCode::ReportNotFound, "report not found"))
}

pub fn require_open(report: &ReviewReport) -> AppResult<()> {
    if report.status == ReportStatus::Open.as_str() {
        Ok(())
    } else {
        Err(AppError::new(ErrorCode::ReportAlreadyResolved, "this report has already been resolved"))
    }
}

/// Dismissal: the review returns to approved and the report row is kept as dismissed.
pub fn persist_dismissal(
    conn: &mut PgConnection,
    report: &ReviewReport,
    record: &ReviewRecord,
    applied: Applied,
    actor_id: i64,
) -> AppResult<Review> {
    conn.transaction::<_, AppError, _>(|conn| {
        let review = persist(conn, ReviewStatus::Reported, record, applied)?;

        let resolved = diesel::update(
            review_reports::table
                .filter(review_reports::id.eq(report.id))
                .filter(review_reports::status.eq(ReportStatus::Open.as_str())),
        )
        .set((
            review_reports::status.eq(ReportStatus::Dismissed.as_str()),
            review_reports::resolved_by.eq(Some(actor_id)),
            review_reports::resolved_at.eq(Some(Utc::now())),
        ))
        .execute(conn)?;

        if resolved == 0 {
            return Err(AppError::new(ErrorCode::ReportAlreadyResolved, "this report has already been resolved"));
        }

        audit::log(
            conn,
            actor_id,
            Transition::Dismiss.as_str(),
            Some(record.id),
            Some(record.school_id),
            Some(serde_json::json!({ "report_id": report.id })),
        )?;

        Ok(review)
    })
}

/// Hard delete of a review and its reports. The audit entry keeps a snapshot.
pub fn delete(conn: &mut PgConnection, review: &Review, actor_id: i64, report_id: Option<i64>) -> AppResult<()> {
    conn.transaction::<_, AppError, _>(|conn| {
        diesel::delete(review_reports::table.filter(review_reports::review_id.eq(review.id)))
            .execute(conn)?;
        let deleted = diesel::delete(reviews::table.find(review.id)).execute(conn)?;
        if deleted == 0 {
            return Err(AppError::new(ErrorCode::ReviewNotFound, "review not found"));
        }

        audit::log(
            conn,
            actor_id,
            Transition::Delete.as_str(),
            Some(review.id),
            Some(review.school_id),
            Some(serde_json::json!({
                "status": review.status,
                "parent_id": review.parent_id,
                "overall_rating": review.overall_rating,
                "report_id": report_id,
            })),
        )?;
        Ok(())
    })
}

fn school_ids(reviews: &[Review]) -> Vec<i64> {
    let mut ids: Vec<i64> = reviews.iter().map(|r| r.school_id).collect();
    ids.sort_unstable();
    ids.dedup();
    ids
}

pub fn staff_views(conn: &mut PgConnection, rows: &[Review]) -> QueryResult<Vec<StaffReview>> {
    let schools = school_service::load_by_ids(conn, &school_ids(rows))?;
    Ok(rows
        .iter()
        .map(|r| StaffReview::new(r, schools.get(&r.school_id)))
        .collect())
}

/// Every review a parent wrote, newest first.
pub fn for_parent(conn: &mut PgConnection, parent_id: i64) -> QueryResult<Vec<ParentReview>> {
    let rows: Vec<Review> = reviews::table
        .filter(reviews::parent_id.eq(parent_id))
        .order(reviews::created_at.desc())
        .load(conn)?;
    let schools = school_service::load_by_ids(conn, &school_ids(&rows))?;
    Ok(rows
        .iter()
        .map(|r| ParentReview::new(r, schools.get(&r.school_id)))
        .collect())
}

/// A school's verification queue, oldest first.
pub fn pending_for_school(conn: &mut PgConnection, school: &School) -> QueryResult<Vec<StaffReview>> {
    let rows: Vec<Review> = reviews::table
        .filter(reviews::school_id.eq(school.id))
        .filter(reviews::status.eq(ReviewStatus::Pending.as_str()))
        .order(reviews::created_at.asc())
        .load(conn)?;
    Ok(rows.iter().map(|r| StaffReview::new(r, Some(school))).collect())
}

/// Approved and reported reviews of a school, newest first.
pub fn published_for_school(conn: &mut PgConnection, school: &School) -> QueryResult<Vec<StaffReview>> {
    let rows: Vec<Review> = reviews::table
        .filter(reviews::school_id.eq(school.id))
        .filter(reviews::status.eq_any([ReviewStatus::Approved.as_str(), ReviewStatus::Reported.as_str()]))
        .order(reviews::created_at.desc())
        .load(conn)?;
    Ok(rows.iter().map(|r| StaffReview::new(r, Some(school))).collect())
}

/// Pending reviews across every school.
pub fn moderation_queue(
    conn: &mut PgConnection,
    pagination: &PaginationParams,
) -> AppResult<Paginated<StaffReview>> {
    let pending = reviews::table.filter(reviews::status.eq(ReviewStatus::Pending.as_str()));

    let total: i64 = pending.count().get_result(conn)?;
    let rows: Vec<Review> = pending
        .order(reviews::created_at.asc())
        .offset(pagination.offset() as i64)
        .limit(pagination.limit() as i64)
        .load(conn)?;

    Ok(Paginated::new(staff_views(conn, &rows)?, total as u64, pagination))
}

pub fn reports(
    conn: &mut PgConnection,
    status: Option<ReportStatus>,
    pagination: &PaginationParams,
) -> AppResult<Paginated<ReportView>> {
    let filtered = || {
        let mut query = review_reports::table.into_boxed();
        if let Some(status) = status {
            query = query.filter(review_reports::status.eq(status.as_str()));
        }
        query
    };

    let total: i64 = filtered().count().get_result(conn)?;
    let rows: Vec<ReviewReport> = filtered()
        .order(review_reports::created_at.desc())
        .offset(pagination.offset() as i64)
        .limit(pagination.limit() as i64)
        .load(conn)?;

    let review_ids: Vec<i64> = rows.iter().map(|r| r.review_id).collect();
    let reviewed: Vec<Review> = reviews::table
        .filter(reviews::id.eq_any(&review_ids))
        .load(conn)?;
    let by_id: HashMap<i64, StaffReview> = staff_views(conn, &reviewed)?
        .into_iter()
        .map(|r| (r.id, r))
        .collect();

    let items = rows
        .iter()
        .map(|report| ReportView::new(report, by_id.get(&report.review_id).cloned()))
        .collect();

    Ok(Paginated::new(items, total as u64, pagination))
}
