//! Trail of super-admin and report actions.

use chrono::{DateTime, Utc};
use diesel::prelude::*;
use diesel::PgConnection;
use serde::Serialize;

use madrasati_shared::errors::AppResult;
use madrasati_shared::types::pagination::{Paginated, PaginationParams};

use crate::lifecycle::{ReportStatus, ReviewStatus};
use crate::models::{ModerationAction, NewModerationAction};
use crate::schema::{moderation_actions, review_reports, reviews, schools};

pub fn log(
    conn: &mut PgConnection,
    actor_id: i64,
    action: &str,
    review_id: Option<i64>,
    school_id: Option<i64>,
    details: Option<serde_json::Value>,
) -> QueryResult<()> {
    diesel::insert_into(moderation_actions::table)
        .values(&NewModerationAction {
            actor_id,
            action: action.to_string(),
            review_id,
            school_id,
            details,
        })
        .execute(conn)?;
    Ok(())
}

pub fn list(conn: &mut PgConnection, pagination: &PaginationParams) -> AppResult<Paginated<ModerationAction>> {
    let items = moderation_actions::table
        .order(moderation_actions::created_at.desc())
        .offset(pagination.offset() as i64)
        .limit(pagination.limit() as i64)
        .load::<ModerationAction>(conn)?;

    let total: i64 = moderation_actions::table.count().get_result(conn)?;

    Ok(Paginated::new(items, total as u64, pagination))
}

#[derive(Debug, Serialize)]
pub struct DashboardStats {
    pub schools: i64,
    pub schools_without_admin: i64,
    pub pending_reviews: i64,
    pub approved_reviews: i64,
    pub rejected_reviews: i64,
    pub reported_reviews: i64,
    pub open_reports: i64,
    pub reviews_today: i64,
}

fn count_status(conn: &mut PgConnection, status: ReviewStatus) -> QueryResult<i64> {
    reviews::table
        .filter(reviews::status.eq(status.as_str()))
        .count()
        .get_result(conn)
}

pub fn stats(conn: &mut PgConnection) -> AppResult<DashboardStats> {
    let schools: i64 = schools::table.count().get_result(conn)?;
    let schools_without_admin: i64 = schools::table
        .filter(schools::admin_user_id.is_null())
        .count()
        .get_result(conn)?;

    let open_reports: i64 = review_reports::table
        .filter(review_reports::status.eq(ReportStatus::Open.as_str()))
        .count()
        .get_result(conn)?;

    let today: DateTime<Utc> = Utc::now()
        .date_naive()
        .and_time(chrono::NaiveTime::MIN)
        .and_utc();
    let reviews_today: i64 = reviews::table
        .filter(reviews::created_at.ge(today))
        .count()
        .get_result(conn)?;

    Ok(DashboardStats {
        schools,
        schools_without_admin,
        pending_reviews: count_status(conn, ReviewStatus::Pending)?,
        approved_reviews: count_status(conn, ReviewStatus::Approved)?,
        rejected_reviews: count_status(conn, ReviewStatus::Rejected)?,
        reported_reviews: count_status(conn, ReviewStatus::Reported)?,
        open_reports,
        reviews_today,
    })
}
