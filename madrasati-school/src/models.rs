use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde::Serialize;

use crate::lifecycle::{ReportFlag, ReportStatus, ReviewRecord, ReviewStatus, SubRatings, Submission};
use crate::schema::{moderation_actions, review_reports, reviews, school_photos, schools};

// --- Schools ---

#[derive(Debug, Queryable, Selectable, Identifiable, Serialize, Clone)]
#[diesel(table_name = schools)]
pub struct School {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub area: Option<String>,
    pub category: Option<String>,
    pub level: Option<String>,
    pub gender_type: Option<String>,
    pub president_name: Option<String>,
    pub fees_range: Option<String>,
    pub curriculum: Option<String>,
    pub description: Option<String>,
    #[serde(skip_serializing)]
    pub logo_key: Option<String>,
    #[serde(rename = "logo")]
    pub logo_url: Option<String>,
    #[serde(skip_serializing)]
    pub admin_user_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Insertable, Default)]
#[diesel(table_name = schools)]
pub struct NewSchool {
    pub slug: String,
    pub name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub area: Option<String>,
    pub category: Option<String>,
    pub level: Option<String>,
    pub gender_type: Option<String>,
    pub president_name: Option<String>,
    pub fees_range: Option<String>,
    pub curriculum: Option<String>,
    pub description: Option<String>,
}

/// Partial update. `Some(None)` clears a nullable column.
#[derive(Debug, AsChangeset, Default)]
#[diesel(table_name = schools)]
pub struct SchoolChangeset {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub email: Option<Option<String>>,
    pub phone: Option<Option<String>>,
    pub address: Option<Option<String>>,
    pub area: Option<Option<String>>,
    pub category: Option<Option<String>>,
    pub level: Option<Option<String>>,
    pub gender_type: Option<Option<String>>,
    pub president_name: Option<Option<String>>,
    pub fees_range: Option<Option<String>>,
    pub curriculum: Option<Option<String>>,
    pub description: Option<Option<String>>,
    pub updated_at: Option<DateTime<Utc>>,
}

// --- Photos ---

#[derive(Debug, Queryable, Selectable, Identifiable, Serialize, Clone)]
#[diesel(table_name = school_photos)]
pub struct SchoolPhoto {
    pub id: i64,
    pub school_id: i64,
    #[serde(skip_serializing)]
    pub object_key: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = school_photos)]
pub struct NewSchoolPhoto {
    pub school_id: i64,
    pub object_key: String,
    pub url: String,
}

// --- Reviews ---

#[derive(Debug, Queryable, Selectable, Identifiable, Clone)]
#[diesel(table_name = reviews)]
pub struct Review {
    pub id: i64,
    pub school_id: i64,
    pub parent_id: i64,
    pub parent_name: String,
    pub parent_email: String,
    pub student_number: String,
    pub hygiene: Option<i16>,
    pub management: Option<i16>,
    pub education_quality: Option<i16>,
    pub parent_communication: Option<i16>,
    pub overall_rating: Option<f64>,
    pub comment: Option<String>,
    pub status: String,
    pub rejection_reason: Option<String>,
    pub is_reported: bool,
    pub report_reason: Option<String>,
    pub reported_at: Option<DateTime<Utc>>,
    pub report_status: Option<String>,
    pub moderation_cleared_by: Option<i64>,
    pub moderation_cleared_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Review {
    pub fn ratings(&self) -> SubRatings {
        SubRatings {
            hygiene: self.hygiene,
            management: self.management,
            education_quality: self.education_quality,
            parent_communication: self.parent_communication,
        }
    }

    /// Unknown status strings read as pending, the most restrictive state.
    pub fn status(&self) -> ReviewStatus {
        self.status.parse().unwrap_or(ReviewStatus::Pending)
    }

    pub fn to_record(&self) -> ReviewRecord {
        let report = match (self.is_reported, &self.report_reason, self.reported_at) {
            (true, Some(reason), Some(reported_at)) => Some(ReportFlag {
                reason: reason.clone(),
                reported_at,
                status: self
                    .report_status
                    .as_deref()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(ReportStatus::Open),
            }),
            _ => None,
        };

        ReviewRecord {
            id: self.id,
            school_id: self.school_id,
            parent_id: self.parent_id,
            student_number: self.student_number.clone(),
            ratings: self.ratings(),
            overall_rating: self.overall_rating,
            comment: self.comment.clone(),
            status: self.status(),
            rejection_reason: self.rejection_reason.clone(),
            report,
            moderation_cleared_by: self.moderation_cleared_by,
            moderation_cleared_at: self.moderation_cleared_at,
            reviewed_by: self.reviewed_by,
            reviewed_at: self.reviewed_at,
            created_at: self.created_at,
        }
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = reviews)]
pub struct NewReview {
    pub school_id: i64,
    pub parent_id: i64,
    pub parent_name: String,
    pub parent_email: String,
    pub student_number: String,
    pub hygiene: Option<i16>,
    pub management: Option<i16>,
    pub education_quality: Option<i16>,
    pub parent_communication: Option<i16>,
    pub overall_rating: Option<f64>,
    pub comment: Option<String>,
    pub status: String,
}

impl NewReview {
    pub fn from_submission(submission: Submission, parent_name: String, parent_email: String) -> Self {
        let [h, m, e, p] = submission.ratings;
        Self {
            school_id: submission.school_id,
            parent_id: submission.parent_id,
            parent_name,
            parent_email,
            student_number: submission.student_number,
            hygiene: Some(h),
            management: Some(m),
            education_quality: Some(e),
            parent_communication: Some(p),
            overall_rating: Some(submission.overall_rating),
            comment: submission.comment,
            status: ReviewStatus::Pending.as_str().to_string(),
        }
    }
}

/// Lifecycle-owned columns written back after a transition.
#[derive(Debug, AsChangeset)]
#[diesel(table_name = reviews, treat_none_as_null = true)]
pub struct ReviewChangeset {
    pub status: String,
    pub rejection_reason: Option<String>,
    pub is_reported: bool,
    pub report_reason: Option<String>,
    pub reported_at: Option<DateTime<Utc>>,
    pub report_status: Option<String>,
    pub moderation_cleared_by: Option<i64>,
    pub moderation_cleared_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl From<&ReviewRecord> for ReviewChangeset {
    fn from(record: &ReviewRecord) -> Self {
        let report = record.report.as_ref();
        Self {
            status: record.status.as_str().to_string(),
            rejection_reason: record.rejection_reason.clone(),
            is_reported: report.is_some(),
            report_reason: report.map(|r| r.reason.clone()),
            reported_at: report.map(|r| r.reported_at),
            report_status: report.map(|r| r.status.as_str().to_string()),
            moderation_cleared_by: record.moderation_cleared_by,
            moderation_cleared_at: record.moderation_cleared_at,
            reviewed_by: record.reviewed_by,
            reviewed_at: record.reviewed_at,
            updated_at: Utc::now(),
        }
    }
}

// --- Reports ---

#[derive(Debug, Queryable, Selectable, Identifiable, Clone)]
#[diesel(table_name = review_reports)]
pub struct ReviewReport {
    pub id: i64,
    pub review_id: i64,
    pub school_id: i64,
    pub reporter_id: i64,
    pub reporter_name: String,
    pub reporter_email: String,
    pub reporter_role: String,
    pub reporter_school_name: Option<String>,
    pub reason: String,
    pub status: String,
    pub resolved_by: Option<i64>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = review_reports)]
pub struct NewReviewReport {
    pub review_id: i64,
    pub school_id: i64,
    pub reporter_id: i64,
    pub reporter_name: String,
    pub reporter_email: String,
    pub reporter_role: String,
    pub reporter_school_name: Option<String>,
    pub reason: String,
    pub status: String,
}

// --- Audit log ---

#[derive(Debug, Queryable, Selectable, Identifiable, Serialize, Clone)]
#[diesel(table_name = moderation_actions)]
pub struct ModerationAction {
    pub id: i64,
    pub actor_id: i64,
    pub action: String,
    pub review_id: Option<i64>,
    pub school_id: Option<i64>,
    pub details: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = moderation_actions)]
pub struct NewModerationAction {
    pub actor_id: i64,
    pub action: String,
    pub review_id: Option<i64>,
    pub school_id: Option<i64>,
    pub details: Option<serde_json::Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Actor;
    use madrasati_shared::types::auth::UserRole;

    fn stored(status: &str) -> Review {
        Review {
            id: 1,
            school_id: 2,
            parent_id: 3,
            parent_name: "Salem".into(),
            parent_email: "salem@example.ly".into(),
            student_number: "ST-9".into(),
            hygiene: Some(4),
            management: None,
            education_quality: Some(5),
            parent_communication: Some(3),
            overall_rating: None,
            comment: None,
            status: status.into(),
            rejection_reason: None,
            is_reported: false,
            report_reason: None,
            reported_at: None,
            report_status: None,
            moderation_cleared_by: None,
            moderation_cleared_at: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn stored_row_keeps_missing_ratings() {
        let record = stored("pending").to_record();
        assert_eq!(record.ratings.management, None);
        assert!(record.ratings.complete().is_none());
    }

    #[test]
    fn changeset_writes_report_flag() {
        let mut record = stored("approved").to_record();
        record.ratings.management = Some(4);
        let reporter = Actor { user_id: 5, role: UserRole::Parent, school_id: None };
        record.report(&reporter, Some("fake review")).unwrap();

        let changes = ReviewChangeset::from(&record);
        assert_eq!(changes.status, "reported");
        assert!(changes.is_reported);
        assert_eq!(changes.report_reason.as_deref(), Some("fake review"));
        assert_eq!(changes.report_status.as_deref(), Some("open"));
    }

    #[test]
    fn reported_row_round_trips_into_record() {
        let mut row = stored("reported");
        row.is_reported = true;
        row.report_reason = Some("offensive".into());
        row.reported_at = Some(Utc::now());
        row.report_status = Some("open".into());

        let record = row.to_record();
        assert!(record.is_reported());
        assert_eq!(record.report.unwrap().status, ReportStatus::Open);
    }
}
