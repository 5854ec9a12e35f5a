//! Response shapes. Every view is built from the same stored rows; fields a
//! role may not see are simply absent from its view.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::lifecycle::ReviewStatus;
use crate::models::{Review, ReviewReport, School};
use crate::rating::RatingSummary;

#[derive(Debug, Clone, Serialize)]
pub struct SchoolRef {
    pub id: i64,
    pub name: String,
    pub slug: String,
}

impl From<&School> for SchoolRef {
    fn from(school: &School) -> Self {
        Self { id: school.id, name: school.name.clone(), slug: school.slug.clone() }
    }
}

/// A published review as guests see it: no student number, no e-mail.
#[derive(Debug, Clone, Serialize)]
pub struct PublicReview {
    pub id: i64,
    pub school_id: i64,
    pub parent_name: String,
    pub hygiene: Option<i16>,
    pub management: Option<i16>,
    pub education_quality: Option<i16>,
    pub parent_communication: Option<i16>,
    pub overall_rating: Option<f64>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<&Review> for PublicReview {
    fn from(review: &Review) -> Self {
        Self {
            id: review.id,
            school_id: review.school_id,
            parent_name: review.parent_name.clone(),
            hygiene: review.hygiene,
            management: review.management,
            education_quality: review.education_quality,
            parent_communication: review.parent_communication,
            overall_rating: review.overall_rating,
            comment: review.comment.clone(),
            created_at: review.created_at,
        }
    }
}

/// A parent's own review, in any status.
#[derive(Debug, Clone, Serialize)]
pub struct ParentReview {
    pub id: i64,
    pub school_id: i64,
    pub school: Option<SchoolRef>,
    pub hygiene: Option<i16>,
    pub management: Option<i16>,
    pub education_quality: Option<i16>,
    pub parent_communication: Option<i16>,
    pub overall_rating: Option<f64>,
    pub comment: Option<String>,
    pub status: ReviewStatus,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ParentReview {
    pub fn new(review: &Review, school: Option<&School>) -> Self {
        Self {
            id: review.id,
            school_id: review.school_id,
            school: school.map(SchoolRef::from),
            hygiene: review.hygiene,
            management: review.management,
            education_quality: review.education_quality,
            parent_communication: review.parent_communication,
            overall_rating: review.overall_rating,
            comment: review.comment.clone(),
            status: review.status(),
            rejection_reason: review.rejection_reason.clone(),
            created_at: review.created_at,
        }
    }
}

/// Full record for the owning school admin and the super admin.
#[derive(Debug, Clone, Serialize)]
pub struct StaffReview {
    pub id: i64,
    pub school_id: i64,
    pub school: Option<SchoolRef>,
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
    pub status: ReviewStatus,
    pub rejection_reason: Option<String>,
    pub is_reported: bool,
    pub report_reason: Option<String>,
    pub reported_at: Option<DateTime<Utc>>,
    pub report_status: Option<String>,
    pub moderation_cleared_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl StaffReview {
    pub fn new(review: &Review, school: Option<&School>) -> Self {
        Self {
            id: review.id,
            school_id: review.school_id,
            school: school.map(SchoolRef::from),
            parent_id: review.parent_id,
            parent_name: review.parent_name.clone(),
            parent_email: review.parent_email.clone(),
            student_number: review.student_number.clone(),
            hygiene: review.hygiene,
            management: review.management,
            education_quality: review.education_quality,
            parent_communication: review.parent_communication,
            overall_rating: review.overall_rating,
            comment: review.comment.clone(),
            status: review.status(),
            rejection_reason: review.rejection_reason.clone(),
            is_reported: review.is_reported,
            report_reason: review.report_reason.clone(),
            reported_at: review.reported_at,
            report_status: review.report_status.clone(),
            moderation_cleared_at: review.moderation_cleared_at,
            created_at: review.created_at,
        }
    }
}

/// What a reporter gets back: the new status, without the review's private fields.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewState {
    pub id: i64,
    pub school_id: i64,
    pub status: ReviewStatus,
    pub is_reported: bool,
    pub report_status: Option<String>,
}

impl From<&Review> for ReviewState {
    fn from(review: &Review) -> Self {
        Self {
            id: review.id,
            school_id: review.school_id,
            status: review.status(),
            is_reported: review.is_reported,
            report_status: review.report_status.clone(),
        }
    }
}

/// A dispute as listed for the super admin.
#[derive(Debug, Clone, Serialize)]
pub struct ReportView {
    pub id: i64,
    pub review_id: i64,
    pub review: Option<StaffReview>,
    pub reporter_id: i64,
    pub reporter_name: String,
    pub reporter_email: String,
    pub reporter_role: String,
    #[serde(rename = "school_managed_name")]
    pub reporter_school_name: Option<String>,
    pub reason: String,
    pub status: String,
    pub resolved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl ReportView {
    pub fn new(report: &ReviewReport, review: Option<StaffReview>) -> Self {
        Self {
            id: report.id,
            review_id: report.review_id,
            review,
            reporter_id: report.reporter_id,
            reporter_name: report.reporter_name.clone(),
            reporter_email: report.reporter_email.clone(),
            reporter_role: report.reporter_role.clone(),
            reporter_school_name: report.reporter_school_name.clone(),
            reason: report.reason.clone(),
            status: report.status.clone(),
            resolved_at: report.resolved_at,
            created_at: report.created_at,
        }
    }
}

/// Directory listing entry.
#[derive(Debug, Clone, Serialize)]
pub struct SchoolSummary {
    #[serde(flatten)]
    pub school: School,
    pub average_rating: Option<f64>,
    pub review_count: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SchoolDetail {
    #[serde(flatten)]
    pub school: School,
    pub rating: RatingSummary,
    #[serde(rename = "approvedReviews")]
    pub approved_reviews: Vec<PublicReview>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn review() -> Review {
        Review {
            id: 1,
            school_id: 2,
            parent_id: 3,
            parent_name: "Fatima".into(),
            parent_email: "fatima@example.ly".into(),
            student_number: "ST-77".into(),
            hygiene: Some(5),
            management: Some(4),
            education_quality: Some(5),
            parent_communication: Some(3),
            overall_rating: Some(4.3),
            comment: None,
            status: "approved".into(),
            rejection_reason: None,
            is_reported: false,
            report_reason: None,
            reported_at: None,
            report_status: None,
            moderation_cleared_by: None,
            moderation_cleared_at: None,
            reviewed_by: Some(9),
            reviewed_at: Some(Utc::now()),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn public_view_hides_student_number_and_email() {
        let json = serde_json::to_value(PublicReview::from(&review())).unwrap();
        assert!(json.get("student_number").is_none());
        assert!(json.get("parent_email").is_none());
        assert_eq!(json["overall_rating"], 4.3);
    }

    #[test]
    fn parent_view_hides_student_number() {
        let json = serde_json::to_value(ParentReview::new(&review(), None)).unwrap();
        assert!(json.get("student_number").is_none());
        assert_eq!(json["status"], "approved");
    }

    #[test]
    fn staff_view_shows_student_number() {
        let json = serde_json::to_value(StaffReview::new(&review(), None)).unwrap();
        assert_eq!(json["student_number"], "ST-77");
        assert_eq!(json["parent_email"], "fatima@example.ly");
    }
}
