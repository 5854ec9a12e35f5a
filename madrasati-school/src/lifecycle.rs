//! Review lifecycle.
//!
//! ```text
//! submit -> pending --verify_approve--> approved --report--> reported
//!              |                            ^                   |
//!              +--verify_reject--> rejected  +------dismiss------+
//!
//! delete (super admin) removes the review from any status.
//! ```
//!
//! Every operation here is pure: it checks the actor, the current status and
//! the input, then mutates an in-memory [`ReviewRecord`]. Persistence applies
//! the result with a compare-and-set on the status the record had before.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use madrasati_shared::errors::{AppError, ErrorCode, FieldErrors};
use madrasati_shared::types::auth::{AuthUser, UserRole};

use crate::rating::{self, MAX_RATING, MIN_RATING};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewStatus {
    Pending,
    Approved,
    Rejected,
    Reported,
}

impl ReviewStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Reported => "reported",
        }
    }

    /// Only approved reviews appear in public listings.
    pub fn is_public(&self) -> bool {
        matches!(self, Self::Approved)
    }
}

impl std::fmt::Display for ReviewStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReviewStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            "reported" => Ok(Self::Reported),
            _ => Err(format!("unknown review status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Open,
    Dismissed,
}

impl ReportStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Dismissed => "dismissed",
        }
    }
}

impl std::str::FromStr for ReportStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "open" => Ok(Self::Open),
            "dismissed" => Ok(Self::Dismissed),
            _ => Err(format!("unknown report status: {s}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Submit,
    VerifyApprove,
    VerifyReject,
    ModerationClear,
    ModerationReject,
    Report,
    Dismiss,
    Delete,
}

impl Transition {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Submit => "submit",
            Self::VerifyApprove => "verify_approve",
            Self::VerifyReject => "verify_reject",
            Self::ModerationClear => "moderation_clear",
            Self::ModerationReject => "moderation_reject",
            Self::Report => "report",
            Self::Dismiss => "dismiss",
            Self::Delete => "delete",
        }
    }
}

impl std::fmt::Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("{0}")]
    Forbidden(&'static str),

    #[error("review belongs to another school")]
    NotSchoolOwner,

    #[error("cannot {transition} a review that is {status}")]
    StateConflict {
        transition: Transition,
        status: ReviewStatus,
    },

    #[error("the given data was invalid")]
    Invalid(FieldErrors),
}

impl LifecycleError {
    fn field(field: &str, message: impl Into<String>) -> Self {
        let mut errors = FieldErrors::new();
        errors.add(field, message);
        Self::Invalid(errors)
    }

    /// Field errors, when this is a validation failure.
    pub fn invalid_fields(&self) -> Option<&FieldErrors> {
        match self {
            Self::Invalid(errors) => Some(errors),
            _ => None,
        }
    }
}

impl From<LifecycleError> for AppError {
    fn from(err: LifecycleError) -> Self {
        match err {
            LifecycleError::Forbidden(message) => AppError::new(ErrorCode::Forbidden, message),
            LifecycleError::NotSchoolOwner => {
                AppError::new(ErrorCode::NotSchoolOwner, "review belongs to another school")
            }
            LifecycleError::StateConflict { transition, status } => AppError::new(
                ErrorCode::ReviewStateConflict,
                format!("cannot {transition} a review that is {status}"),
            ),
            LifecycleError::Invalid(errors) => errors.into(),
        }
    }
}

/// Who is acting, with the school they administer when they are a school admin.
#[derive(Debug, Clone, Copy)]
pub struct Actor {
    pub user_id: i64,
    pub role: UserRole,
    pub school_id: Option<i64>,
}

impl Actor {
    pub fn new(user: &AuthUser, school_id: Option<i64>) -> Self {
        Self { user_id: user.id, role: user.role, school_id }
    }

    fn require(&self, allowed: &[UserRole], message: &'static str) -> Result<(), LifecycleError> {
        if allowed.contains(&self.role) {
            Ok(())
        } else {
            Err(LifecycleError::Forbidden(message))
        }
    }
}

/// The four sub-ratings. Stored rows may predate the completeness rule,
/// so each one is optional here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubRatings {
    pub hygiene: Option<i16>,
    pub management: Option<i16>,
    pub education_quality: Option<i16>,
    pub parent_communication: Option<i16>,
}

impl SubRatings {
    pub fn new(hygiene: i16, management: i16, education_quality: i16, parent_communication: i16) -> Self {
        Self {
            hygiene: Some(hygiene),
            management: Some(management),
            education_quality: Some(education_quality),
            parent_communication: Some(parent_communication),
        }
    }

    fn fields(&self) -> [(&'static str, Option<i16>); 4] {
        [
            ("hygiene", self.hygiene),
            ("management", self.management),
            ("education_quality", self.education_quality),
            ("parent_communication", self.parent_communication),
        ]
    }

    pub fn check(&self) -> FieldErrors {
        let mut errors = FieldErrors::new();
        for (field, value) in self.fields() {
            match value {
                None => errors.add(field, format!("{field} rating is required")),
                Some(v) if !(MIN_RATING..=MAX_RATING).contains(&v) => errors.add(
                    field,
                    format!("{field} rating must be between {MIN_RATING} and {MAX_RATING}"),
                ),
                Some(_) => {}
            }
        }
        errors
    }

    /// All four values, when present and in range.
    pub fn complete(&self) -> Option<[i16; 4]> {
        let [h, m, e, p] = self.fields().map(|(_, v)| v);
        let all = [h?, m?, e?, p?];
        all.iter()
            .all(|v| (MIN_RATING..=MAX_RATING).contains(v))
            .then_some(all)
    }
}

/// Body of a review submission.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewDraft {
    #[serde(default)]
    pub student_number: String,
    #[serde(flatten)]
    pub ratings: SubRatings,
    pub comment: Option<String>,
}

/// A validated submission, ready to insert as a pending review.
#[derive(Debug, Clone)]
pub struct Submission {
    pub school_id: i64,
    pub parent_id: i64,
    pub student_number: String,
    pub ratings: [i16; 4],
    pub overall_rating: f64,
    pub comment: Option<String>,
}

/// Report flag carried by a reported review.
#[derive(Debug, Clone, PartialEq)]
pub struct ReportFlag {
    pub reason: String,
    pub reported_at: DateTime<Utc>,
    pub status: ReportStatus,
}

/// The lifecycle-relevant state of one review.
#[derive(Debug, Clone)]
pub struct ReviewRecord {
    pub id: i64,
    pub school_id: i64,
    pub parent_id: i64,
    pub student_number: String,
    pub ratings: SubRatings,
    pub overall_rating: Option<f64>,
    pub comment: Option<String>,
    pub status: ReviewStatus,
    pub rejection_reason: Option<String>,
    pub report: Option<ReportFlag>,
    pub moderation_cleared_by: Option<i64>,
    pub moderation_cleared_at: Option<DateTime<Utc>>,
    pub reviewed_by: Option<i64>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// What a successful transition did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    pub transition: Transition,
    pub from: ReviewStatus,
    /// `None` when the review was deleted.
    pub to: Option<ReviewStatus>,
}

/// Validates a parent's submission against one school.
pub fn submit(actor: &Actor, school_id: i64, draft: ReviewDraft) -> Result<Submission, LifecycleError> {
    actor.require(&[UserRole::Parent], "only parents can submit reviews")?;

    let mut errors = draft.ratings.check();
    let student_number = draft.student_number.trim().to_string();
    if student_number.is_empty() {
        errors.add("student_number", "student number is required");
    }

    let ratings = match draft.ratings.complete() {
        Some(ratings) if errors.is_empty() => ratings,
        _ => return Err(LifecycleError::Invalid(errors)),
    };

    Ok(Submission {
        school_id,
        parent_id: actor.user_id,
        student_number,
        ratings,
        overall_rating: rating::overall(ratings),
        comment: draft.comment.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
    })
}

fn required_reason(reason: Option<&str>, field: &str, label: &str) -> Result<String, LifecycleError> {
    match reason.map(str::trim).filter(|r| !r.is_empty()) {
        Some(reason) => Ok(reason.to_string()),
        None => Err(LifecycleError::field(field, format!("{label} is required"))),
    }
}

impl Submission {
    /// The record as stored right after insertion.
    pub fn into_record(self, id: i64, created_at: DateTime<Utc>) -> ReviewRecord {
        let [h, m, e, p] = self.ratings;
        ReviewRecord {
            id,
            school_id: self.school_id,
            parent_id: self.parent_id,
            student_number: self.student_number,
            ratings: SubRatings::new(h, m, e, p),
            overall_rating: Some(self.overall_rating),
            comment: self.comment,
            status: ReviewStatus::Pending,
            rejection_reason: None,
            report: None,
            moderation_cleared_by: None,
            moderation_cleared_at: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at,
        }
    }
}

impl ReviewRecord {
    pub fn is_reported(&self) -> bool {
        self.report.is_some()
    }

    pub fn is_public(&self) -> bool {
        self.status.is_public()
    }

    fn expect_status(&self, transition: Transition, expected: ReviewStatus) -> Result<(), LifecycleError> {
        if self.status == expected {
            Ok(())
        } else {
            Err(LifecycleError::StateConflict { transition, status: self.status })
        }
    }

    fn require_owner(&self, actor: &Actor) -> Result<(), LifecycleError> {
        actor.require(&[UserRole::SchoolAdmin], "only the school's admin can verify reviews")?;
        if actor.school_id == Some(self.school_id) {
            Ok(())
        } else {
            Err(LifecycleError::NotSchoolOwner)
        }
    }

    fn finish(&self, transition: Transition, from: ReviewStatus) -> Applied {
        Applied { transition, from, to: Some(self.status) }
    }

    /// School admin confirms the student belongs to their school.
    pub fn verify_approve(&mut self, actor: &Actor) -> Result<Applied, LifecycleError> {
        let transition = Transition::VerifyApprove;
        self.require_owner(actor)?;
        self.expect_status(transition, ReviewStatus::Pending)?;

        let ratings = self.ratings.check();
        if !ratings.is_empty() {
            return Err(LifecycleError::Invalid(ratings));
        }

        let from = self.status;
        self.status = ReviewStatus::Approved;
        self.reviewed_by = Some(actor.user_id);
        self.reviewed_at = Some(Utc::now());
        Ok(self.finish(transition, from))
    }

    pub fn verify_reject(&mut self, actor: &Actor, reason: Option<&str>) -> Result<Applied, LifecycleError> {
        let transition = Transition::VerifyReject;
        self.require_owner(actor)?;
        self.expect_status(transition, ReviewStatus::Pending)?;
        let reason = required_reason(reason, "rejection_reason", "rejection reason")?;

        let from = self.status;
        self.status = ReviewStatus::Rejected;
        self.rejection_reason = Some(reason);
        self.reviewed_by = Some(actor.user_id);
        self.reviewed_at = Some(Utc::now());
        Ok(self.finish(transition, from))
    }

    /// Super admin clears a pending review for the school's verification
    /// queue. The status stays pending.
    pub fn moderation_clear(&mut self, actor: &Actor) -> Result<Applied, LifecycleError> {
        let transition = Transition::ModerationClear;
        actor.require(&[UserRole::SuperAdmin], "super admin access required")?;
        self.expect_status(transition, ReviewStatus::Pending)?;
        if self.moderation_cleared_at.is_some() {
            return Err(LifecycleError::StateConflict { transition, status: self.status });
        }

        self.moderation_cleared_by = Some(actor.user_id);
        self.moderation_cleared_at = Some(Utc::now());
        Ok(self.finish(transition, ReviewStatus::Pending))
    }

    pub fn moderation_reject(&mut self, actor: &Actor, reason: Option<&str>) -> Result<Applied, LifecycleError> {
        let transition = Transition::ModerationReject;
        actor.require(&[UserRole::SuperAdmin], "super admin access required")?;
        self.expect_status(transition, ReviewStatus::Pending)?;
        let reason = required_reason(reason, "rejection_reason", "rejection reason")?;

        let from = self.status;
        self.status = ReviewStatus::Rejected;
        self.rejection_reason = Some(reason);
        self.reviewed_by = Some(actor.user_id);
        self.reviewed_at = Some(Utc::now());
        Ok(self.finish(transition, from))
    }

    /// Parents and school admins dispute a published review.
    pub fn report(&mut self, actor: &Actor, reason: Option<&str>) -> Result<Applied, LifecycleError> {
        let transition = Transition::Report;
        actor.require(
            &[UserRole::Parent, UserRole::SchoolAdmin],
            "only parents and school admins can report reviews",
        )?;
        self.expect_status(transition, ReviewStatus::Approved)?;
        let reason = required_reason(reason, "report_reason", "report reason")?;

        let from = self.status;
        self.status = ReviewStatus::Reported;
        self.report = Some(ReportFlag {
            reason,
            reported_at: Utc::now(),
            status: ReportStatus::Open,
        });
        Ok(self.finish(transition, from))
    }

    /// Keeps the review and clears the report flag.
    pub fn dismiss(&mut self, actor: &Actor) -> Result<Applied, LifecycleError> {
        let transition = Transition::Dismiss;
        actor.require(&[UserRole::SuperAdmin], "super admin access required")?;
        if !self.is_reported() {
            return Err(LifecycleError::StateConflict { transition, status: self.status });
        }
        self.expect_status(transition, ReviewStatus::Reported)?;

        let from = self.status;
        self.status = ReviewStatus::Approved;
        self.report = None;
        Ok(self.finish(transition, from))
    }

    /// Permission check for hard deletion; the caller removes the row.
    pub fn delete(&self, actor: &Actor) -> Result<Applied, LifecycleError> {
        actor.require(&[UserRole::SuperAdmin], "super admin access required")?;
        Ok(Applied { transition: Transition::Delete, from: self.status, to: None })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn actor(role: UserRole, school_id: Option<i64>) -> Actor {
        Actor { user_id: 100, role, school_id }
    }

    fn pending() -> ReviewRecord {
        let draft = ReviewDraft {
            student_number: "ST-1".into(),
            ratings: SubRatings::new(5, 4, 5, 3),
            comment: Some("  great  ".into()),
        };
        submit(&actor(UserRole::Parent, None), 1, draft)
            .unwrap()
            .into_record(10, Utc::now())
    }

    #[test]
    fn submission_computes_overall_and_trims_comment() {
        let review = pending();
        assert_eq!(review.status, ReviewStatus::Pending);
        assert_eq!(review.overall_rating, Some(4.3));
        assert_eq!(review.comment.as_deref(), Some("great"));
        assert_eq!(review.parent_id, 100);
    }

    #[test]
    fn submission_requires_parent_role() {
        let err = submit(&actor(UserRole::SchoolAdmin, Some(1)), 1, ReviewDraft::default()).unwrap_err();
        assert!(matches!(err, LifecycleError::Forbidden(_)));
    }

    #[test]
    fn submission_reports_every_missing_field() {
        let draft = ReviewDraft {
            student_number: "  ".into(),
            ratings: SubRatings { hygiene: Some(6), management: Some(3), ..Default::default() },
            comment: None,
        };
        let err = submit(&actor(UserRole::Parent, None), 1, draft).unwrap_err();
        let fields = err.invalid_fields().unwrap();
        for field in ["student_number", "hygiene", "education_quality", "parent_communication"] {
            assert!(fields.contains(field), "missing {field}");
        }
        assert!(!fields.contains("management"));
    }

    #[test]
    fn draft_reads_flat_json() {
        let draft: ReviewDraft = serde_json::from_str(
            r#"{"student_number":"S1","hygiene":1,"management":2,"education_quality":3,"parent_communication":4}"#,
        )
        .unwrap();
        assert_eq!(draft.ratings, SubRatings::new(1, 2, 3, 4));
        assert!(draft.comment.is_none());
    }

    #[test]
    fn only_owning_admin_verifies() {
        let mut review = pending();

        let other = actor(UserRole::SchoolAdmin, Some(2));
        assert!(matches!(review.verify_approve(&other), Err(LifecycleError::NotSchoolOwner)));

        let unassigned = actor(UserRole::SchoolAdmin, None);
        assert!(matches!(review.verify_approve(&unassigned), Err(LifecycleError::NotSchoolOwner)));

        let parent = actor(UserRole::Parent, None);
        assert!(matches!(review.verify_approve(&parent), Err(LifecycleError::Forbidden(_))));

        let super_admin = actor(UserRole::SuperAdmin, None);
        assert!(matches!(review.verify_approve(&super_admin), Err(LifecycleError::Forbidden(_))));

        assert_eq!(review.status, ReviewStatus::Pending);
    }

    #[test]
    fn approve_twice_is_a_conflict() {
        let mut review = pending();
        let owner = actor(UserRole::SchoolAdmin, Some(1));
        let applied = review.verify_approve(&owner).unwrap();
        assert_eq!(applied.from, ReviewStatus::Pending);
        assert_eq!(applied.to, Some(ReviewStatus::Approved));
        assert_eq!(review.reviewed_by, Some(100));

        let err = review.verify_approve(&owner).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::StateConflict { transition: Transition::VerifyApprove, status: ReviewStatus::Approved }
        ));
    }

    #[test]
    fn whitespace_reason_is_rejected() {
        let mut review = pending();
        let owner = actor(UserRole::SchoolAdmin, Some(1));
        let err = review.verify_reject(&owner, Some("   ")).unwrap_err();
        assert!(err.invalid_fields().unwrap().contains("rejection_reason"));

        review.verify_reject(&owner, Some(" not our student ")).unwrap();
        assert_eq!(review.status, ReviewStatus::Rejected);
        assert_eq!(review.rejection_reason.as_deref(), Some("not our student"));
    }

    #[test]
    fn missing_reason_is_rejected() {
        let mut review = pending();
        let owner = actor(UserRole::SchoolAdmin, Some(1));
        let err = review.verify_reject(&owner, None).unwrap_err();
        assert!(err.invalid_fields().unwrap().contains("rejection_reason"));
        assert_eq!(review.status, ReviewStatus::Pending);
        assert!(review.rejection_reason.is_none());
    }

    #[test]
    fn review_without_every_rating_cannot_be_published() {
        let mut review = pending();
        review.ratings.parent_communication = None;
        let owner = actor(UserRole::SchoolAdmin, Some(1));

        let err = review.verify_approve(&owner).unwrap_err();
        assert!(err.invalid_fields().unwrap().contains("parent_communication"));
        assert_eq!(review.status, ReviewStatus::Pending);

        // Rejection stays available for incomplete rows.
        review.verify_reject(&owner, Some("unknown student")).unwrap();
        assert_eq!(review.status, ReviewStatus::Rejected);
    }

    #[test]
    fn moderation_clear_keeps_pending_and_happens_once() {
        let mut review = pending();
        let admin = actor(UserRole::SuperAdmin, None);
        let applied = review.moderation_clear(&admin).unwrap();
        assert_eq!(applied.to, Some(ReviewStatus::Pending));
        assert!(review.moderation_cleared_at.is_some());

        assert!(matches!(review.moderation_clear(&admin), Err(LifecycleError::StateConflict { .. })));
    }

    #[test]
    fn moderation_reject_requires_super_admin_and_reason() {
        let mut review = pending();
        let owner = actor(UserRole::SchoolAdmin, Some(1));
        assert!(matches!(review.moderation_reject(&owner, Some("spam")), Err(LifecycleError::Forbidden(_))));

        let admin = actor(UserRole::SuperAdmin, None);
        assert!(review.moderation_reject(&admin, None).is_err());
        review.moderation_reject(&admin, Some("spam")).unwrap();
        assert_eq!(review.status, ReviewStatus::Rejected);
    }

    #[test]
    fn super_admin_cannot_report() {
        let mut review = pending();
        review.verify_approve(&actor(UserRole::SchoolAdmin, Some(1))).unwrap();
        let err = review.report(&actor(UserRole::SuperAdmin, None), Some("x")).unwrap_err();
        assert!(matches!(err, LifecycleError::Forbidden(_)));
    }

    #[test]
    fn dismiss_requires_an_open_report() {
        let mut review = pending();
        let admin = actor(UserRole::SuperAdmin, None);
        assert!(matches!(review.dismiss(&admin), Err(LifecycleError::StateConflict { .. })));
    }

    #[test]
    fn delete_is_allowed_from_any_status_for_super_admin_only() {
        let review = pending();
        assert!(review.delete(&actor(UserRole::Parent, None)).is_err());
        let applied = review.delete(&actor(UserRole::SuperAdmin, None)).unwrap();
        assert_eq!(applied.to, None);
    }

    #[test]
    fn errors_map_to_http_codes() {
        let conflict: AppError = LifecycleError::StateConflict {
            transition: Transition::Report,
            status: ReviewStatus::Pending,
        }
        .into();
        assert_eq!(conflict.error_code(), ErrorCode::ReviewStateConflict);

        let owner: AppError = LifecycleError::NotSchoolOwner.into();
        assert_eq!(owner.error_code(), ErrorCode::NotSchoolOwner);

        let invalid: AppError = LifecycleError::field("rejection_reason", "required").into();
        assert_eq!(invalid.error_code(), ErrorCode::ValidationError);
    }
}
