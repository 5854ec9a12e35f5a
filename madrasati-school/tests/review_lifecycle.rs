//! End-to-end review scenarios over an in-memory table of rows, using the
//! same record/changeset conversions the database layer uses.

use chrono::Utc;

use madrasati_school::lifecycle::{
    self, Actor, LifecycleError, ReviewDraft, ReviewRecord, ReviewStatus, SubRatings,
};
use madrasati_school::models::{NewReview, Review, ReviewChangeset};
use madrasati_school::rating;
use madrasati_school::slug;
use madrasati_school::views::PublicReview;
use madrasati_shared::errors::{AppError, ErrorCode};
use madrasati_shared::types::auth::UserRole;

const SCHOOL_ID: i64 = 1;

fn parent() -> Actor {
    Actor { user_id: 10, role: UserRole::Parent, school_id: None }
}

fn school_admin() -> Actor {
    Actor { user_id: 20, role: UserRole::SchoolAdmin, school_id: Some(SCHOOL_ID) }
}

fn super_admin() -> Actor {
    Actor { user_id: 30, role: UserRole::SuperAdmin, school_id: None }
}

/// Minimal stand-in for the reviews table.
#[derive(Default)]
struct Table {
    rows: Vec<Review>,
}

impl Table {
    fn insert(&mut self, new: NewReview) -> i64 {
        let id = self.rows.len() as i64 + 1;
        let now = Utc::now();
        self.rows.push(Review {
            id,
            school_id: new.school_id,
            parent_id: new.parent_id,
            parent_name: new.parent_name,
            parent_email: new.parent_email,
            student_number: new.student_number,
            hygiene: new.hygiene,
            management: new.management,
            education_quality: new.education_quality,
            parent_communication: new.parent_communication,
            overall_rating: new.overall_rating,
            comment: new.comment,
            status: new.status,
            rejection_reason: None,
            is_reported: false,
            report_reason: None,
            reported_at: None,
            report_status: None,
            moderation_cleared_by: None,
            moderation_cleared_at: None,
            reviewed_by: None,
            reviewed_at: None,
            created_at: now,
            updated_at: now,
        });
        id
    }

    fn get(&self, id: i64) -> Option<&Review> {
        self.rows.iter().find(|r| r.id == id)
    }

    fn record(&self, id: i64) -> ReviewRecord {
        self.get(id).expect("review exists").to_record()
    }

    /// Compare-and-set on the status, like the UPDATE ... WHERE status = ?.
    fn store(&mut self, expected: ReviewStatus, record: &ReviewRecord) -> bool {
        let Some(row) = self.rows.iter_mut().find(|r| r.id == record.id) else {
            return false;
        };
        if row.status != expected.as_str() {
            return false;
        }
        let changes = ReviewChangeset::from(record);
        row.status = changes.status;
        row.rejection_reason = changes.rejection_reason;
        row.is_reported = changes.is_reported;
        row.report_reason = changes.report_reason;
        row.reported_at = changes.reported_at;
        row.report_status = changes.report_status;
        row.moderation_cleared_by = changes.moderation_cleared_by;
        row.moderation_cleared_at = changes.moderation_cleared_at;
        row.reviewed_by = changes.reviewed_by;
        row.reviewed_at = changes.reviewed_at;
        row.updated_at = changes.updated_at;
        true
    }

    fn remove(&mut self, id: i64) {
        self.rows.retain(|r| r.id != id);
    }

    fn public_list(&self, school_id: i64) -> Vec<PublicReview> {
        self.rows
            .iter()
            .filter(|r| r.school_id == school_id && r.status().is_public())
            .map(PublicReview::from)
            .collect()
    }
}

fn submit(table: &mut Table, ratings: SubRatings, comment: Option<&str>) -> i64 {
    let draft = ReviewDraft {
        student_number: "ST-2024-17".into(),
        ratings,
        comment: comment.map(str::to_string),
    };
    let submission = lifecycle::submit(&parent(), SCHOOL_ID, draft).expect("valid submission");
    table.insert(NewReview::from_submission(submission, "Aisha Salem".into(), "aisha@example.ly".into()))
}

fn approve(table: &mut Table, id: i64) {
    let mut record = table.record(id);
    let before = record.status;
    record.verify_approve(&school_admin()).expect("approval allowed");
    assert!(table.store(before, &record));
}

#[test]
fn s1_minimum_ratings_are_published_after_approval() {
    assert_eq!(slug::slugify("Sunrise Academy"), "sunrise-academy");

    let mut table = Table::default();
    let id = submit(&mut table, SubRatings::new(1, 1, 1, 1), None);

    let stored = table.get(id).unwrap();
    assert_eq!(stored.status(), ReviewStatus::Pending);
    assert!(stored.comment.is_none());
    assert!(table.public_list(SCHOOL_ID).is_empty());

    approve(&mut table, id);

    let public = table.public_list(SCHOOL_ID);
    assert_eq!(public.len(), 1);
    assert_eq!(public[0].id, id);
    assert_eq!(public[0].overall_rating, Some(1.0));
}

#[test]
fn s2_reject_without_reason_names_the_field() {
    let mut table = Table::default();
    let id = submit(&mut table, SubRatings::new(3, 3, 3, 3), None);

    let mut record = table.record(id);
    let err = record.verify_reject(&school_admin(), None).unwrap_err();
    assert!(err.invalid_fields().unwrap().contains("rejection_reason"));

    let app: AppError = err.into();
    assert_eq!(app.error_code(), ErrorCode::ValidationError);
    assert_eq!(table.get(id).unwrap().status(), ReviewStatus::Pending);
}

#[test]
fn p1_approval_needs_every_sub_rating() {
    let mut table = Table::default();
    let id = submit(&mut table, SubRatings::new(4, 4, 4, 4), None);

    // A legacy row without one rating.
    table.rows[0].management = None;

    let mut record = table.record(id);
    let err = record.verify_approve(&school_admin()).unwrap_err();
    assert!(err.invalid_fields().unwrap().contains("management"));
    assert_eq!(record.status, ReviewStatus::Pending);
}

#[test]
fn p2_rejected_reviews_carry_a_reason() {
    let mut table = Table::default();
    let by_school = submit(&mut table, SubRatings::new(2, 2, 2, 2), None);
    let by_moderator = submit(&mut table, SubRatings::new(2, 2, 2, 2), None);

    let mut record = table.record(by_school);
    record.verify_reject(&school_admin(), Some("student not enrolled")).unwrap();
    assert!(table.store(ReviewStatus::Pending, &record));

    let mut record = table.record(by_moderator);
    record.moderation_reject(&super_admin(), Some("abusive language")).unwrap();
    assert!(table.store(ReviewStatus::Pending, &record));

    for row in &table.rows {
        assert_eq!(row.status(), ReviewStatus::Rejected);
        assert!(!row.rejection_reason.as_deref().unwrap_or_default().trim().is_empty());
    }
}

#[test]
fn p3_only_approved_reviews_can_be_reported() {
    let mut table = Table::default();
    let id = submit(&mut table, SubRatings::new(5, 5, 5, 5), None);

    let mut pending = table.record(id);
    assert!(matches!(
        pending.report(&parent(), Some("fake")),
        Err(LifecycleError::StateConflict { status: ReviewStatus::Pending, .. })
    ));

    approve(&mut table, id);

    let mut record = table.record(id);
    record.report(&school_admin(), Some("not a real parent")).unwrap();
    assert!(table.store(ReviewStatus::Approved, &record));
    assert!(table.public_list(SCHOOL_ID).is_empty());

    let mut again = table.record(id);
    assert!(matches!(
        again.report(&parent(), Some("also fake")),
        Err(LifecycleError::StateConflict { status: ReviewStatus::Reported, .. })
    ));
}

#[test]
fn p4_dismiss_republishes_and_delete_removes() {
    let mut table = Table::default();
    let kept = submit(&mut table, SubRatings::new(4, 3, 4, 3), Some("good teachers"));
    let removed = submit(&mut table, SubRatings::new(1, 2, 1, 2), None);

    for id in [kept, removed] {
        approve(&mut table, id);
        let mut record = table.record(id);
        record.report(&parent(), Some("disputed")).unwrap();
        assert!(table.store(ReviewStatus::Approved, &record));
    }

    let mut record = table.record(kept);
    record.dismiss(&super_admin()).unwrap();
    assert!(table.store(ReviewStatus::Reported, &record));

    let row = table.get(kept).unwrap();
    assert_eq!(row.status(), ReviewStatus::Approved);
    assert!(!row.is_reported);
    assert!(row.report_reason.is_none());
    assert!(row.report_status.is_none());

    let record = table.record(removed);
    record.delete(&super_admin()).unwrap();
    table.remove(removed);

    let public: Vec<i64> = table.public_list(SCHOOL_ID).iter().map(|r| r.id).collect();
    assert_eq!(public, vec![kept]);
    assert!(table.get(removed).is_none());
}

#[test]
fn p5_overall_rating_is_the_rounded_mean() {
    assert_eq!(rating::overall([5, 4, 5, 3]), 4.3);

    let mut table = Table::default();
    let id = submit(&mut table, SubRatings::new(5, 4, 5, 3), None);
    assert_eq!(table.get(id).unwrap().overall_rating, Some(4.3));
}

#[test]
fn racing_moderators_apply_once() {
    let mut table = Table::default();
    let id = submit(&mut table, SubRatings::new(3, 4, 3, 4), None);

    // Both moderators read the pending row before either writes.
    let mut first = table.record(id);
    let mut second = table.record(id);

    first.verify_approve(&school_admin()).unwrap();
    second.verify_reject(&school_admin(), Some("duplicate")).unwrap();

    assert!(table.store(ReviewStatus::Pending, &first));
    assert!(!table.store(ReviewStatus::Pending, &second));
    assert_eq!(table.get(id).unwrap().status(), ReviewStatus::Approved);
}
