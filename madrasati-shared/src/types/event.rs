use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RabbitMQ Event envelope wrapping all domain events.
///
/// Routing key format: `madrasati.{service}.{entity}.{action}`
/// Example: `madrasati.school.review.approved`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T: Serialize> {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<Uuid>,
    pub user_id: Option<i64>,
    pub data: T,
}

impl<T: Serialize> Event<T> {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            correlation_id: None,
            user_id: None,
            data,
        }
    }

    /// The user whose action produced the event.
    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// RabbitMQ routing keys
pub mod routing_keys {
    // Auth events
    pub const AUTH_USER_REGISTERED: &str = "madrasati.auth.user.registered";

    // Review lifecycle events
    pub const REVIEW_SUBMITTED: &str = "madrasati.school.review.submitted";
    pub const REVIEW_APPROVED: &str = "madrasati.school.review.approved";
    pub const REVIEW_REJECTED: &str = "madrasati.school.review.rejected";
    pub const REVIEW_REPORTED: &str = "madrasati.school.review.reported";
    pub const REVIEW_REPORT_DISMISSED: &str = "madrasati.school.review.report_dismissed";
    pub const REVIEW_DELETED: &str = "madrasati.school.review.deleted";

    // School directory events
    pub const SCHOOL_ADMIN_ASSIGNED: &str = "madrasati.school.admin.assigned";
    pub const SCHOOL_ADMIN_UNASSIGNED: &str = "madrasati.school.admin.unassigned";
    pub const SCHOOL_DELETED: &str = "madrasati.school.school.deleted";
}

/// Event data payloads
pub mod payloads {
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct UserRegistered {
        pub user_id: i64,
        pub email: String,
        pub role: String,
    }

    /// Shared by every review lifecycle event; `reason` carries the
    /// rejection or report reason when the transition has one.
    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ReviewTransitioned {
        pub review_id: i64,
        pub school_id: i64,
        pub parent_id: i64,
        pub status: String,
        pub actor_id: i64,
        pub reason: Option<String>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SchoolAdminAssigned {
        pub school_id: i64,
        pub school_name: String,
        pub admin_user_id: i64,
        pub previous_admin_user_id: Option<i64>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SchoolAdminUnassigned {
        pub school_id: i64,
        pub admin_user_id: i64,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SchoolDeleted {
        pub school_id: i64,
        pub admin_user_id: Option<i64>,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_actor_and_type() {
        let event = Event::new(
            "madrasati-school",
            routing_keys::REVIEW_APPROVED,
            payloads::ReviewTransitioned {
                review_id: 1,
                school_id: 2,
                parent_id: 3,
                status: "approved".into(),
                actor_id: 4,
                reason: None,
            },
        )
        .with_user(4);

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "madrasati.school.review.approved");
        assert_eq!(json["user_id"], 4);
        assert_eq!(json["data"]["review_id"], 1);
        assert!(json["correlation_id"].is_null());
    }
}
