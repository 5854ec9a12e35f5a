use madrasati_shared::clients::rabbitmq::RabbitMQClient;
use madrasati_shared::types::event::{payloads, routing_keys, Event};

use crate::lifecycle::{ReviewRecord, Transition};
use crate::models::School;

const SOURCE: &str = "madrasati-school";

/// Routing key announcing a lifecycle transition, if it has one.
pub fn review_routing_key(transition: Transition) -> Option<&'static str> {
    match transition {
        Transition::Submit => Some(routing_keys::REVIEW_SUBMITTED),
        Transition::VerifyApprove => Some(routing_keys::REVIEW_APPROVED),
        Transition::VerifyReject | Transition::ModerationReject => Some(routing_keys::REVIEW_REJECTED),
        Transition::Report => Some(routing_keys::REVIEW_REPORTED),
        Transition::Dismiss => Some(routing_keys::REVIEW_REPORT_DISMISSED),
        Transition::Delete => Some(routing_keys::REVIEW_DELETED),
        Transition::ModerationClear => None,
    }
}

pub async fn publish_review_transition(
    rabbitmq: &RabbitMQClient,
    transition: Transition,
    review: &ReviewRecord,
    actor_id: i64,
) {
    let Some(key) = review_routing_key(transition) else {
        return;
    };

    let reason = match transition {
        Transition::Report => review.report.as_ref().map(|r| r.reason.clone()),
        Transition::VerifyReject | Transition::ModerationReject => review.rejection_reason.clone(),
        _ => None,
    };

    let event = Event::new(
        SOURCE,
        key,
        payloads::ReviewTransitioned {
            review_id: review.id,
            school_id: review.school_id,
            parent_id: review.parent_id,
            status: review.status.as_str().to_string(),
            actor_id,
            reason,
        },
    )
    .with_user(actor_id);

    rabbitmq.publish_logged(&event).await;
}

pub async fn publish_admin_assigned(
    rabbitmq: &RabbitMQClient,
    school: &School,
    admin_user_id: i64,
    previous_admin_user_id: Option<i64>,
    actor_id: i64,
) {
    let event = Event::new(
        SOURCE,
        routing_keys::SCHOOL_ADMIN_ASSIGNED,
        payloads::SchoolAdminAssigned {
            school_id: school.id,
            school_name: school.name.clone(),
            admin_user_id,
            previous_admin_user_id,
        },
    )
    .with_user(actor_id);

    rabbitmq.publish_logged(&event).await;
}

pub async fn publish_admin_unassigned(
    rabbitmq: &RabbitMQClient,
    school_id: i64,
    admin_user_id: i64,
    actor_id: i64,
) {
    let event = Event::new(
        SOURCE,
        routing_keys::SCHOOL_ADMIN_UNASSIGNED,
        payloads::SchoolAdminUnassigned { school_id, admin_user_id },
    )
    .with_user(actor_id);

    rabbitmq.publish_logged(&event).await;
}

pub async fn publish_school_deleted(
    rabbitmq: &RabbitMQClient,
    school_id: i64,
    admin_user_id: Option<i64>,
    actor_id: i64,
) {
    let event = Event::new(
        SOURCE,
        routing_keys::SCHOOL_DELETED,
        payloads::SchoolDeleted { school_id, admin_user_id },
    )
    .with_user(actor_id);

    rabbitmq.publish_logged(&event).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn both_rejections_share_a_routing_key() {
        assert_eq!(review_routing_key(Transition::VerifyReject), Some(routing_keys::REVIEW_REJECTED));
        assert_eq!(review_routing_key(Transition::ModerationReject), Some(routing_keys::REVIEW_REJECTED));
        assert_eq!(review_routing_key(Transition::ModerationClear), None);
    }
}
