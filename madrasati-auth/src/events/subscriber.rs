use diesel::prelude::*;
use diesel::PgConnection;
use futures_lite::StreamExt;
use lapin::options::BasicAckOptions;
use std::sync::Arc;

use madrasati_shared::types::event::{payloads, routing_keys, Event};

use crate::schema::users;
use crate::AppState;

const QUEUE: &str = "madrasati-auth.school-admins";

/// School directory changes that affect a user's `admin_school` reference.
#[derive(Debug)]
pub enum SchoolAdminChange {
    Assigned(payloads::SchoolAdminAssigned),
    Unassigned(payloads::SchoolAdminUnassigned),
    SchoolDeleted(payloads::SchoolDeleted),
}

impl SchoolAdminChange {
    pub fn parse(routing_key: &str, body: &[u8]) -> anyhow::Result<Option<Self>> {
        let change = match routing_key {
            routing_keys::SCHOOL_ADMIN_ASSIGNED => {
                Self::Assigned(serde_json::from_slice::<Event<_>>(body)?.data)
            }
            routing_keys::SCHOOL_ADMIN_UNASSIGNED => {
                Self::Unassigned(serde_json::from_slice::<Event<_>>(body)?.data)
            }
            routing_keys::SCHOOL_DELETED => {
                Self::SchoolDeleted(serde_json::from_slice::<Event<_>>(body)?.data)
            }
            _ => return Ok(None),
        };
        Ok(Some(change))
    }

    pub fn apply(&self, conn: &mut PgConnection) -> QueryResult<()> {
        let none_id: Option<i64> = None;

        match self {
            Self::Assigned(data) => conn.transaction(|conn| {
                // Whoever held this school before loses it.
                diesel::update(users::table.filter(users::admin_school_id.eq(data.school_id)))
                    .set((users::admin_school_id.eq(none_id), users::admin_school_name.eq(None::<String>)))
                    .execute(conn)?;

                diesel::update(users::table.find(data.admin_user_id))
                    .set((
                        users::admin_school_id.eq(Some(data.school_id)),
                        users::admin_school_name.eq(Some(&data.school_name)),
                        users::updated_at.eq(chrono::Utc::now()),
                    ))
                    .execute(conn)?;
                Ok(())
            }),
            Self::Unassigned(data) => {
                diesel::update(
                    users::table
                        .filter(users::id.eq(data.admin_user_id))
                        .filter(users::admin_school_id.eq(data.school_id)),
                )
                .set((users::admin_school_id.eq(none_id), users::admin_school_name.eq(None::<String>)))
                .execute(conn)?;
                Ok(())
            }
            Self::SchoolDeleted(data) => {
                diesel::update(users::table.filter(users::admin_school_id.eq(data.school_id)))
                    .set((users::admin_school_id.eq(none_id), users::admin_school_name.eq(None::<String>)))
                    .execute(conn)?;
                Ok(())
            }
        }
    }
}

/// Keeps `users.admin_school_*` in step with the school directory.
pub async fn listen_school_admin_changes(state: Arc<AppState>) -> anyhow::Result<()> {
    let mut consumer = state
        .rabbitmq
        .subscribe(
            QUEUE,
            &[
                routing_keys::SCHOOL_ADMIN_ASSIGNED,
                routing_keys::SCHOOL_ADMIN_UNASSIGNED,
                routing_keys::SCHOOL_DELETED,
            ],
        )
        .await?;

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                tracing::error!(error = %e, "consumer error");
                continue;
            }
        };

        let routing_key = delivery.routing_key.as_str();
        match SchoolAdminChange::parse(routing_key, &delivery.data) {
            Ok(Some(change)) => {
                tracing::info!(routing_key = %routing_key, change = ?change, "applying school admin change");
                match state.db.get() {
                    Ok(mut conn) => {
                        if let Err(e) = change.apply(&mut conn) {
                            tracing::error!(error = %e, "failed to apply school admin change");
                        }
                    }
                    Err(e) => tracing::error!(error = %e, "failed to get db connection"),
                }
            }
            Ok(None) => tracing::debug!(routing_key = %routing_key, "ignoring unrelated event"),
            Err(e) => tracing::error!(error = %e, "failed to deserialize school admin event"),
        }

        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
            tracing::error!(error = %e, "failed to ack delivery");
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assignment_event() {
        let event = Event::new(
            "madrasati-school",
            routing_keys::SCHOOL_ADMIN_ASSIGNED,
            payloads::SchoolAdminAssigned {
                school_id: 3,
                school_name: "Sunrise Academy".into(),
                admin_user_id: 9,
                previous_admin_user_id: Some(4),
            },
        );
        let body = serde_json::to_vec(&event).unwrap();

        match SchoolAdminChange::parse(routing_keys::SCHOOL_ADMIN_ASSIGNED, &body).unwrap() {
            Some(SchoolAdminChange::Assigned(data)) => {
                assert_eq!(data.school_id, 3);
                assert_eq!(data.admin_user_id, 9);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unrelated_keys_are_ignored() {
        assert!(SchoolAdminChange::parse(routing_keys::REVIEW_APPROVED, b"{}").unwrap().is_none());
    }

    #[test]
    fn malformed_body_is_an_error() {
        assert!(SchoolAdminChange::parse(routing_keys::SCHOOL_DELETED, b"not json").is_err());
    }
}
