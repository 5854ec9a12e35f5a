use madrasati_shared::clients::rabbitmq::RabbitMQClient;
use madrasati_shared::types::event::{payloads, routing_keys, Event};

use crate::models::User;

pub async fn publish_user_registered(rabbitmq: &RabbitMQClient, user: &User) {
    let event = Event::new(
        "madrasati-auth",
        routing_keys::AUTH_USER_REGISTERED,
        payloads::UserRegistered {
            user_id: user.id,
            email: user.email.clone(),
            role: user.role.clone(),
        },
    )
    .with_user(user.id);

    rabbitmq.publish_logged(&event).await;
}
