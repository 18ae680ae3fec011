use uuid::Uuid;

use amora_shared::clients::rabbitmq::RabbitMQClient;
use amora_shared::types::event::{payloads, routing_keys, Event};

pub async fn publish_profile_suspended(rabbitmq: &RabbitMQClient, user_id: Uuid, reason: &str, admin_id: Uuid) {
    let event = Event::new(
        "amora-moderation",
        routing_keys::MODERATION_PROFILE_SUSPENDED,
        payloads::ProfileSuspended {
            user_id,
            reason: reason.to_string(),
            admin_id,
        },
    )
    .with_user(user_id);

    if let Err(e) = rabbitmq.publish(&event).await {
        tracing::error!(error = %e, user_id = %user_id, "failed to publish profile.suspended event");
    }
}

pub async fn publish_profile_reinstated(rabbitmq: &RabbitMQClient, user_id: Uuid, admin_id: Uuid) {
    let event = Event::new(
        "amora-moderation",
        routing_keys::MODERATION_PROFILE_REINSTATED,
        payloads::ProfileReinstated { user_id, admin_id },
    )
    .with_user(user_id);

    if let Err(e) = rabbitmq.publish(&event).await {
        tracing::error!(error = %e, user_id = %user_id, "failed to publish profile.reinstated event");
    }
}
