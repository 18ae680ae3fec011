use uuid::Uuid;

use amora_shared::clients::rabbitmq::RabbitMQClient;
use amora_shared::types::event::{payloads, routing_keys, Event};

use crate::models::Message;
use crate::services::message_service;

pub async fn publish_message_sent(rabbitmq: &RabbitMQClient, message: &Message, recipient_id: Uuid) {
    let event = Event::new(
        "amora-messaging",
        routing_keys::MESSAGING_MESSAGE_SENT,
        payloads::MessageSent {
            message_id: message.id,
            match_id: message.match_id,
            sender_id: message.sender_id,
            recipient_id,
            content_preview: message_service::preview(&message.content),
        },
    )
    .with_user(message.sender_id);

    if let Err(e) = rabbitmq.publish(&event).await {
        tracing::error!(error = %e, message_id = %message.id, "failed to publish message.sent event");
    }
}
