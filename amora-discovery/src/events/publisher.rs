use uuid::Uuid;

use amora_shared::clients::rabbitmq::RabbitMQClient;
use amora_shared::types::event::{payloads, routing_keys, Event};

use crate::services::swipe_service::MatchPair;

pub async fn publish_match_created(rabbitmq: &RabbitMQClient, match_id: Uuid, pair: MatchPair) {
    let event = Event::new(
        "amora-discovery",
        routing_keys::DISCOVERY_MATCH_CREATED,
        payloads::MatchCreated {
            match_id,
            user_a_id: pair.user_a,
            user_b_id: pair.user_b,
        },
    );

    if let Err(e) = rabbitmq.publish(&event).await {
        tracing::error!(error = %e, match_id = %match_id, "failed to publish match.created event");
    }
}
