use std::sync::Arc;

use amora_shared::clients::rabbitmq;
use amora_shared::types::event::{payloads, routing_keys, Event};

use crate::AppState;

/// Push `new_match` to both users' rooms when discovery creates a match.
pub async fn listen_match_created(state: Arc<AppState>) -> anyhow::Result<()> {
    let consumer = state
        .rabbitmq
        .subscribe("amora-messaging", routing_keys::DISCOVERY_MATCH_CREATED)
        .await?;

    rabbitmq::consume(consumer, |event: Event<payloads::MatchCreated>| {
        let state = state.clone();
        async move {
            let data = &event.data;
            for (user_id, other_id) in [(data.user_a_id, data.user_b_id), (data.user_b_id, data.user_a_id)] {
                let payload = serde_json::json!({ "match_id": data.match_id, "user_id": other_id });
                if let Err(e) = state.io.to(format!("user:{user_id}")).emit("new_match", &payload) {
                    tracing::debug!(error = %e, user_id = %user_id, "new_match not delivered");
                }
            }
            tracing::info!(match_id = %data.match_id, "new_match pushed");
        }
    })
    .await;

    Ok(())
}
