use std::sync::Arc;

use amora_shared::clients::db;
use amora_shared::clients::rabbitmq;
use amora_shared::types::event::{payloads, routing_keys, Event};

use crate::services::profile_service;
use crate::AppState;

/// Create the empty profile row for every new account.
pub async fn listen_user_registered(state: Arc<AppState>) -> anyhow::Result<()> {
    let consumer = state
        .rabbitmq
        .subscribe("amora-discovery", routing_keys::AUTH_USER_REGISTERED)
        .await?;

    rabbitmq::consume(consumer, |event: Event<payloads::UserRegistered>| {
        let state = state.clone();
        async move {
            let user_id = event.data.user_id;
            let created = db::conn(&state.db).and_then(|mut conn| profile_service::ensure_profile(&mut conn, user_id));
            match created {
                Ok(_) => tracing::info!(user_id = %user_id, "default profile ensured"),
                Err(e) => tracing::error!(error = %e, user_id = %user_id, "failed to create default profile"),
            }
        }
    })
    .await;

    Ok(())
}
