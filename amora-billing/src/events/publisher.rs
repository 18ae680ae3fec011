use amora_shared::clients::rabbitmq::RabbitMQClient;
use amora_shared::types::event::{payloads, routing_keys, Event};

use crate::services::billing_service::VerificationOutcome;

/// No-op unless this outcome is the one that activated the subscription.
pub async fn publish_subscription_activated(rabbitmq: &RabbitMQClient, outcome: &VerificationOutcome) {
    let (true, Some(tier), Some(period_end)) = (outcome.newly_activated, outcome.tier, outcome.period_end) else {
        return;
    };

    let event = Event::new(
        "amora-billing",
        routing_keys::BILLING_SUBSCRIPTION_ACTIVATED,
        payloads::SubscriptionActivated {
            user_id: outcome.user_id,
            tier: tier.as_str().to_string(),
            reference: outcome.reference.clone(),
            period_end,
        },
    )
    .with_user(outcome.user_id);

    if let Err(e) = rabbitmq.publish(&event).await {
        tracing::error!(error = %e, reference = %outcome.reference, "failed to publish subscription.activated event");
    }
}
