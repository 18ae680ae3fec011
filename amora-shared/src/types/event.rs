use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// RabbitMQ event envelope wrapping all domain events.
///
/// Routing key format: `amora.{service}.{entity}.{action}`
/// Example: `amora.discovery.match.created`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event<T: Serialize> {
    pub id: Uuid,
    pub source: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub user_id: Option<Uuid>,
    pub data: T,
}

impl<T: Serialize> Event<T> {
    pub fn new(source: impl Into<String>, event_type: impl Into<String>, data: T) -> Self {
        Self {
            id: Uuid::now_v7(),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            user_id: None,
            data,
        }
    }

    pub fn with_user(mut self, user_id: Uuid) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

pub mod routing_keys {
    pub const AUTH_USER_REGISTERED: &str = "amora.auth.user.registered";

    pub const DISCOVERY_MATCH_CREATED: &str = "amora.discovery.match.created";

    pub const MESSAGING_MESSAGE_SENT: &str = "amora.messaging.message.sent";

    pub const BILLING_SUBSCRIPTION_ACTIVATED: &str = "amora.billing.subscription.activated";

    pub const MODERATION_PROFILE_SUSPENDED: &str = "amora.moderation.profile.suspended";
    pub const MODERATION_PROFILE_REINSTATED: &str = "amora.moderation.profile.reinstated";
}

pub mod payloads {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct UserRegistered {
        pub user_id: Uuid,
        pub email: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MatchCreated {
        pub match_id: Uuid,
        pub user_a_id: Uuid,
        pub user_b_id: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct MessageSent {
        pub message_id: Uuid,
        pub match_id: Uuid,
        pub sender_id: Uuid,
        pub recipient_id: Uuid,
        pub content_preview: String,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct SubscriptionActivated {
        pub user_id: Uuid,
        pub tier: String,
        pub reference: String,
        pub period_end: DateTime<Utc>,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ProfileSuspended {
        pub user_id: Uuid,
        pub reason: String,
        pub admin_id: Uuid,
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct ProfileReinstated {
        pub user_id: Uuid,
        pub admin_id: Uuid,
    }
}
