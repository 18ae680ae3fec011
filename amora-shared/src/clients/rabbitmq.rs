use std::future::Future;

use futures_lite::StreamExt;
use lapin::{
    options::*, types::FieldTable, BasicProperties, Channel, Connection, ConnectionProperties,
    Consumer,
};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::types::Event;

pub const EXCHANGE_NAME: &str = "amora.events";

/// Unacked deliveries a consumer may hold at once.
const PREFETCH: u16 = 16;

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("failed to serialize event: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("broker error: {0}")]
    Broker(#[from] lapin::Error),
}

/// Durable queue owned by `service` for one routing key, e.g.
/// `amora-discovery.auth.user.registered`.
pub fn queue_name(service: &str, routing_key: &str) -> String {
    let key = routing_key.strip_prefix("amora.").unwrap_or(routing_key);
    format!("{service}.{key}")
}

#[derive(Clone)]
pub struct RabbitMQClient {
    channel: Channel,
}

impl RabbitMQClient {
    pub async fn connect(url: &str) -> Result<Self, lapin::Error> {
        let conn = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;

        channel
            .exchange_declare(
                EXCHANGE_NAME,
                lapin::ExchangeKind::Topic,
                ExchangeDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await?;
        channel.basic_qos(PREFETCH, BasicQosOptions::default()).await?;

        tracing::info!(exchange = EXCHANGE_NAME, "connected to RabbitMQ");
        Ok(Self { channel })
    }

    /// Publish under the event's own `event_type` and wait for the broker confirm.
    pub async fn publish<T: Serialize>(&self, event: &Event<T>) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;
        let properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_message_id(event.id.to_string().into())
            .with_app_id(event.source.clone().into())
            .with_timestamp(event.timestamp.timestamp().max(0) as u64)
            .with_delivery_mode(2);

        self.channel
            .basic_publish(
                EXCHANGE_NAME,
                &event.event_type,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await?
            .await?;

        tracing::debug!(routing_key = %event.event_type, event_id = %event.id, "event published");
        Ok(())
    }

    /// Declare `service`'s durable queue for `routing_key`, bind it and start consuming.
    pub async fn subscribe(&self, service: &str, routing_key: &str) -> Result<Consumer, lapin::Error> {
        let queue = queue_name(service, routing_key);

        self.channel
            .queue_declare(
                &queue,
                QueueDeclareOptions { durable: true, ..Default::default() },
                FieldTable::default(),
            )
            .await?;
        self.channel
            .queue_bind(&queue, EXCHANGE_NAME, routing_key, QueueBindOptions::default(), FieldTable::default())
            .await?;

        let consumer = self
            .channel
            .basic_consume(&queue, &format!("{queue}-consumer"), BasicConsumeOptions::default(), FieldTable::default())
            .await?;

        tracing::info!(queue = %queue, routing_key, "subscribed to RabbitMQ queue");
        Ok(consumer)
    }

    pub fn is_connected(&self) -> bool {
        self.channel.status().connected()
    }
}

/// Drive `consumer` until the channel closes. Each delivery is decoded as
/// `Event<T>`, handed to `handler` and acked afterwards. Payloads that do not
/// decode are logged and acked so they never block the queue.
pub async fn consume<T, F, Fut>(mut consumer: Consumer, mut handler: F)
where
    T: Serialize + DeserializeOwned,
    F: FnMut(Event<T>) -> Fut,
    Fut: Future<Output = ()>,
{
    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                tracing::error!(error = %e, "consumer error");
                continue;
            }
        };

        match serde_json::from_slice::<Event<T>>(&delivery.data) {
            Ok(event) => handler(event).await,
            Err(e) => tracing::error!(
                error = %e,
                routing_key = %delivery.routing_key,
                "dropping undecodable event"
            ),
        }

        if let Err(e) = delivery.ack(BasicAckOptions::default()).await {
            tracing::warn!(error = %e, routing_key = %delivery.routing_key, "failed to ack delivery");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::event::routing_keys;

    #[test]
    fn queue_names_are_scoped_by_service() {
        assert_eq!(
            queue_name("amora-discovery", routing_keys::AUTH_USER_REGISTERED),
            "amora-discovery.auth.user.registered"
        );
        assert_eq!(
            queue_name("amora-messaging", routing_keys::DISCOVERY_MATCH_CREATED),
            "amora-messaging.discovery.match.created"
        );
        assert_eq!(queue_name("svc", "custom.key"), "svc.custom.key");
    }
}
