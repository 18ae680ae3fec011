//! Paystack adapter: hosted checkout, verify-by-reference and webhook
//! signatures.

use std::time::Duration;

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use sha2::Sha512;
use subtle::ConstantTimeEq;

pub const SIGNATURE_HEADER: &str = "x-paystack-signature";

type HmacSha512 = Hmac<Sha512>;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("gateway request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("gateway refused the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckoutRequest {
    pub email: String,
    pub amount: i64,
    pub currency: String,
    pub reference: String,
    pub callback_url: String,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CheckoutSession {
    pub authorization_url: String,
    pub access_code: String,
    pub reference: String,
}

/// The parts of a gateway transaction the activation decision depends on.
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayTransaction {
    pub reference: String,
    pub status: String,
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub paid_at: Option<DateTime<Utc>>,
}

#[axum::async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError>;
    async fn verify(&self, reference: &str) -> Result<GatewayTransaction, GatewayError>;
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    status: bool,
    message: String,
    data: Option<T>,
}

#[derive(Clone)]
pub struct PaystackClient {
    client: Client,
    base_url: String,
    secret_key: String,
}

impl PaystackClient {
    pub fn new(base_url: &str, secret_key: &str, timeout_secs: u64) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(Duration::from_secs(timeout_secs)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            secret_key: secret_key.to_string(),
        })
    }

    async fn read<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let envelope: Envelope<T> = response.json().await?;
        match (envelope.status, envelope.data) {
            (true, Some(data)) => Ok(data),
            _ => Err(GatewayError::Rejected(envelope.message)),
        }
    }
}

#[axum::async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize(&self, request: &CheckoutRequest) -> Result<CheckoutSession, GatewayError> {
        let response = self
            .client
            .post(format!("{}/transaction/initialize", self.base_url))
            .bearer_auth(&self.secret_key)
            .json(request)
            .send()
            .await?;

        let session = Self::read::<CheckoutSession>(response).await?;
        tracing::debug!(reference = %session.reference, "checkout initialized");
        Ok(session)
    }

    async fn verify(&self, reference: &str) -> Result<GatewayTransaction, GatewayError> {
        let response = self
            .client
            .get(format!("{}/transaction/verify/{reference}", self.base_url))
            .bearer_auth(&self.secret_key)
            .send()
            .await?;

        Self::read::<GatewayTransaction>(response).await
    }
}

/// `hex(HMAC-SHA512(body, secret))`, as Paystack signs webhook deliveries.
pub fn sign_webhook(secret: &str, body: &[u8]) -> String {
    // HMAC takes keys of any length, this cannot fail
    let mut mac = match HmacSha512::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant-time check of the signature header against the raw body.
pub fn verify_webhook_signature(secret: &str, body: &[u8], signature: &str) -> bool {
    let expected = sign_webhook(secret, body);
    !expected.is_empty() && expected.as_bytes().ct_eq(signature.trim().to_ascii_lowercase().as_bytes()).into()
}
