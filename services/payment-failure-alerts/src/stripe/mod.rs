//! Stripe plumbing: webhook envelopes, signature checks and customer lookup.
//!
//! Customer lookups go through the async-stripe SDK. Webhook envelopes stay raw
//! JSON, since the SDK's typed `Event` rejects payloads from API versions newer
//! than the one it was generated against; see [`signature`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod signature;

pub use signature::{sign_payload, SignatureError, WebhookVerifier};

/// Webhook event envelope as delivered to `/webhook`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StripeEvent {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: Option<i64>,
    pub data: EventData,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Customer {
    pub id: String,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Error)]
pub enum StripeError {
    #[error("Stripe secret key is not configured")]
    NotConfigured,
    #[error("Invalid customer id {0:?}")]
    InvalidCustomerId(String),
    #[error("Stripe customer lookup failed: {0}")]
    Lookup(String),
}

#[async_trait]
pub trait CustomerDirectory: Send + Sync {
    async fn retrieve_customer(&self, customer_id: &str) -> Result<Customer, StripeError>;
}

/// Customer lookups through the async-stripe SDK.
#[derive(Clone)]
pub struct StripeClient {
    client: Option<::stripe::Client>,
}

impl StripeClient {
    pub fn new(secret_key: Option<String>) -> Self {
        Self {
            client: secret_key.map(|key| ::stripe::Client::new(key)),
        }
    }
}

#[async_trait]
impl CustomerDirectory for StripeClient {
    async fn retrieve_customer(&self, customer_id: &str) -> Result<Customer, StripeError> {
        let client = self.client.as_ref().ok_or(StripeError::NotConfigured)?;
        let id = customer_id
            .parse::<::stripe::CustomerId>()
            .map_err(|_| StripeError::InvalidCustomerId(customer_id.to_string()))?;

        let customer = ::stripe::Customer::retrieve(client, &id, &[])
            .await
            .map_err(|e| StripeError::Lookup(e.to_string()))?;

        Ok(Customer {
            id: customer.id.to_string(),
            name: customer.name,
            email: customer.email,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_tolerates_missing_optional_fields() {
        let event: StripeEvent = serde_json::from_str(
            r#"{"type":"invoice.payment_failed","data":{"object":{"id":"in_1"}}}"#,
        )
        .unwrap();
        assert_eq!(event.id, "");
        assert_eq!(event.created, None);
        assert_eq!(event.data.object["id"], "in_1");
    }

    #[tokio::test]
    async fn lookup_without_key_is_not_configured() {
        let client = StripeClient::new(None);
        let err = client.retrieve_customer("cus_1").await.unwrap_err();
        assert!(matches!(err, StripeError::NotConfigured));
    }

    #[tokio::test]
    async fn malformed_customer_id_is_rejected_before_any_request() {
        let client = StripeClient::new(Some("sk_test_123".to_string()));
        let err = client.retrieve_customer("acct_not_a_customer").await.unwrap_err();
        assert!(matches!(err, StripeError::InvalidCustomerId(id) if id == "acct_not_a_customer"));
    }
}
