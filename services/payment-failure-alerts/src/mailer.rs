use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;

use crate::config::GmailCredentials;

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SEND_URL: &str = "https://gmail.googleapis.com/gmail/v1/users/me/messages/send";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Gmail credentials are not configured")]
    NotConfigured,
    #[error("Mail request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("OAuth token refresh failed ({status}): {body}")]
    TokenRefresh { status: u16, body: String },
    #[error("Gmail API error ({status}): {body}")]
    Api { status: u16, body: String },
}

/// Submits one RFC 5322 message. Implementations make a single attempt.
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, raw_message: &str) -> Result<(), MailError>;
}

#[derive(Clone)]
pub struct GmailMailer {
    pub credentials: Option<GmailCredentials>,
    pub token_url: String,
    pub send_url: String,
    pub client: reqwest::Client,
}

impl GmailMailer {
    pub fn new(credentials: Option<GmailCredentials>) -> Self {
        Self {
            credentials,
            token_url: TOKEN_URL.to_string(),
            send_url: SEND_URL.to_string(),
            client: reqwest::Client::new(),
        }
    }

    async fn access_token(&self, creds: &GmailCredentials) -> Result<String, MailError> {
        #[derive(Deserialize)]
        struct TokenResponse {
            access_token: String,
        }

        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("client_id", creds.client_id.as_str()),
                ("client_secret", creds.client_secret.as_str()),
                ("refresh_token", creds.refresh_token.as_str()),
                ("grant_type", "refresh_token"),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MailError::TokenRefresh {
                status: status.as_u16(),
                body: truncated_body(response).await,
            });
        }

        Ok(response.json::<TokenResponse>().await?.access_token)
    }
}

#[async_trait]
impl Mailer for GmailMailer {
    async fn send(&self, raw_message: &str) -> Result<(), MailError> {
        let creds = self.credentials.as_ref().ok_or(MailError::NotConfigured)?;
        let token = self.access_token(creds).await?;

        let response = self
            .client
            .post(&self.send_url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "raw": encode_raw(raw_message) }))
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(MailError::Api {
                status: status.as_u16(),
                body: truncated_body(response).await,
            });
        }
        Ok(())
    }
}

/// Gmail expects the whole message as URL-safe base64.
pub fn encode_raw(raw_message: &str) -> String {
    URL_SAFE.encode(raw_message.as_bytes())
}

async fn truncated_body(response: reqwest::Response) -> String {
    response
        .text()
        .await
        .unwrap_or_default()
        .chars()
        .take(200)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_encoding_is_url_safe() {
        let encoded = encode_raw("Subject: ??>>\r\n\r\n~~~");
        assert!(!encoded.contains('+'));
        assert!(!encoded.contains('/'));
        let decoded = URL_SAFE.decode(encoded).unwrap();
        assert_eq!(decoded, b"Subject: ??>>\r\n\r\n~~~");
    }

    #[tokio::test]
    async fn missing_credentials_fail_without_network() {
        let err = GmailMailer::new(None).send("To: x\r\n\r\nhi").await.unwrap_err();
        assert!(matches!(err, MailError::NotConfigured));
    }
}
