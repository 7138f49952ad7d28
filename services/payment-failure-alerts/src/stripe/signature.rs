use hmac::{Hmac, Mac};
use sha2::Sha256;
use thiserror::Error;

use super::StripeEvent;

type HmacSha256 = Hmac<Sha256>;

const SIGNATURE_SCHEME: &str = "v1";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("Webhook secret is not configured")]
    MissingSecret,
    #[error("No stripe-signature header value was provided")]
    MissingHeader,
    #[error("Unable to extract timestamp and signatures from header")]
    MalformedHeader,
    #[error("No signatures found matching the expected signature for payload")]
    NoMatchingSignature,
    #[error("Timestamp outside the tolerance zone ({0})")]
    TimestampOutsideTolerance(i64),
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Checks the `stripe-signature` header against the raw request body.
///
/// The header carries `t=<unix ts>` and one or more `v1=<hex>` entries; the
/// expected signature is HMAC-SHA256 over `"<t>.<body>"` keyed by the endpoint
/// secret. Any matching `v1` entry is accepted.
#[derive(Clone, Debug)]
pub struct WebhookVerifier {
    secret: Option<String>,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: Option<String>, tolerance_secs: i64) -> Self {
        Self {
            secret,
            tolerance_secs,
        }
    }

    pub fn construct_event(
        &self,
        payload: &[u8],
        header: Option<&str>,
    ) -> Result<StripeEvent, SignatureError> {
        self.construct_event_at(payload, header, chrono::Utc::now().timestamp())
    }

    pub fn construct_event_at(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: i64,
    ) -> Result<StripeEvent, SignatureError> {
        self.verify_at(payload, header, now)?;
        serde_json::from_slice(payload).map_err(|e| SignatureError::InvalidPayload(e.to_string()))
    }

    pub fn verify_at(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: i64,
    ) -> Result<(), SignatureError> {
        let secret = self.secret.as_deref().ok_or(SignatureError::MissingSecret)?;
        let header = header
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or(SignatureError::MissingHeader)?;

        let (raw_timestamp, timestamp, signatures) = parse_header(header)?;

        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| SignatureError::MissingSecret)?;
        mac.update(raw_timestamp.as_bytes());
        mac.update(b".");
        mac.update(payload);

        let matched = signatures.iter().any(|candidate| {
            hex::decode(candidate)
                .map(|bytes| mac.clone().verify_slice(&bytes).is_ok())
                .unwrap_or(false)
        });
        if !matched {
            return Err(SignatureError::NoMatchingSignature);
        }

        if self.tolerance_secs > 0 && timestamp < now - self.tolerance_secs {
            return Err(SignatureError::TimestampOutsideTolerance(timestamp));
        }

        Ok(())
    }
}

fn parse_header(header: &str) -> Result<(&str, i64, Vec<&str>), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();

    for item in header.split(',') {
        let Some((key, value)) = item.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse::<i64>().ok().map(|ts| (value, ts)),
            SIGNATURE_SCHEME => signatures.push(value),
            _ => {}
        }
    }

    match timestamp {
        Some((raw, ts)) if !signatures.is_empty() => Ok((raw, ts, signatures)),
        Some(_) => Err(SignatureError::NoMatchingSignature),
        None => Err(SignatureError::MalformedHeader),
    }
}

/// Produces a header value the verifier accepts. Used by tests and local tooling.
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(payload);
    format!(
        "t={},{}={}",
        timestamp,
        SIGNATURE_SCHEME,
        hex::encode(mac.finalize().into_bytes())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test123secret456";
    const NOW: i64 = 1_700_000_000;
    const PAYLOAD: &[u8] = br#"{"id":"evt_1","type":"charge.failed","data":{"object":{}}}"#;

    fn verifier() -> WebhookVerifier {
        WebhookVerifier::new(Some(SECRET.to_string()), 300)
    }

    #[test]
    fn accepts_valid_signature() {
        let header = sign_payload(PAYLOAD, SECRET, NOW);
        let event = verifier()
            .construct_event_at(PAYLOAD, Some(&header), NOW + 10)
            .unwrap();
        assert_eq!(event.event_type, "charge.failed");
        assert_eq!(event.id, "evt_1");
    }

    #[test]
    fn accepts_any_matching_v1_entry() {
        let good = sign_payload(PAYLOAD, SECRET, NOW);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1=deadbeef,v0=ignored,v1={}", NOW, good_sig);
        assert!(verifier().verify_at(PAYLOAD, Some(&header), NOW).is_ok());
    }

    #[test]
    fn rejects_wrong_secret_and_modified_payload() {
        let header = sign_payload(PAYLOAD, "wrong_secret", NOW);
        assert_eq!(
            verifier().verify_at(PAYLOAD, Some(&header), NOW),
            Err(SignatureError::NoMatchingSignature)
        );

        let header = sign_payload(PAYLOAD, SECRET, NOW);
        assert_eq!(
            verifier().verify_at(b"{\"tampered\":true}", Some(&header), NOW),
            Err(SignatureError::NoMatchingSignature)
        );
    }

    #[test]
    fn rejects_stale_timestamp() {
        let header = sign_payload(PAYLOAD, SECRET, NOW - 600);
        assert_eq!(
            verifier().verify_at(PAYLOAD, Some(&header), NOW),
            Err(SignatureError::TimestampOutsideTolerance(NOW - 600))
        );
    }

    #[test]
    fn rejects_missing_or_malformed_header() {
        let v = verifier();
        assert_eq!(v.verify_at(PAYLOAD, None, NOW), Err(SignatureError::MissingHeader));
        assert_eq!(v.verify_at(PAYLOAD, Some(""), NOW), Err(SignatureError::MissingHeader));
        assert_eq!(
            v.verify_at(PAYLOAD, Some("garbage"), NOW),
            Err(SignatureError::MalformedHeader)
        );
        assert_eq!(
            v.verify_at(PAYLOAD, Some("v1=abc"), NOW),
            Err(SignatureError::MalformedHeader)
        );
        assert_eq!(
            v.verify_at(PAYLOAD, Some("t=123"), NOW),
            Err(SignatureError::NoMatchingSignature)
        );
    }

    #[test]
    fn rejects_when_secret_missing() {
        let header = sign_payload(PAYLOAD, SECRET, NOW);
        let v = WebhookVerifier::new(None, 300);
        assert_eq!(
            v.verify_at(PAYLOAD, Some(&header), NOW),
            Err(SignatureError::MissingSecret)
        );
    }

    #[test]
    fn signed_garbage_is_invalid_payload() {
        let body = b"not json";
        let header = sign_payload(body, SECRET, NOW);
        let err = verifier()
            .construct_event_at(body, Some(&header), NOW)
            .unwrap_err();
        assert!(matches!(err, SignatureError::InvalidPayload(_)));
    }
}
