//! Webhook signature verification and event decoding.
//!
//! The provider signs the raw request body with HMAC-SHA256 over the string
//! `"{timestamp}.{payload}"` and sends `Stripe-Signature: t=<ts>,v1=<hex>`.
//! Verification happens against the raw bytes, before any JSON parsing.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use time::OffsetDateTime;

type HmacSha256 = Hmac<Sha256>;

/// Signatures older than this are replays as far as we are concerned.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, PartialEq, Eq)]
pub enum SignatureError {
    MalformedHeader,
    TimestampOutOfTolerance,
    NoMatchingSignature,
}

impl SignatureError {
    pub fn message(&self) -> &'static str {
        match self {
            SignatureError::MalformedHeader => "Malformed webhook signature header",
            SignatureError::TimestampOutOfTolerance => "Webhook timestamp outside tolerance",
            SignatureError::NoMatchingSignature => "Webhook signature mismatch",
        }
    }
}

/// Verifies a `Stripe-Signature` header against the raw payload.
pub fn verify_signature(
    secret: &str,
    header: &str,
    payload: &[u8],
    now: OffsetDateTime,
) -> Result<(), SignatureError> {
    let mut timestamp: Option<i64> = None;
    let mut candidates: Vec<Vec<u8>> = Vec::new();

    for part in header.split(',') {
        let Some((key, value)) = part.trim().split_once('=') else {
            continue;
        };
        match key {
            "t" => timestamp = value.parse().ok(),
            "v1" => {
                if let Some(sig) = decode_hex(value) {
                    candidates.push(sig);
                }
            }
            _ => {}
        }
    }

    let timestamp = timestamp.ok_or(SignatureError::MalformedHeader)?;
    if candidates.is_empty() {
        return Err(SignatureError::MalformedHeader);
    }
    if (now.unix_timestamp() - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::TimestampOutOfTolerance);
    }

    for candidate in &candidates {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
            .map_err(|_| SignatureError::MalformedHeader)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        if mac.verify_slice(candidate).is_ok() {
            return Ok(());
        }
    }
    Err(SignatureError::NoMatchingSignature)
}

fn decode_hex(s: &str) -> Option<Vec<u8>> {
    if !s.is_ascii() || s.len() % 2 != 0 {
        return None;
    }
    (0..s.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&s[i..i + 2], 16).ok())
        .collect()
}

/// The webhook events we act on. Everything else decodes to `Other` and is
/// acknowledged without side effects.
#[derive(Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    CheckoutCompleted { session_id: String },
    CheckoutExpired { session_id: String },
    PaymentFailed { payment_intent_id: String },
    Other,
}

#[derive(Debug, Deserialize)]
struct RawEvent {
    #[serde(rename = "type")]
    kind: String,
    data: RawEventData,
}

#[derive(Debug, Deserialize)]
struct RawEventData {
    object: serde_json::Value,
}

pub fn parse_event(payload: &[u8]) -> Result<WebhookEvent, String> {
    let event: RawEvent =
        serde_json::from_slice(payload).map_err(|e| format!("invalid event payload: {e}"))?;
    let object_id = event.data.object.get("id").and_then(|v| v.as_str());

    let event = match event.kind.as_str() {
        "checkout.session.completed" => WebhookEvent::CheckoutCompleted {
            session_id: object_id
                .ok_or_else(|| "event object has no id".to_string())?
                .to_string(),
        },
        "checkout.session.expired" => WebhookEvent::CheckoutExpired {
            session_id: object_id
                .ok_or_else(|| "event object has no id".to_string())?
                .to_string(),
        },
        "payment_intent.payment_failed" => WebhookEvent::PaymentFailed {
            payment_intent_id: object_id
                .ok_or_else(|| "event object has no id".to_string())?
                .to_string(),
        },
        _ => WebhookEvent::Other,
    };
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "whsec_test_secret";

    fn sign(secret: &str, timestamp: i64, payload: &[u8]) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        let sig: String = mac
            .finalize()
            .into_bytes()
            .iter()
            .map(|b| format!("{b:02x}"))
            .collect();
        format!("t={timestamp},v1={sig}")
    }

    #[test]
    fn valid_signature_passes() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let payload = br#"{"type":"checkout.session.completed"}"#;
        let header = sign(SECRET, now.unix_timestamp(), payload);
        assert_eq!(verify_signature(SECRET, &header, payload, now), Ok(()));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let payload = b"{}";
        let header = sign("whsec_other", now.unix_timestamp(), payload);
        assert_eq!(
            verify_signature(SECRET, &header, payload, now),
            Err(SignatureError::NoMatchingSignature)
        );
    }

    #[test]
    fn tampered_payload_is_rejected() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let header = sign(SECRET, now.unix_timestamp(), b"{\"amount\":100}");
        assert_eq!(
            verify_signature(SECRET, &header, b"{\"amount\":999}", now),
            Err(SignatureError::NoMatchingSignature)
        );
    }

    #[test]
    fn stale_timestamp_is_rejected() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let payload = b"{}";
        let header = sign(SECRET, now.unix_timestamp() - SIGNATURE_TOLERANCE_SECS - 1, payload);
        assert_eq!(
            verify_signature(SECRET, &header, payload, now),
            Err(SignatureError::TimestampOutOfTolerance)
        );
    }

    #[test]
    fn header_without_signature_is_malformed() {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        assert_eq!(
            verify_signature(SECRET, "t=1700000000", b"{}", now),
            Err(SignatureError::MalformedHeader)
        );
        assert_eq!(
            verify_signature(SECRET, "v1=abcd", b"{}", now),
            Err(SignatureError::MalformedHeader)
        );
    }

    #[test]
    fn second_v1_entry_is_accepted() {
        // Secret rotation sends two v1 signatures; any match passes.
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let payload = b"{}";
        let good = sign(SECRET, now.unix_timestamp(), payload);
        let good_sig = good.split("v1=").nth(1).unwrap();
        let header = format!("t={},v1={},v1={}", now.unix_timestamp(), "00ff", good_sig);
        assert_eq!(verify_signature(SECRET, &header, payload, now), Ok(()));
    }

    #[test]
    fn known_events_decode() {
        let completed = br#"{"type":"checkout.session.completed","data":{"object":{"id":"cs_123"}}}"#;
        assert_eq!(
            parse_event(completed).unwrap(),
            WebhookEvent::CheckoutCompleted {
                session_id: "cs_123".into()
            }
        );

        let expired = br#"{"type":"checkout.session.expired","data":{"object":{"id":"cs_456"}}}"#;
        assert_eq!(
            parse_event(expired).unwrap(),
            WebhookEvent::CheckoutExpired {
                session_id: "cs_456".into()
            }
        );

        let failed =
            br#"{"type":"payment_intent.payment_failed","data":{"object":{"id":"pi_789"}}}"#;
        assert_eq!(
            parse_event(failed).unwrap(),
            WebhookEvent::PaymentFailed {
                payment_intent_id: "pi_789".into()
            }
        );
    }

    #[test]
    fn unknown_events_decode_to_other() {
        let payload = br#"{"type":"invoice.paid","data":{"object":{"id":"in_1"}}}"#;
        assert_eq!(parse_event(payload).unwrap(), WebhookEvent::Other);
    }
}
