use axum::async_trait;
use serde_json::Value;
use time::OffsetDateTime;
use tracing::{debug, warn};

use crate::error::ApiError;

/// Claims extracted from a verified external identity assertion.
#[derive(Debug, Clone)]
pub struct VerifiedIdentity {
    pub email: String,
    pub name: Option<String>,
    pub subject: String,
    pub picture: Option<String>,
    pub email_verified: bool,
}

/// External identity provider boundary. The production implementation asks
/// Google; tests substitute a canned verifier.
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity, ApiError>;
}

/// Verifies Google ID tokens against the tokeninfo endpoint.
/// Docs: https://developers.google.com/identity/sign-in/web/backend-auth
pub struct GoogleVerifier {
    http: reqwest::Client,
    client_id: String,
}

impl GoogleVerifier {
    pub fn new(http: reqwest::Client, client_id: String) -> Self {
        Self { http, client_id }
    }
}

#[async_trait]
impl IdentityVerifier for GoogleVerifier {
    async fn verify(&self, id_token: &str) -> Result<VerifiedIdentity, ApiError> {
        let url = format!(
            "https://oauth2.googleapis.com/tokeninfo?id_token={}",
            id_token
        );

        let resp = self.http.get(&url).send().await.map_err(|e| {
            ApiError::Provider(format!("google tokeninfo request failed: {}", e))
        })?;

        let status = resp.status();
        debug!(http_status = %status, "google tokeninfo response");
        if !status.is_success() {
            warn!(http_status = %status, "google rejected id token");
            return Err(ApiError::Unauthorized("Invalid Google token".into()));
        }

        let body: Value = resp.json().await.map_err(|_| {
            ApiError::Unauthorized("Invalid Google token".into())
        })?;

        identity_from_tokeninfo(
            &body,
            &self.client_id,
            OffsetDateTime::now_utc().unix_timestamp(),
        )
    }
}

/// Validates the tokeninfo payload: required fields, audience, expiry.
/// The tokeninfo endpoint returns every value as a string.
fn identity_from_tokeninfo(
    body: &Value,
    expected_aud: &str,
    now: i64,
) -> Result<VerifiedIdentity, ApiError> {
    let email = body
        .get("email")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError::Unauthorized("Invalid Google token".into()))?;
    let subject = body
        .get("sub")
        .and_then(|v| v.as_str())
        .ok_or_else(|| ApiError::Unauthorized("Invalid Google token".into()))?;

    match body.get("aud").and_then(|v| v.as_str()) {
        Some(aud) if aud == expected_aud => {}
        Some(aud) => {
            warn!(token_audience = %aud, "google token audience mismatch");
            return Err(ApiError::Unauthorized("Invalid Google token".into()));
        }
        None => return Err(ApiError::Unauthorized("Invalid Google token".into())),
    }

    let exp = body
        .get("exp")
        .and_then(as_i64_lenient)
        .ok_or_else(|| ApiError::Unauthorized("Invalid Google token".into()))?;
    if exp < now {
        warn!(token_exp = exp, "google token expired");
        return Err(ApiError::Unauthorized("Invalid Google token".into()));
    }

    let email_verified = body
        .get("email_verified")
        .map(|v| v.as_bool().unwrap_or(v.as_str() == Some("true")))
        .unwrap_or(false);

    Ok(VerifiedIdentity {
        email: email.trim().to_lowercase(),
        name: body.get("name").and_then(|v| v.as_str()).map(str::to_string),
        subject: subject.to_string(),
        picture: body
            .get("picture")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        email_verified,
    })
}

fn as_i64_lenient(v: &Value) -> Option<i64> {
    v.as_i64().or_else(|| v.as_str()?.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const AUD: &str = "client-123";

    fn payload() -> Value {
        json!({
            "email": "Person@Example.COM",
            "sub": "google-sub-1",
            "aud": AUD,
            "exp": "9999999999",
            "email_verified": "true",
            "name": "Person",
            "picture": "https://lh3.example/p.png"
        })
    }

    #[test]
    fn accepts_valid_payload_and_normalizes_email() {
        let id = identity_from_tokeninfo(&payload(), AUD, 1_000).expect("valid");
        assert_eq!(id.email, "person@example.com");
        assert_eq!(id.subject, "google-sub-1");
        assert!(id.email_verified);
    }

    #[test]
    fn rejects_audience_mismatch() {
        let err = identity_from_tokeninfo(&payload(), "other-client", 1_000).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn rejects_expired_token() {
        let mut body = payload();
        body["exp"] = json!("100");
        let err = identity_from_tokeninfo(&body, AUD, 1_000).unwrap_err();
        assert!(matches!(err, ApiError::Unauthorized(_)));
    }

    #[test]
    fn rejects_missing_subject() {
        let mut body = payload();
        body.as_object_mut().unwrap().remove("sub");
        assert!(identity_from_tokeninfo(&body, AUD, 1_000).is_err());
    }

    #[test]
    fn unverified_email_is_reported_not_rejected() {
        // The login handler decides what to do with an unverified email.
        let mut body = payload();
        body["email_verified"] = json!("false");
        let id = identity_from_tokeninfo(&body, AUD, 1_000).expect("still parses");
        assert!(!id.email_verified);
    }
}
