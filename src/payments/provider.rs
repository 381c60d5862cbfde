use std::collections::HashMap;

use axum::async_trait;
use uuid::Uuid;

use crate::error::ApiError;

/// What a checkout session buys. Serialized into the provider's metadata
/// fields and echoed back unmodified on completion; this round-trip is the
/// only binding between a provider session and our domain entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckoutKind {
    /// One-time payment granting access to all current and future documents.
    Lifetime,
    /// Purchase of a single document.
    Document(Uuid),
}

impl CheckoutKind {
    pub fn document_id(&self) -> Option<Uuid> {
        match self {
            CheckoutKind::Lifetime => None,
            CheckoutKind::Document(id) => Some(*id),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            CheckoutKind::Lifetime => "lifetime",
            CheckoutKind::Document(_) => "document",
        }
    }
}

/// Metadata carried through the provider round-trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckoutMetadata {
    pub user_id: Uuid,
    pub kind: CheckoutKind,
}

impl CheckoutMetadata {
    pub fn to_fields(&self) -> Vec<(&'static str, String)> {
        let mut fields = vec![
            ("user_id", self.user_id.to_string()),
            ("kind", self.kind.tag().to_string()),
        ];
        if let Some(document_id) = self.kind.document_id() {
            fields.push(("document_id", document_id.to_string()));
        }
        fields
    }

    /// Parses the echoed metadata back into the union. Returns `None` on
    /// anything malformed; callers treat that as a provider error rather
    /// than guessing.
    pub fn from_fields(fields: &HashMap<String, String>) -> Option<Self> {
        let user_id = fields.get("user_id")?.parse().ok()?;
        let kind = match fields.get("kind")?.as_str() {
            "lifetime" => CheckoutKind::Lifetime,
            "document" => CheckoutKind::Document(fields.get("document_id")?.parse().ok()?),
            _ => return None,
        };
        Some(CheckoutMetadata { user_id, kind })
    }
}

#[derive(Debug, Clone)]
pub struct CreateSessionRequest {
    pub title: String,
    pub description: String,
    pub amount_cents: i64,
    pub success_url: String,
    pub cancel_url: String,
    pub metadata: CheckoutMetadata,
}

#[derive(Debug, Clone)]
pub struct ProviderSession {
    pub id: String,
    pub url: String,
}

/// Current state of a session as reported by the provider's oracle.
#[derive(Debug, Clone)]
pub struct SessionDetails {
    pub id: String,
    pub paid: bool,
    pub metadata: Option<CheckoutMetadata>,
}

/// Hosted-checkout provider boundary.
#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_session(&self, req: CreateSessionRequest)
        -> Result<ProviderSession, ApiError>;

    /// The payment-status oracle keyed by session id.
    async fn fetch_session(&self, session_id: &str) -> Result<SessionDetails, ApiError>;

    /// Resolves the checkout session a payment intent belongs to, used by
    /// the payment-failure webhook which only carries the intent id.
    async fn session_for_payment_intent(
        &self,
        intent_id: &str,
    ) -> Result<Option<String>, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn lifetime_metadata_round_trips() {
        let meta = CheckoutMetadata {
            user_id: Uuid::new_v4(),
            kind: CheckoutKind::Lifetime,
        };
        let map: HashMap<String, String> = meta
            .to_fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(CheckoutMetadata::from_fields(&map), Some(meta));
        assert!(!map.contains_key("document_id"));
    }

    #[test]
    fn document_metadata_round_trips() {
        let meta = CheckoutMetadata {
            user_id: Uuid::new_v4(),
            kind: CheckoutKind::Document(Uuid::new_v4()),
        };
        let map: HashMap<String, String> = meta
            .to_fields()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect();
        assert_eq!(CheckoutMetadata::from_fields(&map), Some(meta));
    }

    #[test]
    fn malformed_metadata_is_rejected() {
        let user = Uuid::new_v4().to_string();
        // unknown kind
        assert!(CheckoutMetadata::from_fields(&fields(&[
            ("user_id", &user),
            ("kind", "subscription"),
        ]))
        .is_none());
        // document kind without a document id
        assert!(CheckoutMetadata::from_fields(&fields(&[
            ("user_id", &user),
            ("kind", "document"),
        ]))
        .is_none());
        // missing user
        assert!(CheckoutMetadata::from_fields(&fields(&[("kind", "lifetime")])).is_none());
    }
}
