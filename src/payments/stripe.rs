use std::collections::HashMap;
use std::time::Duration;

use axum::async_trait;
use serde::Deserialize;
use tracing::error;

use crate::error::ApiError;
use crate::payments::provider::{
    CheckoutMetadata, CreateSessionRequest, PaymentProvider, ProviderSession, SessionDetails,
};

const DEFAULT_API_BASE: &str = "https://api.stripe.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Stripe hosted-checkout client speaking the form-encoded REST API.
pub struct StripeProvider {
    http: reqwest::Client,
    secret_key: String,
    api_base: String,
}

impl StripeProvider {
    pub fn new(http: reqwest::Client, secret_key: String) -> Self {
        Self {
            http,
            secret_key,
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    fn provider_err(context: &str, err: impl std::fmt::Display) -> ApiError {
        error!(context, %err, "stripe request failed");
        ApiError::Provider(format!("Stripe {context} failed"))
    }
}

#[derive(Debug, Deserialize)]
struct SessionBody {
    id: String,
    url: Option<String>,
    payment_status: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SessionList {
    data: Vec<SessionBody>,
}

#[async_trait]
impl PaymentProvider for StripeProvider {
    async fn create_session(
        &self,
        req: CreateSessionRequest,
    ) -> Result<ProviderSession, ApiError> {
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("payment_method_types[0]".into(), "card".into()),
            ("line_items[0][quantity]".into(), "1".into()),
            (
                "line_items[0][price_data][currency]".into(),
                "usd".into(),
            ),
            (
                "line_items[0][price_data][unit_amount]".into(),
                req.amount_cents.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".into(),
                req.title,
            ),
            (
                "line_items[0][price_data][product_data][description]".into(),
                req.description,
            ),
            ("success_url".into(), req.success_url),
            ("cancel_url".into(), req.cancel_url),
        ];
        for (key, value) in req.metadata.to_fields() {
            form.push((format!("metadata[{key}]"), value));
        }

        let response = self
            .http
            .post(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .timeout(REQUEST_TIMEOUT)
            .form(&form)
            .send()
            .await
            .map_err(|e| Self::provider_err("session creation", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(%status, body, "stripe rejected session creation");
            return Err(ApiError::Provider("Stripe session creation failed".into()));
        }

        let session: SessionBody = response
            .json()
            .await
            .map_err(|e| Self::provider_err("session creation", e))?;
        let url = session
            .url
            .ok_or_else(|| ApiError::Provider("Stripe session has no checkout URL".into()))?;
        Ok(ProviderSession {
            id: session.id,
            url,
        })
    }

    async fn fetch_session(&self, session_id: &str) -> Result<SessionDetails, ApiError> {
        let response = self
            .http
            .get(format!(
                "{}/v1/checkout/sessions/{session_id}",
                self.api_base
            ))
            .bearer_auth(&self.secret_key)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| Self::provider_err("session lookup", e))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(ApiError::NotFound("Payment session not found".into()));
        }
        if !response.status().is_success() {
            let status = response.status();
            error!(%status, "stripe rejected session lookup");
            return Err(ApiError::Provider("Stripe session lookup failed".into()));
        }

        let session: SessionBody = response
            .json()
            .await
            .map_err(|e| Self::provider_err("session lookup", e))?;
        Ok(SessionDetails {
            id: session.id,
            paid: session.payment_status.as_deref() == Some("paid"),
            metadata: CheckoutMetadata::from_fields(&session.metadata),
        })
    }

    async fn session_for_payment_intent(
        &self,
        intent_id: &str,
    ) -> Result<Option<String>, ApiError> {
        let response = self
            .http
            .get(format!("{}/v1/checkout/sessions", self.api_base))
            .bearer_auth(&self.secret_key)
            .timeout(REQUEST_TIMEOUT)
            .query(&[("payment_intent", intent_id), ("limit", "1")])
            .send()
            .await
            .map_err(|e| Self::provider_err("session search", e))?;

        if !response.status().is_success() {
            let status = response.status();
            error!(%status, "stripe rejected session search");
            return Err(ApiError::Provider("Stripe session search failed".into()));
        }

        let list: SessionList = response
            .json()
            .await
            .map_err(|e| Self::provider_err("session search", e))?;
        Ok(list.data.into_iter().next().map(|s| s.id))
    }
}
