use axum::{
    body::Bytes,
    extract::{Path, State},
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use tracing::{error, instrument, warn};
use uuid::Uuid;

use crate::auth::claims::Role;
use crate::auth::extractors::AuthUser;
use crate::error::ApiError;
use crate::payments::service::{self, CheckoutCreated, ReconcileOutcome};
use crate::payments::webhook::{self, WebhookEvent};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments/checkout", post(create_checkout))
        .route("/payments/verify", post(verify_payment))
        .route("/payments/status/:session_id", get(payment_status))
        .route("/payments/webhook", post(handle_webhook))
}

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    /// Absent for a lifetime-subscription checkout.
    #[serde(default)]
    pub document_id: Option<Uuid>,
}

#[instrument(skip(state, payload))]
pub async fn create_checkout(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<CheckoutCreated>, ApiError> {
    let created = service::create_checkout(&state, user.id, payload.document_id).await?;
    Ok(Json(created))
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub session_id: String,
}

/// POST /payments/verify: synchronous reconciliation after the provider
/// redirects the buyer back.
#[instrument(skip(state, payload))]
pub async fn verify_payment(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<VerifyRequest>,
) -> Result<Json<ReconcileOutcome>, ApiError> {
    let outcome = service::reconcile(&state, &payload.session_id, Some(user.id)).await?;
    Ok(Json(outcome))
}

#[derive(Debug, Serialize)]
pub struct PaymentStatusResponse {
    pub session_id: String,
    pub status: String,
}

#[instrument(skip(state))]
pub async fn payment_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<PaymentStatusResponse>, ApiError> {
    let payment = state
        .payment_store
        .find_by_session(&session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Payment not found".into()))?;
    if payment.user_id != user.id && user.role != Role::Admin {
        return Err(ApiError::Forbidden(
            "You do not have access to this payment session".into(),
        ));
    }
    Ok(Json(PaymentStatusResponse {
        session_id: payment.session_id,
        status: payment.status,
    }))
}

/// POST /payments/webhook: signature-verified provider events.
///
/// Event handling failures are logged and acknowledged anyway; returning a
/// non-2xx would only trigger redelivery of an event reconciliation can
/// already absorb through the verify path.
#[instrument(skip_all)]
pub async fn handle_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ApiError::Unauthorized("Missing webhook signature".into()))?;

    webhook::verify_signature(
        &state.config.stripe.webhook_secret,
        signature,
        &body,
        OffsetDateTime::now_utc(),
    )
    .map_err(|e| {
        warn!(reason = e.message(), "webhook signature rejected");
        ApiError::Unauthorized(e.message().into())
    })?;

    let event = webhook::parse_event(&body).map_err(ApiError::Validation)?;

    let result = match &event {
        WebhookEvent::CheckoutCompleted { session_id } => {
            service::reconcile(&state, session_id, None).await.map(|_| ())
        }
        WebhookEvent::CheckoutExpired { session_id } => {
            service::expire_session(&state, session_id).await
        }
        WebhookEvent::PaymentFailed { payment_intent_id } => {
            service::fail_payment_intent(&state, payment_intent_id).await
        }
        WebhookEvent::Other => Ok(()),
    };
    if let Err(e) = result {
        error!(event = ?event, error = %e, "webhook event handling failed");
    }

    Ok(Json(serde_json::json!({ "received": true })))
}
