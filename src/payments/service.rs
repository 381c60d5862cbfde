//! Checkout creation and payment reconciliation.
//!
//! Reconciliation is the single path that turns a provider session into an
//! entitlement. It is reachable from the synchronous verify endpoint and
//! from the webhook; both funnel through [`reconcile`] so retries, webhook
//! redelivery, and verify/webhook races all collapse to one grant.

use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::documents::repo::Document;
use crate::entitlements;
use crate::error::ApiError;
use crate::payments::provider::{CheckoutKind, CheckoutMetadata, CreateSessionRequest};
use crate::payments::repo::PaymentStatus;
use crate::settings;
use crate::state::AppState;

const LIFETIME_TITLE: &str = "Lifetime Subscription";
const LIFETIME_DESCRIPTION: &str = "Unlimited access to all documents";

#[derive(Debug, Serialize)]
pub struct CheckoutCreated {
    pub session_id: String,
    pub checkout_url: String,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ReconcileOutcome {
    pub success: bool,
    pub already_processed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<Uuid>,
}

impl ReconcileOutcome {
    fn completed(kind: &'static str, document_id: Option<Uuid>) -> Self {
        Self {
            success: true,
            already_processed: false,
            kind: Some(kind),
            document_id,
        }
    }

    fn already_processed(document_id: Option<Uuid>) -> Self {
        let kind = if document_id.is_some() {
            "document"
        } else {
            "lifetime"
        };
        Self {
            success: true,
            already_processed: true,
            kind: Some(kind),
            document_id,
        }
    }

    fn not_completed() -> Self {
        Self {
            success: false,
            already_processed: false,
            kind: None,
            document_id: None,
        }
    }
}

/// Creates a provider session and records the pending payment. The pending
/// row is written before the checkout URL is returned, so every session the
/// user can possibly pay for is already known to reconciliation.
pub async fn create_checkout(
    state: &AppState,
    user_id: Uuid,
    document_id: Option<Uuid>,
) -> Result<CheckoutCreated, ApiError> {
    if state.payment_store.user_has_lifetime(user_id).await? {
        return Err(ApiError::Conflict(
            "You already have an active lifetime subscription".into(),
        ));
    }

    let (kind, title, description, amount_cents) = match document_id {
        Some(document_id) => {
            let doc = Document::find_by_id(&state.db, document_id)
                .await?
                .ok_or_else(|| ApiError::NotFound("Document not found".into()))?;
            if !doc.is_active() {
                return Err(ApiError::Validation(
                    "Document is not available for purchase".into(),
                ));
            }
            if entitlements::has_access(&state.db, user_id, Some(document_id)).await? {
                return Err(ApiError::Conflict(
                    "You already have access to this document".into(),
                ));
            }
            (
                CheckoutKind::Document(document_id),
                doc.title,
                doc.description,
                doc.price_cents,
            )
        }
        None => {
            let price = settings::service::lifetime_price_cents(&state.db).await?;
            (
                CheckoutKind::Lifetime,
                LIFETIME_TITLE.to_string(),
                LIFETIME_DESCRIPTION.to_string(),
                price,
            )
        }
    };

    let session = state
        .payments
        .create_session(CreateSessionRequest {
            title,
            description,
            amount_cents,
            success_url: format!(
                "{}/payment/success?session_id={{CHECKOUT_SESSION_ID}}",
                state.config.frontend_url
            ),
            cancel_url: format!("{}/payment/cancel", state.config.frontend_url),
            metadata: CheckoutMetadata { user_id, kind },
        })
        .await?;

    state
        .payment_store
        .create_payment(user_id, kind.document_id(), &session.id, amount_cents)
        .await?;

    info!(
        user_id = %user_id,
        session_id = %session.id,
        kind = kind.tag(),
        amount_cents,
        "checkout session created"
    );
    Ok(CheckoutCreated {
        session_id: session.id,
        checkout_url: session.url,
    })
}

/// Settles one checkout session exactly once.
///
/// `authenticated_user` is set on the synchronous verify path and checked
/// against the session's metadata; the webhook path passes `None` and
/// trusts the verified signature instead.
pub async fn reconcile(
    state: &AppState,
    session_id: &str,
    authenticated_user: Option<Uuid>,
) -> Result<ReconcileOutcome, ApiError> {
    let payment = state
        .payment_store
        .find_by_session(session_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Payment not found".into()))?;

    // Idempotent short-circuit for webhook redelivery and verify retries.
    if payment.status() == Some(PaymentStatus::Completed) {
        return Ok(ReconcileOutcome::already_processed(payment.document_id));
    }

    // Never trust the caller about money: re-query the provider.
    let details = state.payments.fetch_session(session_id).await?;
    if !details.paid {
        state
            .payment_store
            .mark_if_pending(session_id, PaymentStatus::Failed)
            .await?;
        return Ok(ReconcileOutcome::not_completed());
    }

    let metadata = details
        .metadata
        .ok_or_else(|| ApiError::Provider("Checkout session metadata is missing".into()))?;
    if metadata.user_id != payment.user_id {
        warn!(session_id, "session metadata does not match payment record");
        return Err(ApiError::Provider(
            "Checkout session metadata is inconsistent".into(),
        ));
    }
    if let Some(caller) = authenticated_user {
        if caller != metadata.user_id {
            return Err(ApiError::Forbidden(
                "You do not have access to this payment session".into(),
            ));
        }
    }

    // The grant may have landed through another session since checkout.
    if state.payment_store.user_has_lifetime(metadata.user_id).await? {
        return Err(ApiError::Conflict(
            "You already have an active lifetime subscription".into(),
        ));
    }

    // Only the caller that wins this transition inserts the purchase.
    let Some(completed) = state
        .payment_store
        .mark_if_pending(session_id, PaymentStatus::Completed)
        .await?
    else {
        let current = state
            .payment_store
            .find_by_session(session_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Payment not found".into()))?;
        return if current.status() == Some(PaymentStatus::Completed) {
            Ok(ReconcileOutcome::already_processed(current.document_id))
        } else {
            Err(ApiError::Conflict(format!(
                "Payment session is {}",
                current.status
            )))
        };
    };

    match state
        .payment_store
        .insert_purchase(
            metadata.user_id,
            metadata.kind.document_id(),
            completed.id,
            completed.amount_cents,
        )
        .await
    {
        Ok(purchase) => {
            info!(
                user_id = %metadata.user_id,
                session_id,
                purchase_id = %purchase.id,
                kind = metadata.kind.tag(),
                "payment reconciled"
            );
            Ok(ReconcileOutcome::completed(
                metadata.kind.tag(),
                metadata.kind.document_id(),
            ))
        }
        // A concurrent reconciliation of another session inserted the
        // lifetime grant between the check above and this insert.
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            warn!(session_id, "duplicate grant insert resolved as already processed");
            Ok(ReconcileOutcome::already_processed(
                metadata.kind.document_id(),
            ))
        }
        Err(e) => Err(e.into()),
    }
}

/// `checkout.session.expired`: a pending payment moves to expired; any
/// terminal state stays put.
pub async fn expire_session(state: &AppState, session_id: &str) -> Result<(), ApiError> {
    if state
        .payment_store
        .mark_if_pending(session_id, PaymentStatus::Expired)
        .await?
        .is_some()
    {
        info!(session_id, "payment expired");
    }
    Ok(())
}

/// `payment_intent.payment_failed`: resolve the owning session, then mark
/// it failed if still pending.
pub async fn fail_payment_intent(state: &AppState, intent_id: &str) -> Result<(), ApiError> {
    let Some(session_id) = state.payments.session_for_payment_intent(intent_id).await? else {
        warn!(intent_id, "no checkout session for failed payment intent");
        return Ok(());
    };
    if state
        .payment_store
        .mark_if_pending(&session_id, PaymentStatus::Failed)
        .await?
        .is_some()
    {
        info!(session_id, intent_id, "payment failed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payments::provider::{PaymentProvider, ProviderSession, SessionDetails};
    use crate::payments::repo::{Payment, PaymentStore, Purchase};
    use axum::async_trait;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use time::OffsetDateTime;

    /// In-memory payment rows with the same guarded-transition semantics
    /// as the real table.
    #[derive(Default)]
    struct MemoryStore {
        payments: Mutex<HashMap<String, Payment>>,
        purchases: Mutex<Vec<Purchase>>,
        lifetime_granted: Mutex<bool>,
        reject_grant_as_duplicate: Mutex<bool>,
    }

    impl MemoryStore {
        fn with_payment(payment: Payment) -> Arc<Self> {
            let store = MemoryStore::default();
            store
                .payments
                .lock()
                .unwrap()
                .insert(payment.session_id.clone(), payment);
            Arc::new(store)
        }

        fn payment_status(&self, session_id: &str) -> String {
            self.payments.lock().unwrap()[session_id].status.clone()
        }

        fn purchase_count(&self) -> usize {
            self.purchases.lock().unwrap().len()
        }
    }

    /// Stands in for the partial unique index that keeps lifetime grants
    /// to one row per user.
    #[derive(Debug)]
    struct DuplicateGrant;

    impl std::fmt::Display for DuplicateGrant {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("duplicate key value violates unique constraint")
        }
    }

    impl std::error::Error for DuplicateGrant {}

    impl sqlx::error::DatabaseError for DuplicateGrant {
        fn message(&self) -> &str {
            "duplicate key value violates unique constraint"
        }
        fn kind(&self) -> sqlx::error::ErrorKind {
            sqlx::error::ErrorKind::UniqueViolation
        }
        fn as_error(&self) -> &(dyn std::error::Error + Send + Sync + 'static) {
            self
        }
        fn as_error_mut(&mut self) -> &mut (dyn std::error::Error + Send + Sync + 'static) {
            self
        }
        fn into_error(self: Box<Self>) -> Box<dyn std::error::Error + Send + Sync + 'static> {
            self
        }
    }

    #[async_trait]
    impl PaymentStore for MemoryStore {
        async fn create_payment(
            &self,
            user_id: Uuid,
            document_id: Option<Uuid>,
            session_id: &str,
            amount_cents: i64,
        ) -> sqlx::Result<Payment> {
            let mut payment = payment_row(session_id, user_id, document_id, "pending");
            payment.amount_cents = amount_cents;
            self.payments
                .lock()
                .unwrap()
                .insert(session_id.to_string(), payment.clone());
            Ok(payment)
        }

        async fn find_by_session(&self, session_id: &str) -> sqlx::Result<Option<Payment>> {
            Ok(self.payments.lock().unwrap().get(session_id).cloned())
        }

        async fn mark_if_pending(
            &self,
            session_id: &str,
            new_status: PaymentStatus,
        ) -> sqlx::Result<Option<Payment>> {
            let mut payments = self.payments.lock().unwrap();
            match payments.get_mut(session_id) {
                Some(p) if p.status == "pending" => {
                    p.status = new_status.as_str().to_string();
                    Ok(Some(p.clone()))
                }
                _ => Ok(None),
            }
        }

        async fn insert_purchase(
            &self,
            user_id: Uuid,
            document_id: Option<Uuid>,
            payment_id: Uuid,
            amount_cents: i64,
        ) -> sqlx::Result<Purchase> {
            if *self.reject_grant_as_duplicate.lock().unwrap() {
                return Err(sqlx::Error::Database(Box::new(DuplicateGrant)));
            }
            let purchase = Purchase {
                id: Uuid::new_v4(),
                user_id,
                document_id,
                payment_id,
                amount_cents,
                status: "completed".into(),
                created_at: OffsetDateTime::now_utc(),
            };
            self.purchases.lock().unwrap().push(purchase.clone());
            Ok(purchase)
        }

        async fn user_has_lifetime(&self, _user_id: Uuid) -> sqlx::Result<bool> {
            Ok(*self.lifetime_granted.lock().unwrap())
        }
    }

    struct ScriptedProvider {
        paid: bool,
        metadata: Option<CheckoutMetadata>,
        fetches: AtomicUsize,
    }

    impl ScriptedProvider {
        fn paid_for(metadata: CheckoutMetadata) -> Arc<Self> {
            Arc::new(Self {
                paid: true,
                metadata: Some(metadata),
                fetches: AtomicUsize::new(0),
            })
        }

        fn paid_without_metadata() -> Arc<Self> {
            Arc::new(Self {
                paid: true,
                metadata: None,
                fetches: AtomicUsize::new(0),
            })
        }

        fn unpaid() -> Arc<Self> {
            Arc::new(Self {
                paid: false,
                metadata: None,
                fetches: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl PaymentProvider for ScriptedProvider {
        async fn create_session(
            &self,
            _req: CreateSessionRequest,
        ) -> Result<ProviderSession, ApiError> {
            Ok(ProviderSession {
                id: "cs_scripted".into(),
                url: "https://pay.local/cs_scripted".into(),
            })
        }

        async fn fetch_session(&self, session_id: &str) -> Result<SessionDetails, ApiError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(SessionDetails {
                id: session_id.to_string(),
                paid: self.paid,
                metadata: self.metadata,
            })
        }

        async fn session_for_payment_intent(
            &self,
            _intent_id: &str,
        ) -> Result<Option<String>, ApiError> {
            Ok(None)
        }
    }

    fn payment_row(
        session_id: &str,
        user_id: Uuid,
        document_id: Option<Uuid>,
        status: &str,
    ) -> Payment {
        let now = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        Payment {
            id: Uuid::new_v4(),
            user_id,
            document_id,
            session_id: session_id.to_string(),
            amount_cents: 4900,
            status: status.into(),
            created_at: now,
            updated_at: now,
        }
    }

    fn test_state(store: Arc<MemoryStore>, provider: Arc<ScriptedProvider>) -> AppState {
        let payment_store: Arc<dyn PaymentStore> = store;
        let payments: Arc<dyn PaymentProvider> = provider;
        AppState {
            payment_store,
            payments,
            ..AppState::fake()
        }
    }

    fn document_meta(user_id: Uuid, document_id: Uuid) -> CheckoutMetadata {
        CheckoutMetadata {
            user_id,
            kind: CheckoutKind::Document(document_id),
        }
    }

    fn lifetime_meta(user_id: Uuid) -> CheckoutMetadata {
        CheckoutMetadata {
            user_id,
            kind: CheckoutKind::Lifetime,
        }
    }

    #[tokio::test]
    async fn paid_session_completes_and_inserts_the_purchase() {
        let user = Uuid::new_v4();
        let doc = Uuid::new_v4();
        let store = MemoryStore::with_payment(payment_row("cs_1", user, Some(doc), "pending"));
        let provider = ScriptedProvider::paid_for(document_meta(user, doc));
        let state = test_state(store.clone(), provider);

        let outcome = reconcile(&state, "cs_1", Some(user)).await.unwrap();
        assert!(outcome.success);
        assert!(!outcome.already_processed);
        assert_eq!(outcome.kind, Some("document"));
        assert_eq!(outcome.document_id, Some(doc));
        assert_eq!(store.payment_status("cs_1"), "completed");
        assert_eq!(store.purchase_count(), 1);
    }

    #[tokio::test]
    async fn repeated_reconcile_grants_only_once() {
        let user = Uuid::new_v4();
        let doc = Uuid::new_v4();
        let store = MemoryStore::with_payment(payment_row("cs_2", user, Some(doc), "pending"));
        let provider = ScriptedProvider::paid_for(document_meta(user, doc));
        let state = test_state(store.clone(), provider);

        let first = reconcile(&state, "cs_2", Some(user)).await.unwrap();
        let second = reconcile(&state, "cs_2", Some(user)).await.unwrap();
        assert!(!first.already_processed);
        assert!(second.already_processed);
        assert!(second.success);
        assert_eq!(store.purchase_count(), 1);
    }

    #[tokio::test]
    async fn completed_session_short_circuits_without_a_provider_call() {
        let user = Uuid::new_v4();
        let store = MemoryStore::with_payment(payment_row("cs_3", user, None, "completed"));
        let provider = ScriptedProvider::unpaid();
        let state = test_state(store.clone(), provider.clone());

        let outcome = reconcile(&state, "cs_3", Some(user)).await.unwrap();
        assert!(outcome.already_processed);
        assert_eq!(outcome.kind, Some("lifetime"));
        assert_eq!(provider.fetches.load(Ordering::SeqCst), 0);
        assert_eq!(store.purchase_count(), 0);
    }

    #[tokio::test]
    async fn unpaid_session_is_marked_failed() {
        let user = Uuid::new_v4();
        let store = MemoryStore::with_payment(payment_row("cs_4", user, None, "pending"));
        let state = test_state(store.clone(), ScriptedProvider::unpaid());

        let outcome = reconcile(&state, "cs_4", Some(user)).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::not_completed());
        assert_eq!(store.payment_status("cs_4"), "failed");
        assert_eq!(store.purchase_count(), 0);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let state = test_state(Arc::new(MemoryStore::default()), ScriptedProvider::unpaid());
        let err = reconcile(&state, "cs_missing", None).await.unwrap_err();
        assert!(matches!(err, ApiError::NotFound(_)));
    }

    #[tokio::test]
    async fn another_users_session_is_forbidden() {
        let owner = Uuid::new_v4();
        let stranger = Uuid::new_v4();
        let store = MemoryStore::with_payment(payment_row("cs_5", owner, None, "pending"));
        let provider = ScriptedProvider::paid_for(lifetime_meta(owner));
        let state = test_state(store.clone(), provider);

        let err = reconcile(&state, "cs_5", Some(stranger)).await.unwrap_err();
        assert!(matches!(err, ApiError::Forbidden(_)));
        // The rejected call must not settle the session.
        assert_eq!(store.payment_status("cs_5"), "pending");
        assert_eq!(store.purchase_count(), 0);
    }

    #[tokio::test]
    async fn missing_metadata_is_a_provider_error() {
        let user = Uuid::new_v4();
        let store = MemoryStore::with_payment(payment_row("cs_6", user, None, "pending"));
        let state = test_state(store, ScriptedProvider::paid_without_metadata());

        let err = reconcile(&state, "cs_6", Some(user)).await.unwrap_err();
        assert!(matches!(err, ApiError::Provider(_)));
    }

    #[tokio::test]
    async fn metadata_owner_mismatch_is_a_provider_error() {
        let user = Uuid::new_v4();
        let store = MemoryStore::with_payment(payment_row("cs_7", user, None, "pending"));
        let provider = ScriptedProvider::paid_for(lifetime_meta(Uuid::new_v4()));
        let state = test_state(store, provider);

        let err = reconcile(&state, "cs_7", Some(user)).await.unwrap_err();
        assert!(matches!(err, ApiError::Provider(_)));
    }

    #[tokio::test]
    async fn existing_lifetime_grant_conflicts() {
        let user = Uuid::new_v4();
        let store = MemoryStore::with_payment(payment_row("cs_8", user, None, "pending"));
        *store.lifetime_granted.lock().unwrap() = true;
        let provider = ScriptedProvider::paid_for(lifetime_meta(user));
        let state = test_state(store.clone(), provider);

        let err = reconcile(&state, "cs_8", Some(user)).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(store.payment_status("cs_8"), "pending");
    }

    #[tokio::test]
    async fn duplicate_grant_insert_resolves_as_already_processed() {
        let user = Uuid::new_v4();
        let store = MemoryStore::with_payment(payment_row("cs_9", user, None, "pending"));
        *store.reject_grant_as_duplicate.lock().unwrap() = true;
        let provider = ScriptedProvider::paid_for(lifetime_meta(user));
        let state = test_state(store.clone(), provider);

        let outcome = reconcile(&state, "cs_9", Some(user)).await.unwrap();
        assert!(outcome.success);
        assert!(outcome.already_processed);
        assert_eq!(store.payment_status("cs_9"), "completed");
    }

    #[tokio::test]
    async fn terminal_failed_session_cannot_complete() {
        let user = Uuid::new_v4();
        let store = MemoryStore::with_payment(payment_row("cs_10", user, None, "failed"));
        let provider = ScriptedProvider::paid_for(lifetime_meta(user));
        let state = test_state(store.clone(), provider);

        let err = reconcile(&state, "cs_10", Some(user)).await.unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        assert_eq!(store.payment_status("cs_10"), "failed");
        assert_eq!(store.purchase_count(), 0);
    }

    #[tokio::test]
    async fn expiry_only_moves_pending_payments() {
        let user = Uuid::new_v4();
        let store = MemoryStore::with_payment(payment_row("cs_11", user, None, "pending"));
        let state = test_state(store.clone(), ScriptedProvider::unpaid());

        expire_session(&state, "cs_11").await.unwrap();
        assert_eq!(store.payment_status("cs_11"), "expired");

        // A late expiry event must not claw back a settled payment.
        store
            .payments
            .lock()
            .unwrap()
            .insert("cs_12".into(), payment_row("cs_12", user, None, "completed"));
        expire_session(&state, "cs_12").await.unwrap();
        assert_eq!(store.payment_status("cs_12"), "completed");
    }

    #[test]
    fn not_completed_omits_kind_and_document() {
        let json = serde_json::to_value(ReconcileOutcome::not_completed()).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["already_processed"], false);
        assert!(json.get("kind").is_none());
        assert!(json.get("document_id").is_none());
    }

    #[test]
    fn already_processed_kind_follows_document_id() {
        let lifetime = ReconcileOutcome::already_processed(None);
        assert_eq!(lifetime.kind, Some("lifetime"));
        assert!(lifetime.success);

        let document = ReconcileOutcome::already_processed(Some(Uuid::new_v4()));
        assert_eq!(document.kind, Some("document"));
        assert!(document.already_processed);
    }

    #[test]
    fn completed_carries_kind_and_document() {
        let id = Uuid::new_v4();
        let json =
            serde_json::to_value(ReconcileOutcome::completed("document", Some(id))).unwrap();
        assert_eq!(json["success"], true);
        assert_eq!(json["already_processed"], false);
        assert_eq!(json["kind"], "document");
        assert_eq!(json["document_id"], id.to_string());
    }
}
