use axum::async_trait;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::entitlements;

/// Payment lifecycle. `Pending` is the only state that can transition;
/// the other three are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentStatus {
    Pending,
    Completed,
    Failed,
    Expired,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Expired => "expired",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "expired" => Some(PaymentStatus::Expired),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Payment {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_id: Option<Uuid>,
    pub session_id: String,
    pub amount_cents: i64,
    pub status: String,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

const PAYMENT_COLUMNS: &str =
    "id, user_id, document_id, session_id, amount_cents, status, created_at, updated_at";

impl Payment {
    pub fn status(&self) -> Option<PaymentStatus> {
        PaymentStatus::parse(&self.status)
    }

    pub async fn create(
        db: &PgPool,
        user_id: Uuid,
        document_id: Option<Uuid>,
        session_id: &str,
        amount_cents: i64,
    ) -> sqlx::Result<Payment> {
        sqlx::query_as::<_, Payment>(&format!(
            r#"
            INSERT INTO payments (user_id, document_id, session_id, amount_cents)
            VALUES ($1, $2, $3, $4)
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(document_id)
        .bind(session_id)
        .bind(amount_cents)
        .fetch_one(db)
        .await
    }

    pub async fn find_by_session(db: &PgPool, session_id: &str) -> sqlx::Result<Option<Payment>> {
        sqlx::query_as::<_, Payment>(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE session_id = $1"
        ))
        .bind(session_id)
        .fetch_optional(db)
        .await
    }

    /// Guarded transition: the row moves to `new_status` only if it is
    /// still pending. Returns `None` when another caller got there first
    /// or the payment is already terminal.
    pub async fn mark_if_pending(
        db: &PgPool,
        session_id: &str,
        new_status: PaymentStatus,
    ) -> sqlx::Result<Option<Payment>> {
        sqlx::query_as::<_, Payment>(&format!(
            r#"
            UPDATE payments SET status = $2, updated_at = now()
            WHERE session_id = $1 AND status = 'pending'
            RETURNING {PAYMENT_COLUMNS}
            "#
        ))
        .bind(session_id)
        .bind(new_status.as_str())
        .fetch_optional(db)
        .await
    }
}

/// A completed grant. `document_id` null means the lifetime grant; the
/// partial unique index in the schema keeps that to one row per user.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Purchase {
    pub id: Uuid,
    pub user_id: Uuid,
    pub document_id: Option<Uuid>,
    pub payment_id: Uuid,
    pub amount_cents: i64,
    pub status: String,
    pub created_at: OffsetDateTime,
}

const PURCHASE_COLUMNS: &str =
    "id, user_id, document_id, payment_id, amount_cents, status, created_at";

impl Purchase {
    pub async fn create(
        db: &PgPool,
        user_id: Uuid,
        document_id: Option<Uuid>,
        payment_id: Uuid,
        amount_cents: i64,
    ) -> sqlx::Result<Purchase> {
        sqlx::query_as::<_, Purchase>(&format!(
            r#"
            INSERT INTO purchases (user_id, document_id, payment_id, amount_cents)
            VALUES ($1, $2, $3, $4)
            RETURNING {PURCHASE_COLUMNS}
            "#
        ))
        .bind(user_id)
        .bind(document_id)
        .bind(payment_id)
        .bind(amount_cents)
        .fetch_one(db)
        .await
    }

}

/// Persistence seam for the payment lifecycle. Reconciliation and the
/// webhook handlers run against this trait, so terminal states, lost
/// races, and duplicate grants can all be driven from tests.
#[async_trait]
pub trait PaymentStore: Send + Sync {
    async fn create_payment(
        &self,
        user_id: Uuid,
        document_id: Option<Uuid>,
        session_id: &str,
        amount_cents: i64,
    ) -> sqlx::Result<Payment>;

    async fn find_by_session(&self, session_id: &str) -> sqlx::Result<Option<Payment>>;

    /// Guarded transition; `None` when the payment is already terminal.
    async fn mark_if_pending(
        &self,
        session_id: &str,
        new_status: PaymentStatus,
    ) -> sqlx::Result<Option<Payment>>;

    async fn insert_purchase(
        &self,
        user_id: Uuid,
        document_id: Option<Uuid>,
        payment_id: Uuid,
        amount_cents: i64,
    ) -> sqlx::Result<Purchase>;

    async fn user_has_lifetime(&self, user_id: Uuid) -> sqlx::Result<bool>;
}

pub struct PgPaymentStore {
    db: PgPool,
}

impl PgPaymentStore {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

#[async_trait]
impl PaymentStore for PgPaymentStore {
    async fn create_payment(
        &self,
        user_id: Uuid,
        document_id: Option<Uuid>,
        session_id: &str,
        amount_cents: i64,
    ) -> sqlx::Result<Payment> {
        Payment::create(&self.db, user_id, document_id, session_id, amount_cents).await
    }

    async fn find_by_session(&self, session_id: &str) -> sqlx::Result<Option<Payment>> {
        Payment::find_by_session(&self.db, session_id).await
    }

    async fn mark_if_pending(
        &self,
        session_id: &str,
        new_status: PaymentStatus,
    ) -> sqlx::Result<Option<Payment>> {
        Payment::mark_if_pending(&self.db, session_id, new_status).await
    }

    async fn insert_purchase(
        &self,
        user_id: Uuid,
        document_id: Option<Uuid>,
        payment_id: Uuid,
        amount_cents: i64,
    ) -> sqlx::Result<Purchase> {
        Purchase::create(&self.db, user_id, document_id, payment_id, amount_cents).await
    }

    async fn user_has_lifetime(&self, user_id: Uuid) -> sqlx::Result<bool> {
        entitlements::has_lifetime(&self.db, user_id).await
    }
}
