use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// A completed purchase joined with its document title, for history
/// listings. The title is null for the lifetime grant and for documents
/// that were since removed.
#[derive(Debug, Clone, FromRow)]
pub struct PurchaseRecord {
    pub id: Uuid,
    pub document_id: Option<Uuid>,
    pub document_title: Option<String>,
    pub amount_cents: i64,
    pub created_at: OffsetDateTime,
}

impl PurchaseRecord {
    pub async fn list_for_user(db: &PgPool, user_id: Uuid) -> sqlx::Result<Vec<PurchaseRecord>> {
        sqlx::query_as::<_, PurchaseRecord>(
            r#"
            SELECT p.id, p.document_id, d.title AS document_title,
                   p.amount_cents, p.created_at
            FROM purchases p
            LEFT JOIN documents d ON d.id = p.document_id
            WHERE p.user_id = $1 AND p.status = 'completed'
            ORDER BY p.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(db)
        .await
    }
}
