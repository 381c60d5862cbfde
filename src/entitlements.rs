//! Access-control core. Every document-serving path routes its yes/no
//! decision through [`has_access`]; the payment flow consults
//! [`has_lifetime`] before creating or reconciling a checkout.

use sqlx::PgPool;
use tracing::debug;
use uuid::Uuid;

/// True when the user holds a completed lifetime purchase
/// (a completed Purchase row with NULL document id).
pub async fn has_lifetime(db: &PgPool, user_id: Uuid) -> sqlx::Result<bool> {
    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT id FROM purchases
        WHERE user_id = $1 AND document_id IS NULL AND status = 'completed'
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(row.is_some())
}

/// Whether the user may view a document's content.
///
/// Lifetime access subsumes every document, current and future. Without it,
/// access requires a completed purchase of exactly that document; with no
/// document given there is nothing more to check. Admin short-circuiting is
/// the caller's job, not this engine's.
pub async fn has_access(
    db: &PgPool,
    user_id: Uuid,
    document_id: Option<Uuid>,
) -> sqlx::Result<bool> {
    if has_lifetime(db, user_id).await? {
        debug!(user_id = %user_id, "access granted via lifetime purchase");
        return Ok(true);
    }

    let Some(document_id) = document_id else {
        return Ok(false);
    };

    let row: Option<(Uuid,)> = sqlx::query_as(
        r#"
        SELECT id FROM purchases
        WHERE user_id = $1 AND document_id = $2 AND status = 'completed'
        LIMIT 1
        "#,
    )
    .bind(user_id)
    .bind(document_id)
    .fetch_optional(db)
    .await?;

    debug!(
        user_id = %user_id,
        document_id = %document_id,
        granted = row.is_some(),
        "per-document access check"
    );
    Ok(row.is_some())
}
