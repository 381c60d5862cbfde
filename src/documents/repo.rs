use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    #[serde(skip_serializing)]
    pub file_key: String, // storage locator, never serialized directly
    pub admin_id: Uuid,
    pub folder_id: Option<Uuid>,
    pub status: String,
    pub is_visible: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl Document {
    pub fn is_active(&self) -> bool {
        self.status == "active"
    }
}

const DOCUMENT_COLUMNS: &str = r#"
    id, title, description, price_cents, file_key, admin_id, folder_id,
    status, is_visible, created_at, updated_at
"#;

impl Document {
    pub async fn create(
        db: &PgPool,
        title: &str,
        description: &str,
        price_cents: i64,
        file_key: &str,
        admin_id: Uuid,
        folder_id: Option<Uuid>,
    ) -> sqlx::Result<Document> {
        sqlx::query_as::<_, Document>(&format!(
            r#"
            INSERT INTO documents (title, description, price_cents, file_key, admin_id, folder_id)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING {DOCUMENT_COLUMNS}
            "#
        ))
        .bind(title)
        .bind(description)
        .bind(price_cents)
        .bind(file_key)
        .bind(admin_id)
        .bind(folder_id)
        .fetch_one(db)
        .await
    }

    /// List documents, optionally restricted to one folder. Non-admin
    /// callers only ever see active, visible documents.
    pub async fn list(
        db: &PgPool,
        folder_id: Option<Uuid>,
        admin: bool,
    ) -> sqlx::Result<Vec<Document>> {
        sqlx::query_as::<_, Document>(&format!(
            r#"
            SELECT {DOCUMENT_COLUMNS}
            FROM documents
            WHERE ($1::uuid IS NULL OR folder_id = $1)
              AND ($2 OR (status = 'active' AND is_visible))
            ORDER BY created_at DESC
            "#
        ))
        .bind(folder_id)
        .bind(admin)
        .fetch_all(db)
        .await
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> sqlx::Result<Option<Document>> {
        sqlx::query_as::<_, Document>(&format!(
            "SELECT {DOCUMENT_COLUMNS} FROM documents WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// `folder_id` is a double option: the outer `None` leaves the folder
    /// as is, `Some(None)` moves the document back to the root.
    pub async fn update(
        db: &PgPool,
        id: Uuid,
        title: Option<&str>,
        description: Option<&str>,
        price_cents: Option<i64>,
        folder_id: Option<Option<Uuid>>,
        is_visible: Option<bool>,
    ) -> sqlx::Result<Option<Document>> {
        sqlx::query_as::<_, Document>(&format!(
            r#"
            UPDATE documents
            SET title       = COALESCE($2, title),
                description = COALESCE($3, description),
                price_cents = COALESCE($4, price_cents),
                folder_id   = CASE WHEN $5 THEN $6::uuid ELSE folder_id END,
                is_visible  = COALESCE($7, is_visible),
                updated_at  = now()
            WHERE id = $1
            RETURNING {DOCUMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(title)
        .bind(description)
        .bind(price_cents)
        .bind(folder_id.is_some())
        .bind(folder_id.flatten())
        .bind(is_visible)
        .fetch_optional(db)
        .await
    }

    /// Soft delete: the row survives for referential and audit integrity.
    pub async fn soft_delete(db: &PgPool, id: Uuid) -> sqlx::Result<Option<Document>> {
        sqlx::query_as::<_, Document>(&format!(
            r#"
            UPDATE documents SET status = 'inactive', updated_at = now()
            WHERE id = $1
            RETURNING {DOCUMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .fetch_optional(db)
        .await
    }

    pub async fn active_in_folder(db: &PgPool, folder_id: Uuid) -> sqlx::Result<Vec<Document>> {
        sqlx::query_as::<_, Document>(&format!(
            r#"
            SELECT {DOCUMENT_COLUMNS}
            FROM documents
            WHERE folder_id = $1 AND status = 'active'
            ORDER BY created_at DESC
            "#
        ))
        .bind(folder_id)
        .fetch_all(db)
        .await
    }

    pub async fn count_active_in_folder(db: &PgPool, folder_id: Uuid) -> sqlx::Result<i64> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM documents WHERE folder_id = $1 AND status = 'active'",
        )
        .bind(folder_id)
        .fetch_one(db)
        .await?;
        Ok(count)
    }
}
