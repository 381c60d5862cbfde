use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Folder {
    pub id: Uuid,
    pub name: String,
    pub parent_id: Option<Uuid>,
    pub admin_id: Uuid,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

const FOLDER_COLUMNS: &str = "id, name, parent_id, admin_id, created_at, updated_at";

impl Folder {
    pub async fn create(
        db: &PgPool,
        name: &str,
        parent_id: Option<Uuid>,
        admin_id: Uuid,
    ) -> sqlx::Result<Folder> {
        sqlx::query_as::<_, Folder>(&format!(
            r#"
            INSERT INTO folders (name, parent_id, admin_id)
            VALUES ($1, $2, $3)
            RETURNING {FOLDER_COLUMNS}
            "#
        ))
        .bind(name)
        .bind(parent_id)
        .bind(admin_id)
        .fetch_one(db)
        .await
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> sqlx::Result<Option<Folder>> {
        sqlx::query_as::<_, Folder>(&format!(
            "SELECT {FOLDER_COLUMNS} FROM folders WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// The entire flat folder table in creation order. Tree and descendant
    /// walks operate on this single fetch instead of one query per node.
    pub async fn list_all(db: &PgPool) -> sqlx::Result<Vec<Folder>> {
        sqlx::query_as::<_, Folder>(&format!(
            "SELECT {FOLDER_COLUMNS} FROM folders ORDER BY created_at ASC"
        ))
        .fetch_all(db)
        .await
    }

    /// Same fetch inside a transaction, with the rows locked so that a
    /// concurrent move cannot invalidate a descendant check in flight.
    pub async fn list_all_for_update(
        tx: &mut Transaction<'_, Postgres>,
    ) -> sqlx::Result<Vec<Folder>> {
        sqlx::query_as::<_, Folder>(&format!(
            "SELECT {FOLDER_COLUMNS} FROM folders ORDER BY created_at ASC FOR UPDATE"
        ))
        .fetch_all(&mut **tx)
        .await
    }

    pub async fn rename(db: &PgPool, id: Uuid, name: &str) -> sqlx::Result<Option<Folder>> {
        sqlx::query_as::<_, Folder>(&format!(
            r#"
            UPDATE folders SET name = $2, updated_at = now()
            WHERE id = $1
            RETURNING {FOLDER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(name)
        .fetch_optional(db)
        .await
    }

    pub async fn set_parent(
        tx: &mut Transaction<'_, Postgres>,
        id: Uuid,
        parent_id: Option<Uuid>,
    ) -> sqlx::Result<Option<Folder>> {
        sqlx::query_as::<_, Folder>(&format!(
            r#"
            UPDATE folders SET parent_id = $2, updated_at = now()
            WHERE id = $1
            RETURNING {FOLDER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(parent_id)
        .fetch_optional(&mut **tx)
        .await
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> sqlx::Result<()> {
        sqlx::query("DELETE FROM folders WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn count_children(db: &PgPool, id: Uuid) -> sqlx::Result<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM folders WHERE parent_id = $1")
                .bind(id)
                .fetch_one(db)
                .await?;
        Ok(count)
    }
}
