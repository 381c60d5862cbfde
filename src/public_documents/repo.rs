use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

/// Length of the opaque share token in the public URL.
const TOKEN_LEN: usize = 32;

pub fn generate_token() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LEN)
        .map(char::from)
        .collect()
}

/// A document shared by unguessable link, outside the paywall entirely.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PublicDocument {
    pub id: Uuid,
    pub token: String,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing)]
    pub file_key: String,
    pub admin_id: Uuid,
    pub is_active: bool,
    pub created_at: OffsetDateTime,
}

const PUBLIC_DOCUMENT_COLUMNS: &str =
    "id, token, title, description, file_key, admin_id, is_active, created_at";

impl PublicDocument {
    pub async fn create(
        db: &PgPool,
        token: &str,
        title: &str,
        description: &str,
        file_key: &str,
        admin_id: Uuid,
    ) -> sqlx::Result<PublicDocument> {
        sqlx::query_as::<_, PublicDocument>(&format!(
            r#"
            INSERT INTO public_documents (token, title, description, file_key, admin_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {PUBLIC_DOCUMENT_COLUMNS}
            "#
        ))
        .bind(token)
        .bind(title)
        .bind(description)
        .bind(file_key)
        .bind(admin_id)
        .fetch_one(db)
        .await
    }

    pub async fn list_all(db: &PgPool) -> sqlx::Result<Vec<PublicDocument>> {
        sqlx::query_as::<_, PublicDocument>(&format!(
            "SELECT {PUBLIC_DOCUMENT_COLUMNS} FROM public_documents ORDER BY created_at DESC"
        ))
        .fetch_all(db)
        .await
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> sqlx::Result<Option<PublicDocument>> {
        sqlx::query_as::<_, PublicDocument>(&format!(
            "SELECT {PUBLIC_DOCUMENT_COLUMNS} FROM public_documents WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await
    }

    pub async fn find_by_token(db: &PgPool, token: &str) -> sqlx::Result<Option<PublicDocument>> {
        sqlx::query_as::<_, PublicDocument>(&format!(
            "SELECT {PUBLIC_DOCUMENT_COLUMNS} FROM public_documents WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(db)
        .await
    }

    pub async fn set_active(
        db: &PgPool,
        id: Uuid,
        is_active: bool,
    ) -> sqlx::Result<Option<PublicDocument>> {
        sqlx::query_as::<_, PublicDocument>(&format!(
            r#"
            UPDATE public_documents SET is_active = $2
            WHERE id = $1
            RETURNING {PUBLIC_DOCUMENT_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(is_active)
        .fetch_optional(db)
        .await
    }

    pub async fn delete(db: &PgPool, id: Uuid) -> sqlx::Result<()> {
        sqlx::query("DELETE FROM public_documents WHERE id = $1")
            .bind(id)
            .execute(db)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_long_alphanumeric_and_distinct() {
        let a = generate_token();
        let b = generate_token();
        assert_eq!(a.len(), TOKEN_LEN);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }
}
