use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Setting {
    pub key: String,
    pub value: String,
    pub description: Option<String>,
    pub updated_at: OffsetDateTime,
}

impl Setting {
    pub async fn list(db: &PgPool) -> sqlx::Result<Vec<Setting>> {
        sqlx::query_as::<_, Setting>(
            "SELECT key, value, description, updated_at FROM settings ORDER BY key",
        )
        .fetch_all(db)
        .await
    }

    pub async fn find(db: &PgPool, key: &str) -> sqlx::Result<Option<Setting>> {
        sqlx::query_as::<_, Setting>(
            "SELECT key, value, description, updated_at FROM settings WHERE key = $1",
        )
        .bind(key)
        .fetch_optional(db)
        .await
    }

    pub async fn update_value(db: &PgPool, key: &str, value: &str) -> sqlx::Result<Option<Setting>> {
        sqlx::query_as::<_, Setting>(
            r#"
            UPDATE settings SET value = $2, updated_at = now()
            WHERE key = $1
            RETURNING key, value, description, updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .fetch_optional(db)
        .await
    }

    pub async fn create(
        db: &PgPool,
        key: &str,
        value: &str,
        description: Option<&str>,
    ) -> sqlx::Result<Setting> {
        sqlx::query_as::<_, Setting>(
            r#"
            INSERT INTO settings (key, value, description)
            VALUES ($1, $2, $3)
            RETURNING key, value, description, updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(description)
        .fetch_one(db)
        .await
    }
}
