use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::claims::Role;

/// User record in the database.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: String,
    #[serde(skip_serializing)]
    pub password_hash: Option<String>, // Argon2 hash, admin accounts only
    pub google_id: Option<String>,
    pub picture: Option<String>,
    pub industry: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl User {
    pub fn role(&self) -> Role {
        Role::parse(&self.role)
    }

    pub fn is_admin(&self) -> bool {
        self.role() == Role::Admin
    }

    /// Derived flag: true iff industry and contact are both non-empty.
    pub fn profile_completed(&self) -> bool {
        let filled = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        filled(&self.industry) && filled(&self.contact)
    }
}

const USER_COLUMNS: &str = r#"
    id, email, name, role, password_hash, google_id, picture,
    industry, contact, address, created_at, updated_at
"#;

impl User {
    /// Find a user by case-normalized email.
    pub async fn find_by_email(db: &PgPool, email: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email.trim().to_lowercase())
        .fetch_optional(db)
        .await
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(db)
            .await
    }

    /// Create a user from a verified external identity. New accounts always
    /// get the `user` role; admins are provisioned out of band.
    pub async fn create_from_identity(
        db: &PgPool,
        email: &str,
        name: &str,
        google_id: &str,
        picture: Option<&str>,
    ) -> sqlx::Result<User> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            INSERT INTO users (email, name, role, google_id, picture)
            VALUES ($1, $2, 'user', $3, $4)
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(email.trim().to_lowercase())
        .bind(name)
        .bind(google_id)
        .bind(picture)
        .fetch_one(db)
        .await
    }

    pub async fn set_password_hash(db: &PgPool, id: Uuid, hash: &str) -> sqlx::Result<()> {
        sqlx::query("UPDATE users SET password_hash = $2, updated_at = now() WHERE id = $1")
            .bind(id)
            .bind(hash)
            .execute(db)
            .await?;
        Ok(())
    }

    pub async fn update_profile(
        db: &PgPool,
        id: Uuid,
        industry: Option<&str>,
        contact: Option<&str>,
        address: Option<&str>,
    ) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(&format!(
            r#"
            UPDATE users
            SET industry   = COALESCE($2, industry),
                contact    = COALESCE($3, contact),
                address    = COALESCE($4, address),
                updated_at = now()
            WHERE id = $1
            RETURNING {USER_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(industry)
        .bind(contact)
        .bind(address)
        .fetch_optional(db)
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user_with(industry: Option<&str>, contact: Option<&str>) -> User {
        User {
            id: Uuid::new_v4(),
            email: "u@example.com".into(),
            name: "U".into(),
            role: "user".into(),
            password_hash: None,
            google_id: None,
            picture: None,
            industry: industry.map(str::to_string),
            contact: contact.map(str::to_string),
            address: None,
            created_at: OffsetDateTime::now_utc(),
            updated_at: OffsetDateTime::now_utc(),
        }
    }

    #[test]
    fn profile_completed_requires_both_fields() {
        assert!(user_with(Some("legal"), Some("+123")).profile_completed());
        assert!(!user_with(Some("legal"), None).profile_completed());
        assert!(!user_with(None, Some("+123")).profile_completed());
        assert!(!user_with(Some("  "), Some("+123")).profile_completed());
    }

    #[test]
    fn password_hash_is_never_serialized() {
        let mut user = user_with(None, None);
        user.password_hash = Some("$argon2id$secret".into());
        let json = serde_json::to_string(&user).unwrap();
        assert!(!json.contains("password_hash"));
        assert!(!json.contains("argon2id"));
    }
}
