use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::claims::Role;
use crate::auth::repo::User;

/// Request body for Google sign-in.
#[derive(Debug, Deserialize)]
pub struct GoogleLoginRequest {
    pub id_token: String,
}

/// Request body for admin email/password login.
#[derive(Debug, Deserialize)]
pub struct AdminLoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for token refresh.
#[derive(Debug, Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

/// Request body for setting or changing the admin password.
#[derive(Debug, Deserialize)]
pub struct SetPasswordRequest {
    pub new_password: String,
    #[serde(default)]
    pub current_password: Option<String>,
}

/// Response returned after login or Google sign-in.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserProfile,
}

/// Response returned after refresh. The refresh credential is not rotated.
#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub access_token: String,
}

/// Public part of the user returned to the client.
#[derive(Debug, Serialize)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub picture: Option<String>,
    pub industry: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,
    pub profile_completed: bool,
    pub created_at: OffsetDateTime,
}

impl From<&User> for UserProfile {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            email: user.email.clone(),
            name: user.name.clone(),
            role: user.role(),
            picture: user.picture.clone(),
            industry: user.industry.clone(),
            contact: user.contact.clone(),
            address: user.address.clone(),
            profile_completed: user.profile_completed(),
            created_at: user.created_at,
        }
    }
}

/// Request body for profile updates.
#[derive(Debug, Deserialize)]
pub struct UpdateProfileRequest {
    pub industry: Option<String>,
    pub contact: Option<String>,
    pub address: Option<String>,
}
