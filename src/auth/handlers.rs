use axum::{
    extract::{FromRef, State},
    routing::{get, post, put},
    Json, Router,
};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::auth::{
    dto::{
        AdminLoginRequest, AuthResponse, GoogleLoginRequest, RefreshRequest, RefreshResponse,
        SetPasswordRequest, UpdateProfileRequest, UserProfile,
    },
    extractors::{AdminUser, AuthUser},
    jwt::JwtKeys,
    password::{hash_password, verify_password, MIN_PASSWORD_LEN},
    repo::User,
};
use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/auth/google", post(google_login))
        .route("/auth/admin/login", post(admin_login))
        .route("/auth/admin/password", post(set_admin_password))
        .route("/auth/refresh", post(refresh))
        .route("/auth/profile", get(get_profile))
        .route("/auth/profile", put(update_profile))
}

fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

fn issue_pair(keys: &JwtKeys, user: &User) -> Result<(String, String), ApiError> {
    let access = keys
        .sign_access(user.id, &user.email, user.role())
        .map_err(|e| {
            error!(error = %e, "jwt sign access failed");
            ApiError::Config("token signing failed".into())
        })?;
    let refresh = keys
        .sign_refresh(user.id, &user.email, user.role())
        .map_err(|e| {
            error!(error = %e, "jwt sign refresh failed");
            ApiError::Config("token signing failed".into())
        })?;
    Ok((access, refresh))
}

/// POST /auth/google: verify a Google ID token, create the user on first
/// sight, and issue an access/refresh pair.
#[instrument(skip(state, payload))]
pub async fn google_login(
    State(state): State<AppState>,
    Json(payload): Json<GoogleLoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    let identity = state.identity.verify(&payload.id_token).await?;

    if !identity.email_verified {
        warn!(email = %identity.email, "google account email not verified");
        return Err(ApiError::Unauthorized(
            "Email not verified with Google".into(),
        ));
    }

    let user = match User::find_by_email(&state.db, &identity.email).await? {
        Some(user) => {
            info!(user_id = %user.id, "existing user logged in via Google");
            user
        }
        None => {
            let user = User::create_from_identity(
                &state.db,
                &identity.email,
                identity.name.as_deref().unwrap_or(""),
                &identity.subject,
                identity.picture.as_deref(),
            )
            .await?;
            info!(user_id = %user.id, "new user created via Google");
            user
        }
    };

    let keys = JwtKeys::from_ref(&state);
    let (access_token, refresh_token) = issue_pair(&keys, &user)?;

    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: UserProfile::from(&user),
    }))
}

/// POST /auth/admin/login: password login, admins only.
///
/// The failure message is identical whether the email is unknown, the role
/// is not admin, no password is set, or the password mismatches.
#[instrument(skip(state, payload))]
pub async fn admin_login(
    State(state): State<AppState>,
    Json(mut payload): Json<AdminLoginRequest>,
) -> Result<Json<AuthResponse>, ApiError> {
    payload.email = payload.email.trim().to_lowercase();
    let invalid = || ApiError::Unauthorized("Invalid email or password".into());

    if !is_valid_email(&payload.email) {
        return Err(invalid());
    }

    let user = User::find_by_email(&state.db, &payload.email)
        .await?
        .ok_or_else(invalid)?;

    if !user.is_admin() {
        warn!(user_id = %user.id, "password login attempt for non-admin");
        return Err(invalid());
    }

    let hash = user.password_hash.as_deref().ok_or_else(invalid)?;
    let ok = verify_password(&payload.password, hash).map_err(|e| {
        error!(error = %e, "verify_password failed");
        ApiError::Unauthorized("Invalid email or password".into())
    })?;
    if !ok {
        warn!(user_id = %user.id, "admin login invalid password");
        return Err(invalid());
    }

    let keys = JwtKeys::from_ref(&state);
    let (access_token, refresh_token) = issue_pair(&keys, &user)?;

    info!(user_id = %user.id, "admin logged in via password");
    Ok(Json(AuthResponse {
        access_token,
        refresh_token,
        user: UserProfile::from(&user),
    }))
}

/// POST /auth/refresh: exchange a refresh token for a fresh access token.
#[instrument(skip(state, payload))]
pub async fn refresh(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> Result<Json<RefreshResponse>, ApiError> {
    let keys = JwtKeys::from_ref(&state);
    let claims = keys
        .verify_refresh(&payload.refresh_token)
        .map_err(|_| ApiError::Unauthorized("Invalid or expired refresh token".into()))?;

    let user = User::find_by_email(&state.db, &claims.email)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    let access_token = keys
        .sign_access(user.id, &user.email, user.role())
        .map_err(|e| {
            error!(error = %e, "jwt sign access failed");
            ApiError::Config("token signing failed".into())
        })?;

    Ok(Json(RefreshResponse { access_token }))
}

/// POST /auth/admin/password: set or change the caller's password.
/// Changing an existing password requires the current one.
#[instrument(skip(state, payload))]
pub async fn set_admin_password(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<SetPasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if payload.new_password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::Validation(format!(
            "Password must be at least {} characters long",
            MIN_PASSWORD_LEN
        )));
    }

    let user = User::find_by_id(&state.db, admin.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    if let Some(existing_hash) = user.password_hash.as_deref() {
        let current = payload
            .current_password
            .as_deref()
            .ok_or_else(|| ApiError::Validation("Current password is required".into()))?;
        let ok = verify_password(current, existing_hash).map_err(|e| {
            error!(error = %e, "verify_password failed");
            ApiError::Unauthorized("Current password is incorrect".into())
        })?;
        if !ok {
            return Err(ApiError::Unauthorized("Current password is incorrect".into()));
        }
    }

    let hash = hash_password(&payload.new_password).map_err(|e| {
        error!(error = %e, "hash_password failed");
        ApiError::Config("password hashing failed".into())
    })?;
    User::set_password_hash(&state.db, user.id, &hash).await?;

    info!(user_id = %user.id, "admin password updated");
    Ok(Json(serde_json::json!({ "success": true })))
}

/// GET /auth/profile
#[instrument(skip(state))]
pub async fn get_profile(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<UserProfile>, ApiError> {
    let user = User::find_by_id(&state.db, user.id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".into()))?;
    Ok(Json(UserProfile::from(&user)))
}

/// PUT /auth/profile: update industry/contact/address.
#[instrument(skip(state, payload))]
pub async fn update_profile(
    State(state): State<AppState>,
    user: AuthUser,
    Json(payload): Json<UpdateProfileRequest>,
) -> Result<Json<UserProfile>, ApiError> {
    let updated = User::update_profile(
        &state.db,
        user.id,
        payload.industry.as_deref(),
        payload.contact.as_deref(),
        payload.address.as_deref(),
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("User not found".into()))?;

    Ok(Json(UserProfile::from(&updated)))
}
