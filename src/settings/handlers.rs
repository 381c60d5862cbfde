use axum::{
    extract::{Path, State},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use tracing::{info, instrument};

use crate::auth::extractors::AdminUser;
use crate::error::ApiError;
use crate::settings::repo::Setting;
use crate::settings::service::{validate_setting_value, LIFETIME_PRICE_KEY};
use crate::state::AppState;

/// Keys readable without authentication.
const PUBLIC_KEYS: &[&str] = &[LIFETIME_PRICE_KEY];

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/settings/public/:key", get(get_public_setting))
        .route("/settings", get(list_settings).post(create_setting))
        .route("/settings/:key", get(get_setting).put(update_setting))
}

/// GET /settings/public/:key: whitelisted keys only, no authentication.
#[instrument(skip(state))]
pub async fn get_public_setting(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Setting>, ApiError> {
    if !PUBLIC_KEYS.contains(&key.as_str()) {
        return Err(ApiError::Forbidden(
            "This setting is not publicly accessible".into(),
        ));
    }
    let setting = Setting::find(&state.db, &key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Setting \"{}\" not found", key)))?;
    Ok(Json(setting))
}

#[instrument(skip(state))]
pub async fn list_settings(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<Vec<Setting>>, ApiError> {
    Ok(Json(Setting::list(&state.db).await?))
}

#[instrument(skip(state))]
pub async fn get_setting(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
    Path(key): Path<String>,
) -> Result<Json<Setting>, ApiError> {
    let setting = Setting::find(&state.db, &key)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Setting \"{}\" not found", key)))?;
    Ok(Json(setting))
}

#[derive(Debug, Deserialize)]
pub struct UpdateSettingRequest {
    pub value: String,
}

#[instrument(skip(state, payload))]
pub async fn update_setting(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(key): Path<String>,
    Json(payload): Json<UpdateSettingRequest>,
) -> Result<Json<Setting>, ApiError> {
    let value = validate_setting_value(&key, &payload.value)?;
    let setting = Setting::update_value(&state.db, &key, &value)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Setting \"{}\" not found", key)))?;
    info!(key = %key, admin_id = %admin.id, "setting updated");
    Ok(Json(setting))
}

#[derive(Debug, Deserialize)]
pub struct CreateSettingRequest {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[instrument(skip(state, payload))]
pub async fn create_setting(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<CreateSettingRequest>,
) -> Result<Json<Setting>, ApiError> {
    let key = payload.key.trim().to_string();
    if key.is_empty() {
        return Err(ApiError::Validation("Setting key cannot be empty".into()));
    }
    let value = validate_setting_value(&key, &payload.value)?;
    let setting = Setting::create(&state.db, &key, &value, payload.description.as_deref())
        .await
        .map_err(|e| match &e {
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                ApiError::Conflict(format!("Setting \"{}\" already exists", key))
            }
            _ => ApiError::Database(e),
        })?;
    info!(key = %key, admin_id = %admin.id, "setting created");
    Ok(Json(setting))
}
