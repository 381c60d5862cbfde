use sqlx::PgPool;

use crate::error::ApiError;
use crate::settings::repo::Setting;

/// Key holding the lifetime-access price. The only setting readable
/// without authentication.
pub const LIFETIME_PRICE_KEY: &str = "lifetime_subscription_price";

/// Allowed range for the lifetime price, in cents ($1 .. $9999).
pub const MIN_PRICE_CENTS: i64 = 100;
pub const MAX_PRICE_CENTS: i64 = 999_900;

/// The configured lifetime price in cents. An absent or unparseable value
/// is a configuration error: checkout must abort rather than fall back to
/// a silent default price.
pub async fn lifetime_price_cents(db: &PgPool) -> Result<i64, ApiError> {
    let setting = Setting::find(db, LIFETIME_PRICE_KEY)
        .await?
        .ok_or_else(|| ApiError::Config("lifetime_subscription_price is not configured".into()))?;
    parse_price_cents(&setting.value)
        .ok_or_else(|| ApiError::Config("lifetime_subscription_price is not a valid price".into()))
}

/// Parses a stored price value into cents. Accepts plain cents ("2999")
/// or a decimal dollar amount ("29.99").
pub fn parse_price_cents(value: &str) -> Option<i64> {
    let value = value.trim();
    if let Some((dollars, cents)) = value.split_once('.') {
        if cents.len() != 2 {
            return None;
        }
        let dollars: i64 = dollars.parse().ok()?;
        let cents: i64 = cents.parse().ok()?;
        Some(dollars * 100 + cents)
    } else {
        value.parse().ok()
    }
}

/// Validates a new value for a setting key before persisting it.
pub fn validate_setting_value(key: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::Validation("Setting value cannot be empty".into()));
    }
    if key == LIFETIME_PRICE_KEY {
        let cents = parse_price_cents(value)
            .ok_or_else(|| ApiError::Validation("Subscription price must be a number".into()))?;
        if !(MIN_PRICE_CENTS..=MAX_PRICE_CENTS).contains(&cents) {
            return Err(ApiError::Validation(
                "Subscription price must be between $1 and $9999".into(),
            ));
        }
        return Ok(cents.to_string());
    }
    Ok(value.to_string())
}
