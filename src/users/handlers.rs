use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::auth::extractors::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::repo::PurchaseRecord;

pub fn router() -> Router<AppState> {
    Router::new().route("/users/purchases", get(list_purchases))
}

#[derive(Debug, Serialize)]
pub struct PurchaseItem {
    pub id: Uuid,
    pub is_lifetime: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_title: Option<String>,
    pub amount_cents: i64,
    pub purchased_at: OffsetDateTime,
}

impl From<PurchaseRecord> for PurchaseItem {
    fn from(record: PurchaseRecord) -> Self {
        PurchaseItem {
            id: record.id,
            is_lifetime: record.document_id.is_none(),
            document_id: record.document_id,
            document_title: record.document_title,
            amount_cents: record.amount_cents,
            purchased_at: record.created_at,
        }
    }
}

/// GET /users/purchases: the caller's completed purchases, lifetime grant
/// included, newest first.
#[instrument(skip(state))]
pub async fn list_purchases(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<Vec<PurchaseItem>>, ApiError> {
    let purchases = PurchaseRecord::list_for_user(&state.db, user.id).await?;
    Ok(Json(purchases.into_iter().map(PurchaseItem::from).collect()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifetime_rows_are_flagged() {
        let record = PurchaseRecord {
            id: Uuid::new_v4(),
            document_id: None,
            document_title: None,
            amount_cents: 9900,
            created_at: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        };
        let item = PurchaseItem::from(record);
        assert!(item.is_lifetime);
        assert!(item.document_id.is_none());
    }

    #[test]
    fn document_rows_carry_their_title() {
        let document_id = Uuid::new_v4();
        let record = PurchaseRecord {
            id: Uuid::new_v4(),
            document_id: Some(document_id),
            document_title: Some("Quarterly Report".into()),
            amount_cents: 1500,
            created_at: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
        };
        let item = PurchaseItem::from(record);
        assert!(!item.is_lifetime);
        assert_eq!(item.document_id, Some(document_id));
        assert_eq!(item.document_title.as_deref(), Some("Quarterly Report"));
    }
}
