use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::documents::repo::Document;

/// Listing row. Listings never carry the storage locator.
#[derive(Debug, Serialize)]
pub struct DocumentListItem {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub folder_id: Option<Uuid>,
    pub status: String,
    pub is_visible: bool,
    pub created_at: OffsetDateTime,
}

impl From<Document> for DocumentListItem {
    fn from(d: Document) -> Self {
        Self {
            id: d.id,
            title: d.title,
            description: d.description,
            price_cents: d.price_cents,
            folder_id: d.folder_id,
            status: d.status,
            is_visible: d.is_visible,
            created_at: d.created_at,
        }
    }
}

/// Full record for admins: every field plus a download URL.
#[derive(Debug, Serialize)]
pub struct AdminDocumentView {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub admin_id: Uuid,
    pub folder_id: Option<Uuid>,
    pub status: String,
    pub is_visible: bool,
    pub file_url: String,
    pub has_access: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// View for a non-admin who has purchased access. Carries the download URL.
#[derive(Debug, Serialize)]
pub struct GrantedDocumentView {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub folder_id: Option<Uuid>,
    pub has_access: bool,
    pub file_url: String,
    pub created_at: OffsetDateTime,
}

/// View for a non-admin without access. There is no locator field on this
/// type, so redaction holds by construction.
#[derive(Debug, Serialize)]
pub struct RestrictedDocumentView {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub price_cents: i64,
    pub folder_id: Option<Uuid>,
    pub has_access: bool,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DocumentView {
    Admin(AdminDocumentView),
    Granted(GrantedDocumentView),
    Restricted(RestrictedDocumentView),
}

#[derive(Debug, Deserialize)]
pub struct ListDocumentsQuery {
    #[serde(default)]
    pub folder_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateDocumentRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price_cents: Option<i64>,
    /// Absent leaves the folder unchanged; an explicit `null` moves the
    /// document back to the root.
    #[serde(default, deserialize_with = "double_option")]
    pub folder_id: Option<Option<Uuid>>,
    pub is_visible: Option<bool>,
}

fn double_option<'de, D>(deserializer: D) -> Result<Option<Option<Uuid>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

#[derive(Debug, Serialize)]
pub struct AccessCheckResponse {
    pub has_access: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_updates_distinguish_null_from_absent() {
        let absent: UpdateDocumentRequest = serde_json::from_str(r#"{"title":"t"}"#).unwrap();
        assert_eq!(absent.folder_id, None);

        let cleared: UpdateDocumentRequest =
            serde_json::from_str(r#"{"folder_id":null}"#).unwrap();
        assert_eq!(cleared.folder_id, Some(None));

        let folder = Uuid::new_v4();
        let moved: UpdateDocumentRequest =
            serde_json::from_str(&format!(r#"{{"folder_id":"{folder}"}}"#)).unwrap();
        assert_eq!(moved.folder_id, Some(Some(folder)));
    }
}
