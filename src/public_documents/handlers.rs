use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Serialize;
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::auth::extractors::AdminUser;
use crate::error::ApiError;
use crate::public_documents::repo::{generate_token, PublicDocument};
use crate::state::AppState;
use crate::storage::PDF_CONTENT_TYPE;

const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/public-documents",
            post(upload_public_document).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/public-documents", get(list_public_documents))
        .route("/public-documents/:id/toggle", put(toggle_public_document))
        .route("/public-documents/:id", delete(delete_public_document))
        .route("/public/documents/:token", get(get_by_token))
}

/// POST /public-documents: multipart upload: `file` (PDF), `title`,
/// `description`. A fresh share token is generated server-side.
#[instrument(skip(state, multipart))]
pub async fn upload_public_document(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    mut multipart: Multipart,
) -> Result<Json<PublicDocument>, ApiError> {
    let mut title = None;
    let mut description = String::new();
    let mut file: Option<bytes::Bytes> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed multipart body: {}", e)))?
    {
        match field.name() {
            Some("title") => {
                title = Some(read_text(field).await?);
            }
            Some("description") => {
                description = read_text(field).await?;
            }
            Some("file") => {
                let content_type = field.content_type().unwrap_or_default().to_string();
                if content_type != PDF_CONTENT_TYPE {
                    return Err(ApiError::Validation("Only PDF files are accepted".into()));
                }
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::Validation(format!("file read failed: {}", e)))?;
                file = Some(data);
            }
            _ => {}
        }
    }

    let title = title
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| ApiError::Validation("Document title is required".into()))?;
    let file = file.ok_or_else(|| ApiError::Validation("Document file is required".into()))?;

    let file_key = format!("public/{}/{}.pdf", admin.id, Uuid::new_v4());
    state.storage.put_pdf(&file_key, file).await?;

    let doc = PublicDocument::create(
        &state.db,
        &generate_token(),
        title.trim(),
        description.trim(),
        &file_key,
        admin.id,
    )
    .await?;

    info!(public_document_id = %doc.id, admin_id = %admin.id, "public document uploaded");
    Ok(Json(doc))
}

/// GET /public-documents: admin listing, inactive entries included.
#[instrument(skip(state))]
pub async fn list_public_documents(
    State(state): State<AppState>,
    AdminUser(_admin): AdminUser,
) -> Result<Json<Vec<PublicDocument>>, ApiError> {
    Ok(Json(PublicDocument::list_all(&state.db).await?))
}

/// PUT /public-documents/:id/toggle: flip the share link on or off
/// without invalidating the token.
#[instrument(skip(state))]
pub async fn toggle_public_document(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<PublicDocument>, ApiError> {
    let doc = owned_public_document(&state, id, admin.id).await?;
    let updated = PublicDocument::set_active(&state.db, doc.id, !doc.is_active)
        .await?
        .ok_or_else(|| ApiError::NotFound("Public document not found".into()))?;
    info!(
        public_document_id = %id,
        is_active = updated.is_active,
        admin_id = %admin.id,
        "public document toggled"
    );
    Ok(Json(updated))
}

/// DELETE /public-documents/:id: removes the row and the stored file.
#[instrument(skip(state))]
pub async fn delete_public_document(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let doc = owned_public_document(&state, id, admin.id).await?;

    if let Err(e) = state.storage.delete_object(&doc.file_key).await {
        // The row still goes away; an orphaned object is recoverable.
        error!(error = %e, file_key = %doc.file_key, "storage delete failed");
    }
    PublicDocument::delete(&state.db, doc.id).await?;

    info!(public_document_id = %id, admin_id = %admin.id, "public document deleted");
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Debug, Serialize)]
pub struct SharedDocumentResponse {
    pub title: String,
    pub description: String,
    pub file_url: String,
}

/// GET /public/documents/:token: unauthenticated fetch by share token.
/// Unknown and deactivated tokens are indistinguishable.
#[instrument(skip(state))]
pub async fn get_by_token(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<SharedDocumentResponse>, ApiError> {
    let doc = PublicDocument::find_by_token(&state.db, &token)
        .await?
        .filter(|d| d.is_active)
        .ok_or_else(|| ApiError::NotFound("Document not found".into()))?;

    let file_url = state.storage.presign_download(&doc.file_key).await?;

    Ok(Json(SharedDocumentResponse {
        title: doc.title,
        description: doc.description,
        file_url,
    }))
}

async fn owned_public_document(
    state: &AppState,
    id: Uuid,
    admin_id: Uuid,
) -> Result<PublicDocument, ApiError> {
    let doc = PublicDocument::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Public document not found".into()))?;
    if doc.admin_id != admin_id {
        return Err(ApiError::Forbidden(
            "You can only modify your own public documents".into(),
        ));
    }
    Ok(doc)
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed multipart field: {}", e)))
}
