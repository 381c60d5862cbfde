use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, Query, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::claims::Role;
use crate::auth::extractors::{AdminUser, AuthUser, OptionalAuthUser};
use crate::documents::dto::{
    AccessCheckResponse, DocumentListItem, DocumentView, ListDocumentsQuery, UpdateDocumentRequest,
};
use crate::documents::repo::Document;
use crate::documents::service::build_view;
use crate::entitlements;
use crate::error::ApiError;
use crate::folders::repo::Folder;
use crate::state::AppState;
use crate::storage::PDF_CONTENT_TYPE;

/// Uploads are PDF-only and capped at 50 MB at this boundary.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/documents", get(list_documents))
        .route("/documents/:id", get(get_document))
        .route("/documents/:id/access", get(check_access))
        .route(
            "/documents",
            post(upload_document).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/documents/:id", put(update_document))
        .route("/documents/:id", delete(delete_document))
}

/// GET /documents: browse listing. Anonymous and regular callers see
/// active, visible documents only; admins see everything.
#[instrument(skip(state))]
pub async fn list_documents(
    State(state): State<AppState>,
    OptionalAuthUser(user): OptionalAuthUser,
    Query(q): Query<ListDocumentsQuery>,
) -> Result<Json<Vec<DocumentListItem>>, ApiError> {
    let admin = user.as_ref().is_some_and(|u| u.role == Role::Admin);
    let docs = Document::list(&state.db, q.folder_id, admin).await?;
    Ok(Json(docs.into_iter().map(DocumentListItem::from).collect()))
}

/// GET /documents/:id: document view with the access decision applied.
#[instrument(skip(state))]
pub async fn get_document(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentView>, ApiError> {
    let doc = Document::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Document not found".into()))?;

    if user.role == Role::Admin {
        let url = state.storage.presign_download(&doc.file_key).await?;
        return Ok(Json(build_view(doc, Role::Admin, true, Some(url))));
    }

    // Inactive documents do not exist for non-admin readers.
    if !doc.is_active() {
        return Err(ApiError::NotFound("Document not found".into()));
    }

    let has_access = entitlements::has_access(&state.db, user.id, Some(doc.id)).await?;
    let url = if has_access {
        Some(state.storage.presign_download(&doc.file_key).await?)
    } else {
        None
    };
    Ok(Json(build_view(doc, Role::User, has_access, url)))
}

/// GET /documents/:id/access
#[instrument(skip(state))]
pub async fn check_access(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<AccessCheckResponse>, ApiError> {
    let has_access = user.role == Role::Admin
        || entitlements::has_access(&state.db, user.id, Some(id)).await?;
    Ok(Json(AccessCheckResponse { has_access }))
}

/// POST /documents: multipart upload: `file` (PDF) plus `title`,
/// `description`, `price_cents`, `folder_id` fields.
#[instrument(skip(state, multipart))]
pub async fn upload_document(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    mut multipart: Multipart,
) -> Result<Json<DocumentListItem>, ApiError> {
    let mut title = None;
    let mut description = String::new();
    let mut price_cents: i64 = 0;
    let mut folder_id = None;
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
            Some("price_cents") => {
                let raw = read_text(field).await?;
                price_cents = raw
                    .trim()
                    .parse()
                    .map_err(|_| ApiError::Validation("price_cents must be an integer".into()))?;
            }
            Some("folder_id") => {
                let raw = read_text(field).await?;
                folder_id = Some(
                    raw.trim()
                        .parse::<Uuid>()
                        .map_err(|_| ApiError::Validation("Invalid folder ID".into()))?,
                );
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
    if price_cents < 0 {
        return Err(ApiError::Validation("Price must be non-negative".into()));
    }
    if let Some(folder_id) = folder_id {
        Folder::find_by_id(&state.db, folder_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Folder not found".into()))?;
    }

    let file_key = format!("{}/{}.pdf", admin.id, Uuid::new_v4());
    state.storage.put_pdf(&file_key, file).await?;

    let doc = Document::create(
        &state.db,
        title.trim(),
        description.trim(),
        price_cents,
        &file_key,
        admin.id,
        folder_id,
    )
    .await?;

    info!(document_id = %doc.id, admin_id = %admin.id, "document uploaded");
    Ok(Json(DocumentListItem::from(doc)))
}

/// PUT /documents/:id
#[instrument(skip(state, payload))]
pub async fn update_document(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<UpdateDocumentRequest>,
) -> Result<Json<DocumentListItem>, ApiError> {
    if let Some(price) = payload.price_cents {
        if price < 0 {
            return Err(ApiError::Validation("Price must be non-negative".into()));
        }
    }
    if let Some(Some(folder_id)) = payload.folder_id {
        Folder::find_by_id(&state.db, folder_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Folder not found".into()))?;
    }

    let doc = Document::update(
        &state.db,
        id,
        payload.title.as_deref(),
        payload.description.as_deref(),
        payload.price_cents,
        payload.folder_id,
        payload.is_visible,
    )
    .await?
    .ok_or_else(|| ApiError::NotFound("Document not found".into()))?;

    info!(document_id = %doc.id, admin_id = %admin.id, "document updated");
    Ok(Json(DocumentListItem::from(doc)))
}

/// DELETE /documents/:id: soft delete.
#[instrument(skip(state))]
pub async fn delete_document(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<DocumentListItem>, ApiError> {
    let doc = Document::soft_delete(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Document not found".into()))?;
    info!(document_id = %doc.id, admin_id = %admin.id, "document soft-deleted");
    Ok(Json(DocumentListItem::from(doc)))
}

async fn read_text(field: axum::extract::multipart::Field<'_>) -> Result<String, ApiError> {
    field
        .text()
        .await
        .map_err(|e| ApiError::Validation(format!("malformed multipart field: {}", e)))
}
