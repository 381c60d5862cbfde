use axum::{
    extract::{Path, State},
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::extractors::{AdminUser, AuthUser};
use crate::documents::dto::DocumentListItem;
use crate::documents::repo::Document;
use crate::error::ApiError;
use crate::folders::repo::Folder;
use crate::folders::tree::{
    build_forest, resolve_path, validate_move, validate_name, FolderNode, MoveError, PathSegment,
};
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/folders/tree", get(get_tree))
        .route("/folders/:id", get(get_folder))
        .route("/folders/:id/documents", get(get_folder_documents))
        .route("/folders/:id/path", get(get_folder_path))
        .route("/folders", post(create_folder))
        .route("/folders/:id", put(rename_folder))
        .route("/folders/:id", delete(delete_folder))
        .route("/folders/:id/move", put(move_folder))
}

/// GET /folders/tree: the full forest from one flat fetch.
#[instrument(skip(state))]
pub async fn get_tree(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<Vec<FolderNode>>, ApiError> {
    let folders = Folder::list_all(&state.db).await?;
    Ok(Json(build_forest(folders)))
}

#[instrument(skip(state))]
pub async fn get_folder(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Folder>, ApiError> {
    let folder = Folder::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Folder not found".into()))?;
    Ok(Json(folder))
}

#[derive(Debug, Serialize)]
pub struct FolderWithDocuments {
    #[serde(flatten)]
    pub folder: Folder,
    pub documents: Vec<DocumentListItem>,
}

/// GET /folders/:id/documents: the folder plus its active documents.
#[instrument(skip(state))]
pub async fn get_folder_documents(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<FolderWithDocuments>, ApiError> {
    let folder = Folder::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Folder not found".into()))?;
    let documents = Document::active_in_folder(&state.db, id)
        .await?
        .into_iter()
        .map(DocumentListItem::from)
        .collect();
    Ok(Json(FolderWithDocuments { folder, documents }))
}

/// GET /folders/:id/path: breadcrumb from root to the folder.
#[instrument(skip(state))]
pub async fn get_folder_path(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<PathSegment>>, ApiError> {
    let folders = Folder::list_all(&state.db).await?;
    let path = resolve_path(&folders, id)
        .ok_or_else(|| ApiError::NotFound("Folder not found".into()))?;
    Ok(Json(path))
}

#[derive(Debug, Deserialize)]
pub struct CreateFolderRequest {
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<Uuid>,
}

#[instrument(skip(state, payload))]
pub async fn create_folder(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Json(payload): Json<CreateFolderRequest>,
) -> Result<Json<Folder>, ApiError> {
    let name = validate_name(&payload.name).map_err(ApiError::Validation)?;

    if let Some(parent_id) = payload.parent_id {
        Folder::find_by_id(&state.db, parent_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Parent folder does not exist".into()))?;
    }

    let folder = Folder::create(&state.db, &name, payload.parent_id, admin.id).await?;
    info!(folder_id = %folder.id, admin_id = %admin.id, "folder created");
    Ok(Json(folder))
}

#[derive(Debug, Deserialize)]
pub struct RenameFolderRequest {
    pub name: String,
}

#[instrument(skip(state, payload))]
pub async fn rename_folder(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<RenameFolderRequest>,
) -> Result<Json<Folder>, ApiError> {
    let name = validate_name(&payload.name).map_err(ApiError::Validation)?;
    let folder = owned_folder(&state, id, admin.id).await?;

    let renamed = Folder::rename(&state.db, folder.id, &name)
        .await?
        .ok_or_else(|| ApiError::NotFound("Folder not found".into()))?;
    info!(folder_id = %id, admin_id = %admin.id, "folder renamed");
    Ok(Json(renamed))
}

/// DELETE /folders/:id: strict policy: deletion is refused while the
/// folder has any child folder or any active document.
#[instrument(skip(state))]
pub async fn delete_folder(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let folder = owned_folder(&state, id, admin.id).await?;

    let child_folders = Folder::count_children(&state.db, folder.id).await?;
    if child_folders > 0 {
        return Err(ApiError::Conflict(format!(
            "Cannot delete folder: it contains {} subfolder(s)",
            child_folders
        )));
    }
    let active_docs = Document::count_active_in_folder(&state.db, folder.id).await?;
    if active_docs > 0 {
        return Err(ApiError::Conflict(format!(
            "Cannot delete folder: it contains {} document(s)",
            active_docs
        )));
    }

    Folder::delete(&state.db, folder.id).await?;
    info!(folder_id = %id, admin_id = %admin.id, "folder deleted");
    Ok(Json(serde_json::json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
pub struct MoveFolderRequest {
    #[serde(default)]
    pub new_parent_id: Option<Uuid>,
}

/// PUT /folders/:id/move: re-parent with the cycle guard. The descendant
/// walk and the parent-pointer write share one transaction so a concurrent
/// move cannot slip a cycle in between.
#[instrument(skip(state, payload))]
pub async fn move_folder(
    State(state): State<AppState>,
    AdminUser(admin): AdminUser,
    Path(id): Path<Uuid>,
    Json(payload): Json<MoveFolderRequest>,
) -> Result<Json<Folder>, ApiError> {
    let folder = owned_folder(&state, id, admin.id).await?;

    if let Some(parent_id) = payload.new_parent_id {
        let parent = Folder::find_by_id(&state.db, parent_id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Target parent folder does not exist".into()))?;
        if parent.admin_id != admin.id {
            return Err(ApiError::Forbidden(
                "Cannot move folder into another admin's folder".into(),
            ));
        }
    }

    let mut tx = state.db.begin().await?;
    let folders = Folder::list_all_for_update(&mut tx).await?;

    validate_move(&folders, folder.id, payload.new_parent_id).map_err(|e| match e {
        MoveError::SelfParent => ApiError::Validation("Cannot move a folder into itself".into()),
        MoveError::CircularReference => {
            ApiError::Conflict("Cannot move a folder into its own descendant".into())
        }
    })?;

    let moved = Folder::set_parent(&mut tx, folder.id, payload.new_parent_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Folder not found".into()))?;
    tx.commit().await?;

    info!(
        folder_id = %id,
        new_parent = ?payload.new_parent_id,
        admin_id = %admin.id,
        "folder moved"
    );
    Ok(Json(moved))
}

async fn owned_folder(state: &AppState, id: Uuid, admin_id: Uuid) -> Result<Folder, ApiError> {
    let folder = Folder::find_by_id(&state.db, id)
        .await?
        .ok_or_else(|| ApiError::NotFound("Folder not found".into()))?;
    if folder.admin_id != admin_id {
        return Err(ApiError::Forbidden(
            "You can only modify your own folders".into(),
        ));
    }
    Ok(folder)
}
