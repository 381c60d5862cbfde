use crate::auth::claims::Role;
use crate::documents::dto::{
    AdminDocumentView, DocumentView, GrantedDocumentView, RestrictedDocumentView,
};
use crate::documents::repo::Document;

/// Selects the response shape for a viewer. The restricted type has no
/// locator field at all, so a viewer without access cannot receive one
/// regardless of serialization details.
///
/// `file_url` must be present exactly when the viewer is entitled to the
/// content; callers presign it only after the access decision.
pub fn build_view(
    doc: Document,
    role: Role,
    has_access: bool,
    file_url: Option<String>,
) -> DocumentView {
    match (role, has_access, file_url) {
        (Role::Admin, _, Some(url)) => DocumentView::Admin(AdminDocumentView {
            id: doc.id,
            title: doc.title,
            description: doc.description,
            price_cents: doc.price_cents,
            admin_id: doc.admin_id,
            folder_id: doc.folder_id,
            status: doc.status,
            is_visible: doc.is_visible,
            file_url: url,
            has_access: true,
            created_at: doc.created_at,
            updated_at: doc.updated_at,
        }),
        (Role::User, true, Some(url)) => DocumentView::Granted(GrantedDocumentView {
            id: doc.id,
            title: doc.title,
            description: doc.description,
            price_cents: doc.price_cents,
            folder_id: doc.folder_id,
            has_access: true,
            file_url: url,
            created_at: doc.created_at,
        }),
        _ => DocumentView::Restricted(RestrictedDocumentView {
            id: doc.id,
            title: doc.title,
            description: doc.description,
            price_cents: doc.price_cents,
            folder_id: doc.folder_id,
            has_access: false,
            created_at: doc.created_at,
        }),
    }
}
