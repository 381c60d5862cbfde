use crate::state::AppState;
use axum::Router;

pub mod handlers;
pub mod repo;
pub mod tree;

pub fn router() -> Router<AppState> {
    handlers::router()
}
