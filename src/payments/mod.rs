use crate::state::AppState;
use axum::Router;

pub mod handlers;
pub mod provider;
pub mod repo;
pub mod service;
pub mod stripe;
pub mod webhook;

pub fn router() -> Router<AppState> {
    handlers::router()
}
