use crate::state::AppState;
use axum::Router;

pub(crate) mod dto;
pub(crate) mod extractors;
pub mod handlers;
pub mod services;
pub mod tokens;

pub fn router() -> Router<AppState> {
    handlers::auth_routes()
}
