use axum::Router;

use crate::state::AppState;

pub mod dto;
pub mod handlers;
pub mod idp;
pub mod password;
pub mod resolver;
pub mod store;
pub mod tokens;

pub fn router() -> Router<AppState> {
    Router::new()
        .merge(handlers::auth_routes())
        .merge(handlers::favorites_routes())
}
