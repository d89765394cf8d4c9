use axum::Router;

use crate::state::AppState;

pub mod codes;
pub mod dto;
pub mod handlers;
pub mod password;
pub mod repo;
pub mod repo_types;
pub mod services;
pub mod session;
pub mod token;

#[cfg(test)]
pub mod testing;

pub fn router() -> Router<AppState> {
    handlers::account_routes()
}
