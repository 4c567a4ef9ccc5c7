pub mod auth;
pub mod extract;
pub mod health;
pub mod rooms;
pub mod users;

use axum::Router;

use crate::state::AppState;

/// Create the router with all routes
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::health_routes())
        .merge(auth::auth_routes())
        .merge(rooms::room_routes())
        .merge(users::user_routes())
        .with_state(state)
}
