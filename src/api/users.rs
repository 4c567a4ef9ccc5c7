use axum::{
    extract::State,
    routing::get,
    Json, Router,
};

use crate::api::extract::{PathParam, QueryParams};
use crate::auth::CurrentUser;
use crate::error::{AppError, Result};
use crate::models::{Pagination, User};
use crate::state::AppState;

/// User routes
pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/", get(list_users))
        .route("/users/{user_id}", get(get_user))
}

/// GET /users/ - List active users
async fn list_users(
    State(state): State<AppState>,
    _user: CurrentUser,
    QueryParams(page): QueryParams<Pagination>,
) -> Result<Json<Vec<User>>> {
    let users = state
        .store
        .list_active_users(page.skip(), page.limit())
        .await?;
    Ok(Json(users))
}

/// GET /users/:user_id - Get a user
async fn get_user(
    State(state): State<AppState>,
    _user: CurrentUser,
    PathParam(user_id): PathParam<i64>,
) -> Result<Json<User>> {
    let user = state
        .store
        .get_user(user_id)
        .await?
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(user))
}
