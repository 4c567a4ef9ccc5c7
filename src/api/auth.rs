use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};

use crate::api::extract::{FormBody, JsonBody};
use crate::auth::{authenticate_user, register_user, CurrentUser};
use crate::error::{AppError, Result};
use crate::models::{LoginForm, RegisterRequest, TokenResponse, User};
use crate::state::AppState;

/// Auth routes
pub fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(register))
        .route("/auth/login", post(login))
        .route("/auth/me", get(me))
}

/// POST /auth/register - Create an account
async fn register(
    State(state): State<AppState>,
    JsonBody(request): JsonBody<RegisterRequest>,
) -> Result<Json<User>> {
    let user = register_user(&state.store, request).await?;
    Ok(Json(user))
}

/// POST /auth/login - Exchange form credentials for an access token
async fn login(
    State(state): State<AppState>,
    FormBody(form): FormBody<LoginForm>,
) -> Result<Json<TokenResponse>> {
    let user = authenticate_user(&state.store, &form.username, &form.password).await?;
    if !user.is_active {
        return Err(AppError::BadRequest("Inactive user".to_string()));
    }

    let token = state.auth.generate_token(&user.username)?;
    tracing::info!(user = %user.username, "User logged in");

    Ok(Json(TokenResponse::bearer(token)))
}

/// GET /auth/me - Current user
async fn me(CurrentUser(user): CurrentUser) -> Json<User> {
    Json(user)
}
