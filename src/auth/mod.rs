use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::RequestPartsExt;
use axum_extra::headers::authorization::Bearer;
use axum_extra::headers::Authorization;
use axum_extra::TypedHeader;
use chrono::Utc;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::config::Config;
use crate::db::Store;
use crate::error::{AppError, Result};
use crate::models::{Claims, RegisterRequest, User};
use crate::security::{hash_password, verify_password};
use crate::state::AppState;

/// JWT Authentication Service
#[derive(Clone)]
pub struct AuthService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    algorithm: Algorithm,
    expiry_seconds: u64,
}

impl AuthService {
    pub fn new(config: &Config) -> Self {
        Self {
            encoding_key: EncodingKey::from_secret(config.jwt_secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.jwt_secret.as_bytes()),
            algorithm: config.jwt_algorithm,
            expiry_seconds: config.access_token_expiry_seconds(),
        }
    }

    /// Generate an access token for `username`
    pub fn generate_token(&self, username: &str) -> Result<String> {
        let now = Utc::now().timestamp();
        let exp = now.saturating_add(i64::try_from(self.expiry_seconds).unwrap_or(i64::MAX));

        let claims = Claims {
            sub: username.to_string(),
            iat: now,
            exp,
        };

        let token = encode(&Header::new(self.algorithm), &claims, &self.encoding_key)?;
        Ok(token)
    }

    /// Validate an access token and return the claims
    pub fn validate_token(&self, token: &str) -> Result<Claims> {
        let validation = Validation::new(self.algorithm);
        let token_data = decode::<Claims>(token, &self.decoding_key, &validation)
            .map_err(|e| AppError::Unauthorized(format!("Could not validate credentials: {}", e)))?;

        Ok(token_data.claims)
    }
}

/// Validate and store a new account
pub async fn register_user(store: &Store, request: RegisterRequest) -> Result<User> {
    let username = request.username.trim();
    if username.is_empty() || username.chars().count() > 50 {
        return Err(AppError::BadRequest(
            "Username must be between 1 and 50 characters".to_string(),
        ));
    }

    let email = request.email.trim();
    if email.chars().count() > 100 || !looks_like_email(email) {
        return Err(AppError::BadRequest("A valid email address is required".to_string()));
    }

    if request.password.is_empty() {
        return Err(AppError::BadRequest("Password is required".to_string()));
    }

    let full_name = request
        .full_name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty());
    if full_name.is_some_and(|n| n.chars().count() > 100) {
        return Err(AppError::BadRequest(
            "Full name must be at most 100 characters".to_string(),
        ));
    }

    let password_hash = hash_password(&request.password)?;
    store
        .create_user(username, email, &password_hash, full_name)
        .await
}

/// Check a username/password pair
pub async fn authenticate_user(store: &Store, username: &str, password: &str) -> Result<User> {
    let user = store
        .get_user_by_username(username)
        .await?
        .filter(|user| verify_password(password, &user.hashed_password))
        .ok_or_else(|| AppError::Unauthorized("Incorrect username or password".to_string()))?;

    Ok(user)
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    }
}

/// The active user behind the request's bearer token
#[derive(Debug, Clone)]
pub struct CurrentUser(pub User);

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|_| AppError::Unauthorized("Not authenticated".to_string()))?;

        let claims = state.auth.validate_token(bearer.token())?;

        let user = state
            .store
            .get_user_by_username(&claims.sub)
            .await?
            .ok_or_else(|| AppError::Unauthorized("Could not validate credentials".to_string()))?;

        if !user.is_active {
            return Err(AppError::BadRequest("Inactive user".to_string()));
        }

        Ok(CurrentUser(user))
    }
}
