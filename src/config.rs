use std::env;
use std::str::FromStr;

use jsonwebtoken::Algorithm;

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub debug: bool,
    pub log_json: bool,
    pub database_url: String,
    pub jwt_secret: String,
    pub jwt_algorithm: Algorithm,
    pub access_token_expire_minutes: u64,
    pub livekit_url: String,
    pub livekit_api_key: String,
    pub livekit_api_secret: String,
    pub livekit_token_ttl_seconds: u64,
    pub livekit_timeout_seconds: u64,
    pub livekit_health_timeout_ms: u64,
    pub livekit_fail_open: bool,
    pub livekit_register_rooms: bool,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let access_token_expire_minutes = env_u64("ACCESS_TOKEN_EXPIRE_MINUTES", 30)?;
        let default_token_ttl = access_token_expire_minutes
            .checked_mul(60)
            .ok_or(ConfigError::InvalidNumber("ACCESS_TOKEN_EXPIRE_MINUTES"))?;

        let jwt_algorithm = parse_hmac_algorithm(
            &env::var("JWT_ALGORITHM").unwrap_or_else(|_| "HS256".to_string()),
        )?;

        Ok(Config {
            server_host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("PORT")
                .unwrap_or_else(|_| "8000".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            debug: env_flag("DEBUG", false),
            log_json: env::var("LOG_FORMAT")
                .map(|v| v.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://livekit_rooms.db".to_string()),
            jwt_secret: env::var("JWT_SECRET").map_err(|_| ConfigError::MissingJwtSecret)?,
            jwt_algorithm,
            access_token_expire_minutes,
            livekit_url: env::var("LIVEKIT_URL")
                .unwrap_or_else(|_| "ws://localhost:7880".to_string()),
            livekit_api_key: env::var("LIVEKIT_API_KEY")
                .map_err(|_| ConfigError::MissingVar("LIVEKIT_API_KEY"))?,
            livekit_api_secret: env::var("LIVEKIT_API_SECRET")
                .map_err(|_| ConfigError::MissingVar("LIVEKIT_API_SECRET"))?,
            livekit_token_ttl_seconds: env_u64("LIVEKIT_TOKEN_TTL_SECONDS", default_token_ttl)?,
            livekit_timeout_seconds: env_u64("LIVEKIT_TIMEOUT_SECONDS", 10)?,
            livekit_health_timeout_ms: env_u64("LIVEKIT_HEALTH_TIMEOUT_MS", 2000)?,
            livekit_fail_open: env_flag("LIVEKIT_FAIL_OPEN", true),
            livekit_register_rooms: env_flag("LIVEKIT_REGISTER_ROOMS", true),
        })
    }

    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }

    pub fn access_token_expiry_seconds(&self) -> u64 {
        self.access_token_expire_minutes.saturating_mul(60)
    }

    /// HTTP(S) base of the LiveKit server, derived from its websocket URL.
    pub fn livekit_http_url(&self) -> String {
        let url = self.livekit_url.trim_end_matches('/');
        if let Some(rest) = url.strip_prefix("wss://") {
            format!("https://{}", rest)
        } else if let Some(rest) = url.strip_prefix("ws://") {
            format!("http://{}", rest)
        } else {
            url.to_string()
        }
    }
}

fn env_u64(name: &'static str, default: u64) -> Result<u64, ConfigError> {
    parse_u64(name, env::var(name).ok().as_deref(), default)
}

fn parse_u64(name: &'static str, raw: Option<&str>, default: u64) -> Result<u64, ConfigError> {
    match raw.map(str::trim) {
        None | Some("") => Ok(default),
        Some(value) => value.parse().map_err(|_| ConfigError::InvalidNumber(name)),
    }
}

fn env_flag(name: &str, default: bool) -> bool {
    match env::var(name) {
        Ok(v) => matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Only shared-secret algorithms make sense for a single `JWT_SECRET`.
fn parse_hmac_algorithm(raw: &str) -> Result<Algorithm, ConfigError> {
    let alg = Algorithm::from_str(raw.trim())
        .map_err(|_| ConfigError::UnsupportedAlgorithm(raw.to_string()))?;
    match alg {
        Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512 => Ok(alg),
        _ => Err(ConfigError::UnsupportedAlgorithm(raw.to_string())),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid server port")]
    InvalidPort,
    #[error("JWT_SECRET environment variable is required")]
    MissingJwtSecret,
    #[error("{0} environment variable is required")]
    MissingVar(&'static str),
    #[error("{0} must be a non-negative integer")]
    InvalidNumber(&'static str),
    #[error("Unsupported JWT algorithm: {0}")]
    UnsupportedAlgorithm(String),
}
