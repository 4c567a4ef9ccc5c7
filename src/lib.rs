pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod livekit;
pub mod models;
pub mod rooms;
pub mod security;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

pub use config::Config;
pub use error::{AppError, Result};
pub use state::AppState;
