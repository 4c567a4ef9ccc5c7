//! Security helpers (password hashing, external room ids)

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand::Rng;

use crate::error::{AppError, Result};

/// Generate the opaque room name handed to LiveKit (e.g. "room_3f9a0c1d").
pub fn generate_room_id() -> String {
    let mut rng = rand::rng();
    let mut bytes = [0u8; 4];
    rng.fill(&mut bytes);
    format!("room_{}", hex::encode(bytes))
}

/// Hash a password into an argon2 PHC string with a fresh salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::InternalError(format!("Password hashing failed: {}", e)))
}

/// Check a password against a stored PHC string. Malformed hashes never verify.
pub fn verify_password(password: &str, password_hash: &str) -> bool {
    match PasswordHash::new(password_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "Stored password hash is malformed");
            false
        }
    }
}
