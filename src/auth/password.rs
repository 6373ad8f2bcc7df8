//! Password hashing with Argon2id

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use rand_core::OsRng;
use tracing::{debug, error};

use crate::error::{AppError, Result};

/// Hash a plain-text password into a PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);

    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!(error = %e, "Argon2 password hashing failed");
            AppError::Internal(format!("Password hashing failed: {}", e))
        })
}

/// Check a plain-text password against a stored PHC string.
///
/// A mismatch is `Ok(false)`; only an unreadable stored hash is an error.
pub fn verify_password(stored_hash: &str, password: &str) -> Result<bool> {
    let parsed = PasswordHash::new(stored_hash).map_err(|e| {
        error!(error = %e, "Stored password hash is unreadable");
        AppError::Internal("Stored password hash is invalid".to_string())
    })?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => {
            debug!("Password mismatch");
            Ok(false)
        }
        Err(e) => {
            error!(error = %e, "Argon2 password verification failed");
            Err(AppError::Internal(format!("Password verification failed: {}", e)))
        }
    }
}
