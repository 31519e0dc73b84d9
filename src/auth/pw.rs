use std::sync::OnceLock;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString, rand_core::OsRng},
    Argon2, Params, Algorithm, Version
};
use crate::errors::{AppError, Result};

/// Stand-in password used to keep the unknown-email path as slow as a real check.
const DUMMY_PASSWORD: &str = "snippetbox-timing-equaliser";

static DUMMY_HASH: OnceLock<String> = OnceLock::new();

fn create_argon2() -> std::result::Result<Argon2<'static>, argon2::Error> {
    let params = Params::new(65536, 3, 4, Some(32))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a plaintext password into a PHC string with a fresh random salt.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let argon2 = create_argon2().map_err(AppError::ArgonError)?;
    let password_hash = argon2
        .hash_password(password.as_bytes(), &salt)
        .map_err(AppError::PasswordHashError)?;
    Ok(password_hash.to_string())
}

/// Check `password` against a stored PHC hash.
///
/// `Ok(false)` means the password does not match. A stored value that is not
/// a valid PHC string is reported as [`AppError::MalformedHash`]. The digest
/// comparison inside `argon2` is constant time.
pub fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| AppError::MalformedHash(e.to_string()))?;
    let argon2 = create_argon2().map_err(AppError::ArgonError)?;
    match argon2.verify_password(password.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e @ argon2::password_hash::Error::Algorithm) => Err(AppError::MalformedHash(e.to_string())),
        Err(e) => Err(AppError::PasswordHashError(e)),
    }
}

/// Burn one verification against a fixed hash so that a missing account
/// costs the same time as a wrong password.
pub fn dummy_verify(password: &str) {
    let hash = match DUMMY_HASH.get() {
        Some(hash) => hash,
        None => match hash_password(DUMMY_PASSWORD) {
            Ok(hash) => DUMMY_HASH.get_or_init(|| hash),
            Err(e) => {
                tracing::error!("Failed to prepare dummy password hash: {}", e);
                return;
            }
        },
    };
    if let Err(e) = verify_password(password, hash) {
        tracing::debug!("Dummy password verification failed: {}", e);
    }
}
