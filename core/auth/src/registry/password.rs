//! Salted password hashing with Argon2id.
use anyhow::Result;
use argon2::password_hash::Error as HashError;
use argon2::password_hash::PasswordHash;
use argon2::password_hash::PasswordHasher;
use argon2::password_hash::PasswordVerifier;
use argon2::password_hash::SaltString;
use argon2::Argon2;

use super::errors::PasswordHashing;

#[cfg(not(any(test, feature = "test-fixture")))]
fn hasher() -> Argon2<'static> {
    Argon2::default()
}

// Keep unit tests fast with the smallest parameters Argon2id accepts.
#[cfg(any(test, feature = "test-fixture"))]
fn hasher() -> Argon2<'static> {
    let params = argon2::Params::new(argon2::Params::MIN_M_COST, 1, 1, None)
        .expect("minimum argon2 parameters are valid");
    Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, params)
}

/// Hash a password with a random salt, returning the PHC string encoding.
pub fn hash(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut rand::rngs::OsRng);
    let hash = hasher()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|error| anyhow::anyhow!(PasswordHashing(error.to_string())))?;
    Ok(hash.to_string())
}

/// Check a password against a PHC string in constant time.
pub fn verify(password: &str, hash: &str) -> Result<bool> {
    let hash = PasswordHash::new(hash)
        .map_err(|error| anyhow::anyhow!(PasswordHashing(error.to_string())))?;
    match hasher().verify_password(password.as_bytes(), &hash) {
        Ok(()) => Ok(true),
        Err(HashError::Password) => Ok(false),
        Err(error) => Err(anyhow::anyhow!(PasswordHashing(error.to_string()))),
    }
}

/// Hash a password on the blocking thread pool.
pub async fn hash_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash(&password)).await?
}

/// Verify a password on the blocking thread pool.
pub async fn verify_blocking(password: String, hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify(&password, &hash)).await?
}
