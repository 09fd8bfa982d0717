//! Password hashing and verification using Argon2id.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use dentdesk_core::error::{DeskError, DeskResult};
use rand::Rng;

use crate::error::{AuthError, AuthResult};

/// Characters used for temporary passwords. `0 O 1 I l i o L` are left
/// out so a password read aloud or copied by hand is unambiguous.
pub const TEMPORARY_PASSWORD_ALPHABET: &str =
    "ABCDEFGHJKMNPQRSTUVWXYZabcdefghjkmnpqrstuvwxyz23456789";

fn peppered(password: &str, pepper: Option<&str>) -> String {
    match pepper {
        Some(p) => format!("{p}{password}"),
        None => password.to_string(),
    }
}

fn hasher() -> DeskResult<Argon2<'static>> {
    let params = Params::new(19_456, 2, 1, None)
        .map_err(|e| DeskError::Crypto(format!("argon2 params: {e}")))?;
    Ok(Argon2::new(Algorithm::Argon2id, Version::V0x13, params))
}

/// Hash a password into an Argon2id PHC string with a fresh random salt.
pub fn hash_password(password: &str, pepper: Option<&str>) -> DeskResult<String> {
    let mut salt_bytes = [0u8; 16];
    rand::rng().fill(&mut salt_bytes);
    let salt = SaltString::encode_b64(&salt_bytes)
        .map_err(|e| DeskError::Crypto(format!("salt encoding: {e}")))?;

    let input = peppered(password, pepper);
    hasher()?
        .hash_password(input.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| DeskError::Crypto(format!("hash error: {e}")))
}

/// Verify a plaintext password against an Argon2id PHC-format hash.
///
/// Returns `Ok(false)` on mismatch and `Err(DeskError::Crypto)` only
/// when the stored hash is malformed.
pub fn verify_password(password: &str, hash: &str, pepper: Option<&str>) -> DeskResult<bool> {
    let parsed_hash = PasswordHash::new(hash)
        .map_err(|e| DeskError::Crypto(format!("invalid hash format: {e}")))?;

    let input = peppered(password, pepper);
    match Argon2::default().verify_password(input.as_bytes(), &parsed_hash) {
        Ok(()) => Ok(true),
        Err(argon2::password_hash::Error::Password) => Ok(false),
        Err(e) => Err(DeskError::Crypto(format!("verify error: {e}"))),
    }
}

pub fn generate_temporary_password(length: usize) -> String {
    let alphabet = TEMPORARY_PASSWORD_ALPHABET.as_bytes();
    let mut rng = rand::rng();
    (0..length)
        .map(|_| alphabet[rng.random_range(0..alphabet.len())] as char)
        .collect()
}

/// Check a new password against the length policy and its confirmation.
pub fn validate_new_password(password: &str, confirm: &str, min_length: usize) -> AuthResult<()> {
    if password.chars().count() < min_length {
        return Err(AuthError::PasswordTooShort { min: min_length });
    }
    if password != confirm {
        return Err(AuthError::PasswordMismatch);
    }
    Ok(())
}
