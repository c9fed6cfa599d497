use pbkdf2::pbkdf2_hmac;
use rand::{RngCore, rngs::OsRng};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tokio::task::{JoinError, spawn_blocking};

const SCHEME: &str = "pbkdf2_sha256";
const OUTPUT_LEN: usize = 32;
const SALT_LEN: usize = 16;

#[derive(Error, Debug)]
#[error("Password hashing task failed: {0}")]
pub struct PasswordError(#[from] JoinError);

/// Hash a password with a fresh random salt.
///
/// Encoded as `pbkdf2_sha256$<iterations>$<salt hex>$<hash hex>` so the iteration count can
/// be raised later without invalidating existing hashes.
pub fn hash_password(password: &str, iterations: u32) -> String {
    let iterations = iterations.max(1);

    let mut salt = [0u8; SALT_LEN];
    OsRng.fill_bytes(&mut salt);

    let mut out = [0u8; OUTPUT_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut out);

    format!(
        "{SCHEME}${iterations}${}${}",
        hex::encode(salt),
        hex::encode(out)
    )
}

/// Malformed hashes never verify.
pub fn verify_password(password: &str, encoded: &str) -> bool {
    let mut parts = encoded.split('$');
    let (Some(SCHEME), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };

    let (Ok(iterations), Ok(salt), Ok(expected)) = (
        iterations.parse::<u32>(),
        hex::decode(salt),
        hex::decode(expected),
    ) else {
        return false;
    };

    if iterations == 0 || expected.len() != OUTPUT_LEN {
        return false;
    }

    let mut out = [0u8; OUTPUT_LEN];
    pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut out);
    out.as_slice().ct_eq(expected.as_slice()).into()
}

pub async fn hash_password_blocking(
    password: String,
    iterations: u32,
) -> Result<String, PasswordError> {
    Ok(spawn_blocking(move || hash_password(&password, iterations)).await?)
}

pub async fn verify_password_blocking(
    password: String,
    encoded: String,
) -> Result<bool, PasswordError> {
    Ok(spawn_blocking(move || verify_password(&password, &encoded)).await?)
}
