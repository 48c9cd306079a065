//! Small helpers for session tokens, cookie signatures and password hashing.

use anyhow::{Context, Result};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use rand::{RngCore, rngs::OsRng};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

/// Create a new session token for the auth cookie.
/// The raw value is only returned to set the cookie; the database stores a hash.
pub(super) fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

/// Session id stored in the database: base64url of the SHA-256 of the raw token.
pub(super) fn session_id_from_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

fn mac(secret: &SecretString) -> Result<HmacSha256> {
    HmacSha256::new_from_slice(secret.expose_secret().as_bytes())
        .context("invalid session secret")
}

/// Cookie value: `<token>.<signature>`.
pub(super) fn sign_token(token: &str, secret: &SecretString) -> Result<String> {
    let mut mac = mac(secret)?;
    mac.update(token.as_bytes());
    let signature = URL_SAFE_NO_PAD.encode(mac.finalize().into_bytes());
    Ok(format!("{token}.{signature}"))
}

/// Return the raw token when the cookie signature matches, `None` otherwise.
pub(super) fn verify_signed_token(value: &str, secret: &SecretString) -> Option<String> {
    let (token, signature) = value.rsplit_once('.')?;
    if token.is_empty() {
        return None;
    }
    let signature = URL_SAFE_NO_PAD.decode(signature).ok()?;
    let mut mac = mac(secret).ok()?;
    mac.update(token.as_bytes());
    // verify_slice compares in constant time.
    mac.verify_slice(&signature).ok()?;
    Some(token.to_string())
}

/// Hash a password on the blocking pool.
pub(super) async fn hash_password(password: &str, cost: u32) -> Result<String> {
    let password = password.to_string();
    tokio::task::spawn_blocking(move || bcrypt::hash(password, cost))
        .await
        .context("password hashing task failed")?
        .context("failed to hash password")
}

/// Compare a password with a stored bcrypt hash. Malformed hashes never match.
pub(super) async fn verify_password(password: &str, hash: &str) -> Result<bool> {
    let password = password.to_string();
    let hash = hash.to_string();
    let verified = tokio::task::spawn_blocking(move || bcrypt::verify(password, &hash))
        .await
        .context("password verification task failed")?;
    Ok(verified.unwrap_or(false))
}
