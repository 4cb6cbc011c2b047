use std::time::{SystemTime, UNIX_EPOCH};

use argon2::password_hash::{self, PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use rand::rngs::OsRng;

/// Longest first/last name kept on a user row.
pub const MAX_NAME_LEN: usize = 100;

/// Unix seconds; 0 if the system clock is before the epoch.
pub fn get_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_secs()).unwrap_or(i64::MAX))
        .unwrap_or(0)
}

/// Random v4 UUID. Used as JWT `jti` and as token family id.
pub fn new_token_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Argon2id PHC string for `password`. CPU bound; call from `spawn_blocking`.
pub fn hash_password(password: &str) -> Result<String, password_hash::Error> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
}

/// `Ok(false)` on a mismatch, `Err` only if `hash` is not a PHC string.
pub fn verify_password(hash: &str, password: &str) -> Result<bool, password_hash::Error> {
    let parsed = PasswordHash::new(hash)?;
    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Optional display name: NULs and control characters dropped, trimmed,
/// capped at `MAX_NAME_LEN` characters.
pub fn sanitize_name(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .chars()
        .take(MAX_NAME_LEN)
        .collect()
}
