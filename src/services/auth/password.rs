use argon2::Argon2;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use tracing::warn;

/// A throwaway PHC string verified against when the login is unknown, so
/// unknown and known logins cost the same.
pub fn decoy_hash() -> Option<String> {
    let salt = SaltString::encode_b64(b"decoy-salt-value").ok()?;
    Argon2::default()
        .hash_password(b"decoy-password", &salt)
        .ok()
        .map(|h| h.to_string())
}

/// Check a password against a stored PHC string (argon2).
///
/// Runs on the blocking pool.
/// An unparsable hash counts as a mismatch.
pub async fn verify_password(phc: String, password: String) -> bool {
    tokio::task::spawn_blocking(move || verify_blocking(&phc, &password))
        .await
        .unwrap_or_else(|e| {
            warn!(error = %e, "password verification task failed");
            false
        })
}

fn verify_blocking(phc: &str, password: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            warn!(error = %e, "stored password hash is not a valid PHC string");
            false
        }
    }
}
