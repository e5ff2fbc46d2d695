use argon2::password_hash::SaltString;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;

#[derive(Debug, thiserror::Error)]
#[error("password hashing failed: {0}")]
pub struct PasswordError(String);

pub fn hash_password(password: &str) -> Result<String, PasswordError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|error| PasswordError(error.to_string()))
}

/// Check a candidate password against a stored PHC string.
///
/// A malformed stored hash is an error; a mismatch is `Ok(false)`.
pub fn verify_password(password: &str, stored_hash: &str) -> Result<bool, PasswordError> {
    let parsed = PasswordHash::new(stored_hash).map_err(|error| PasswordError(error.to_string()))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

/// [`hash_password`] on the blocking pool so argon2 never stalls a runtime worker.
pub async fn hash_password_blocking(password: String) -> Result<String, PasswordError> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|error| PasswordError(error.to_string()))?
}

/// [`verify_password`] on the blocking pool.
pub async fn verify_password_blocking(
    password: String,
    stored_hash: String,
) -> Result<bool, PasswordError> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|error| PasswordError(error.to_string()))?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verifies_matching_password_only() {
        let hash = hash_password("admin123").expect("hash");
        assert!(hash.starts_with("$argon2"));
        assert!(verify_password("admin123", &hash).expect("verify"));
        assert!(!verify_password("admin124", &hash).expect("verify"));
    }

    #[test]
    fn malformed_hash_is_an_error() {
        assert!(verify_password("anything", "not-a-phc-string").is_err());
    }

    #[tokio::test]
    async fn blocking_pool_variants_agree_with_inline_ones() {
        let hash = hash_password_blocking("admin123".to_string())
            .await
            .expect("hash");
        assert!(verify_password("admin123", &hash).expect("verify"));
        assert!(verify_password_blocking("admin123".to_string(), hash.clone())
            .await
            .expect("verify"));
        assert!(!verify_password_blocking("admin124".to_string(), hash)
            .await
            .expect("verify"));
    }
}
