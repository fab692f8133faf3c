//! Password hashing and the credential verifier.
//!
//! Hashes are Argon2id PHC strings. Verification fails closed: anything the
//! hashing library cannot parse or check counts as a mismatch.

use argon2::{
    password_hash::SaltString, Argon2, PasswordHash, PasswordHasher as _, PasswordVerifier,
};
use rand::rngs::OsRng;

use super::error::AuthError;

/// Hash and verify capability used by registration and login.
pub trait PasswordHasher: Send + Sync {
    /// Produce a self-describing hash for storage.
    ///
    /// # Errors
    /// Returns an internal error if the hashing library fails.
    fn hash(&self, plaintext: &str) -> Result<String, AuthError>;

    /// Check `plaintext` against `stored_hash`. Never errors; failures are `false`.
    fn verify(&self, stored_hash: &str, plaintext: &str) -> bool;
}

#[derive(Debug, Clone, Default)]
pub struct Argon2Hasher {
    params: argon2::Params,
}

impl Argon2Hasher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use custom cost parameters (tests use the cheapest valid ones).
    #[must_use]
    pub fn with_params(params: argon2::Params) -> Self {
        Self { params }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(
            argon2::Algorithm::Argon2id,
            argon2::Version::V0x13,
            self.params.clone(),
        )
    }
}

impl PasswordHasher for Argon2Hasher {
    fn hash(&self, plaintext: &str) -> Result<String, AuthError> {
        let salt = SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(plaintext.as_bytes(), &salt)
            .map_err(|err| AuthError::Internal(format!("failed to hash password: {err}")))?
            .to_string();
        Ok(hash)
    }

    fn verify(&self, stored_hash: &str, plaintext: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(stored_hash) else {
            return false;
        };
        // Parameters come from the PHC string, not from `self.params`.
        Argon2::default()
            .verify_password(plaintext.as_bytes(), &parsed)
            .is_ok()
    }
}

/// Credential verifier: an identity without a stored hash never matches.
#[must_use]
pub fn verify_password(hasher: &dyn PasswordHasher, stored_hash: Option<&str>, plaintext: &str) -> bool {
    match stored_hash {
        Some(hash) if !hash.is_empty() => hasher.verify(hash, plaintext),
        _ => false,
    }
}
