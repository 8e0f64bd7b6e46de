//! Secret hashing with Argon2id
//!
//! One-way, salted hashing for short numeric OTP codes and for opaque
//! refresh secrets, with distinct tuning per use. The hash and verify calls
//! are deliberately expensive, so both run on the blocking thread pool and
//! never stall the async executor.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use thiserror::Error;

/// Hashing errors. Treated as fatal by callers.
#[derive(Error, Debug)]
pub enum HashError {
    #[error("Hashing failed: {0}")]
    Primitive(String),

    #[error("Invalid hash format: {0}")]
    Format(String),

    #[error("Hashing task failed: {0}")]
    Join(String),
}

/// Build the salted OTP input: binds a code to one phone number and blends
/// in the server-held pepper so a guessed code cannot be replayed against
/// another phone.
pub fn otp_material(code: &str, phone: &str, pepper: &str) -> String {
    format!("{}:{}:{}", code, phone, pepper)
}

/// Argon2id hasher with fixed parameters.
///
/// Produces PHC-formatted strings carrying the salt and parameters, so
/// verification needs no extra state.
#[derive(Debug, Clone)]
pub struct SecretHasher {
    params: Params,
}

impl SecretHasher {
    /// Tuning for 6-digit OTP codes: t_cost 3, m_cost 8 MiB, single lane.
    pub fn for_otp_codes() -> Self {
        // Params are valid by construction; expect() documents the constants.
        let params = Params::new(8192, 3, 1, None).expect("valid OTP hashing parameters");
        Self { params }
    }

    /// Tuning for high-entropy refresh secrets: library defaults.
    pub fn for_refresh_secrets() -> Self {
        Self {
            params: Params::default(),
        }
    }

    #[cfg(test)]
    pub(crate) fn with_params(params: Params) -> Self {
        Self { params }
    }

    fn argon2(&self) -> Argon2<'static> {
        Argon2::new(Algorithm::Argon2id, Version::V0x13, self.params.clone())
    }

    /// Hash a secret with a fresh random salt.
    pub async fn hash(&self, secret: String) -> Result<String, HashError> {
        let argon2 = self.argon2();
        tokio::task::spawn_blocking(move || {
            let salt = SaltString::generate(&mut OsRng);
            argon2
                .hash_password(secret.as_bytes(), &salt)
                .map(|hash| hash.to_string())
                .map_err(|e| HashError::Primitive(e.to_string()))
        })
        .await
        .map_err(|e| HashError::Join(e.to_string()))?
    }

    /// Verify a secret against a stored PHC hash string.
    ///
    /// The comparison is a full hash check, never character-wise, so timing
    /// does not correlate with which part of the secret was wrong.
    pub async fn verify(&self, secret: String, hash: String) -> Result<bool, HashError> {
        let argon2 = self.argon2();
        tokio::task::spawn_blocking(move || {
            let parsed =
                PasswordHash::new(&hash).map_err(|e| HashError::Format(e.to_string()))?;
            Ok(argon2.verify_password(secret.as_bytes(), &parsed).is_ok())
        })
        .await
        .map_err(|e| HashError::Join(e.to_string()))?
    }
}
