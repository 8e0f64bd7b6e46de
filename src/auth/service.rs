//! Authentication service
//!
//! Core business logic for phone-number OTP authentication: challenge
//! issuance and consumption with attempt limiting, and access/refresh
//! credential issuance, rotation-on-use, and revocation.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::config::{ACCESS_TOKEN_TTL_SECS, OTP_MAX_ATTEMPTS, OTP_TTL_SECS, REFRESH_TOKEN_TTL_DAYS};
use crate::models::User;

use super::hasher::{otp_material, HashError, SecretHasher};
use super::jwt::{generate_access_token, verify_access_token, Claims, JwtError};
use super::store::{ChallengeStore, RefreshTokenStore, StoreError, UserStore};

/// Auth service errors
#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Invalid challenge")]
    InvalidChallenge,

    #[error("Challenge expired")]
    Expired,

    #[error("Too many attempts")]
    AttemptsExceeded,

    #[error("Invalid code")]
    InvalidCode,

    #[error("Invalid refresh")]
    InvalidRefresh,

    #[error("Refresh expired")]
    ExpiredRefresh,

    #[error("Hashing failure: {0}")]
    Hashing(#[from] HashError),

    #[error("Token error: {0}")]
    Token(#[from] JwtError),

    #[error("Database error: {0}")]
    Database(String),
}

/// A freshly issued OTP challenge.
///
/// The plaintext code goes to the SMS collaborator and nowhere else; it must
/// never be persisted or logged in production.
#[derive(Debug)]
pub struct IssuedChallenge {
    pub challenge_id: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// A freshly minted credential pair. The raw refresh secret travels only in
/// a transport the caller exclusively controls (the http-only cookie).
#[derive(Debug)]
pub struct TokenPair {
    pub access_token: String,
    pub user_id: Uuid,
    pub refresh_secret: String,
    pub refresh_expires_at: DateTime<Utc>,
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    challenges: Arc<dyn ChallengeStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    users: Arc<dyn UserStore>,
    otp_hasher: SecretHasher,
    refresh_hasher: SecretHasher,
    jwt_secret: String,
    otp_pepper: String,
}

impl AuthService {
    /// Create a new AuthService
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        challenges: Arc<dyn ChallengeStore>,
        refresh_tokens: Arc<dyn RefreshTokenStore>,
        users: Arc<dyn UserStore>,
        otp_hasher: SecretHasher,
        refresh_hasher: SecretHasher,
        jwt_secret: String,
        otp_pepper: String,
    ) -> Self {
        Self {
            challenges,
            refresh_tokens,
            users,
            otp_hasher,
            refresh_hasher,
            jwt_secret,
            otp_pepper,
        }
    }

    /// Issue a new OTP challenge for a phone number
    ///
    /// `forced_code` overrides the generated code; the handler only passes
    /// it outside production. The challenge is persisted before the caller
    /// attempts SMS delivery, so delivery failure never rolls it back.
    pub async fn issue_challenge(
        &self,
        phone: &str,
        forced_code: Option<String>,
    ) -> Result<IssuedChallenge, AuthError> {
        let code = forced_code.unwrap_or_else(generate_otp_code);
        let challenge_id = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + Duration::seconds(OTP_TTL_SECS);

        let code_hash = self
            .otp_hasher
            .hash(otp_material(&code, phone, &self.otp_pepper))
            .await?;

        self.challenges
            .create(phone, &challenge_id, &code_hash, expires_at)
            .await
            .map_err(|e| AuthError::Database(e.to_string()))?;

        Ok(IssuedChallenge {
            challenge_id,
            code,
            expires_at,
        })
    }

    /// Verify a submitted OTP code against an outstanding challenge
    ///
    /// The attempt is counted before the hash check, so a wrong code always
    /// costs an attempt. On success the challenge is deleted (single use).
    pub async fn verify_challenge(
        &self,
        phone: &str,
        challenge_id: &str,
        code: &str,
    ) -> Result<(), AuthError> {
        let challenge = self
            .challenges
            .find_by_challenge_id(challenge_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AuthError::InvalidChallenge,
                StoreError::Database(m) => AuthError::Database(m),
            })?;

        // Expired challenges are not deleted here; they simply keep failing
        // until superseded.
        if Utc::now() >= challenge.expires_at {
            return Err(AuthError::Expired);
        }

        if challenge.attempts >= OTP_MAX_ATTEMPTS {
            return Err(AuthError::AttemptsExceeded);
        }

        // Count the attempt unconditionally before comparing hashes.
        let updated = self
            .challenges
            .increment_attempts(challenge_id)
            .await
            .map_err(|e| match e {
                StoreError::NotFound => AuthError::InvalidChallenge,
                StoreError::Database(m) => AuthError::Database(m),
            })?;

        let matches = self
            .otp_hasher
            .verify(
                otp_material(code, phone, &self.otp_pepper),
                updated.code_hash.clone(),
            )
            .await?;

        if !matches {
            return Err(AuthError::InvalidCode);
        }

        // Single-use enforcement.
        self.challenges
            .delete(challenge_id)
            .await
            .map_err(|e| AuthError::Database(e.to_string()))?;

        Ok(())
    }

    /// Mint an access token and a fresh refresh credential for a user
    pub async fn issue_tokens(&self, user_id: Uuid) -> Result<TokenPair, AuthError> {
        let access_token = generate_access_token(user_id, &self.jwt_secret, ACCESS_TOKEN_TTL_SECS)?;

        let refresh_secret = generate_refresh_secret();
        let token_hash = self.refresh_hasher.hash(refresh_secret.clone()).await?;
        let refresh_expires_at = Utc::now() + Duration::days(REFRESH_TOKEN_TTL_DAYS);

        self.refresh_tokens
            .insert(user_id, &token_hash, refresh_expires_at)
            .await
            .map_err(|e| AuthError::Database(e.to_string()))?;

        Ok(TokenPair {
            access_token,
            user_id,
            refresh_secret,
            refresh_expires_at,
        })
    }

    /// Exchange a presented refresh secret for a new credential pair
    ///
    /// The store indexes by hash of the stored secret, so the lookup is a
    /// scan-and-verify over non-revoked candidates, most recent first. The
    /// matched record is revoked before the replacement is minted; a crash
    /// in between logs the user out rather than leaving two live secrets.
    pub async fn rotate_refresh(&self, presented: &str) -> Result<TokenPair, AuthError> {
        let candidates = self
            .refresh_tokens
            .list_active()
            .await
            .map_err(|e| AuthError::Database(e.to_string()))?;

        let mut matched = None;
        for candidate in candidates {
            let ok = self
                .refresh_hasher
                .verify(presented.to_string(), candidate.token_hash.clone())
                .await?;
            if ok {
                matched = Some(candidate);
                break;
            }
        }

        let record = matched.ok_or(AuthError::InvalidRefresh)?;

        if Utc::now() >= record.expires_at {
            return Err(AuthError::ExpiredRefresh);
        }

        // Compare-and-set: exactly one of any concurrent rotations of the
        // same physical secret wins.
        let won = self
            .refresh_tokens
            .revoke(record.id)
            .await
            .map_err(|e| AuthError::Database(e.to_string()))?;
        if !won {
            return Err(AuthError::InvalidRefresh);
        }

        self.issue_tokens(record.user_id).await
    }

    /// Revoke every refresh credential matching a presented secret
    ///
    /// Idempotent: unknown or already-revoked secrets are a silent no-op.
    pub async fn revoke_refresh(&self, presented: &str) -> Result<(), AuthError> {
        let candidates = self
            .refresh_tokens
            .list_active()
            .await
            .map_err(|e| AuthError::Database(e.to_string()))?;

        for candidate in candidates {
            let ok = self
                .refresh_hasher
                .verify(presented.to_string(), candidate.token_hash.clone())
                .await?;
            if ok {
                // Losing the CAS race means someone else revoked it; fine.
                self.refresh_tokens
                    .revoke(candidate.id)
                    .await
                    .map_err(|e| AuthError::Database(e.to_string()))?;
            }
        }

        Ok(())
    }

    /// Statelessly verify an access token
    pub fn verify_access(&self, token: &str) -> Result<Claims, JwtError> {
        verify_access_token(token, &self.jwt_secret)
    }

    /// Find or create a user by phone number
    pub async fn find_or_create_user(&self, phone: &str) -> Result<User, AuthError> {
        self.users
            .find_or_create(phone)
            .await
            .map_err(|e| AuthError::Database(e.to_string()))
    }

    /// Get a user by ID
    pub async fn get_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AuthError> {
        match self.users.find_by_id(user_id).await {
            Ok(user) => Ok(Some(user)),
            Err(StoreError::NotFound) => Ok(None),
            Err(StoreError::Database(m)) => Err(AuthError::Database(m)),
        }
    }

    /// Get JWT secret (for middleware access)
    pub fn jwt_secret(&self) -> &str {
        &self.jwt_secret
    }
}

/// Generate a 6-digit zero-padded OTP code from the OS CSPRNG
fn generate_otp_code() -> String {
    use rand::Rng;
    let n: u32 = rand::rngs::OsRng.gen_range(0..1_000_000);
    format!("{:06}", n)
}

/// Generate a 48-byte hex-encoded opaque refresh secret
fn generate_refresh_secret() -> String {
    use rand::RngCore;
    let mut bytes = [0u8; 48];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}
