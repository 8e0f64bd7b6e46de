//! Persistence contracts for the credential lifecycle
//!
//! The stores are the only shared mutable state in the system. They are
//! trait seams so the engine semantics stay testable without Postgres; the
//! Postgres implementations below provide the row-level atomicity the
//! engine relies on (single-statement increment, compare-and-set revoke).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{OtpChallenge, RefreshToken, User};

/// Store errors
///
/// `NotFound` deliberately does not distinguish consumed, purged, or
/// never-created rows.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Record not found")]
    NotFound,

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => StoreError::NotFound,
            _ => StoreError::Database(e.to_string()),
        }
    }
}

/// Persistent record of outstanding OTP challenges
#[async_trait]
pub trait ChallengeStore: Send + Sync {
    async fn create(
        &self,
        phone: &str,
        challenge_id: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError>;

    async fn find_by_challenge_id(&self, challenge_id: &str) -> Result<OtpChallenge, StoreError>;

    /// Atomic increment-and-return, linearizable per challenge id.
    async fn increment_attempts(&self, challenge_id: &str) -> Result<OtpChallenge, StoreError>;

    async fn delete(&self, challenge_id: &str) -> Result<(), StoreError>;
}

/// Persistent record of refresh credentials
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken, StoreError>;

    /// Non-revoked rows, most recent first. Expired rows are included; the
    /// caller decides how an expired match surfaces.
    async fn list_active(&self) -> Result<Vec<RefreshToken>, StoreError>;

    /// Compare-and-set revoke. Returns true only for the call that actually
    /// flipped the flag; concurrent callers racing on the same row see false.
    async fn revoke(&self, id: Uuid) -> Result<bool, StoreError>;
}

/// Identity collaborator: users keyed by phone number
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_or_create(&self, phone: &str) -> Result<User, StoreError>;

    async fn find_by_id(&self, id: Uuid) -> Result<User, StoreError>;
}

/// Postgres-backed challenge store
#[derive(Clone)]
pub struct PgChallengeStore {
    pool: PgPool,
}

impl PgChallengeStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChallengeStore for PgChallengeStore {
    async fn create(
        &self,
        phone: &str,
        challenge_id: &str,
        code_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO otp_challenges (id, challenge_id, phone, code_hash, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(challenge_id)
        .bind(phone)
        .bind(code_hash)
        .bind(expires_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn find_by_challenge_id(&self, challenge_id: &str) -> Result<OtpChallenge, StoreError> {
        let challenge: OtpChallenge = sqlx::query_as(
            r#"
            SELECT id, challenge_id, phone, code_hash, attempts, expires_at, created_at
            FROM otp_challenges
            WHERE challenge_id = $1
            "#,
        )
        .bind(challenge_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        Ok(challenge)
    }

    async fn increment_attempts(&self, challenge_id: &str) -> Result<OtpChallenge, StoreError> {
        // Single UPDATE .. RETURNING: no two concurrent verifies can observe
        // the same pre-increment count.
        let challenge: OtpChallenge = sqlx::query_as(
            r#"
            UPDATE otp_challenges
            SET attempts = attempts + 1
            WHERE challenge_id = $1
            RETURNING id, challenge_id, phone, code_hash, attempts, expires_at, created_at
            "#,
        )
        .bind(challenge_id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        Ok(challenge)
    }

    async fn delete(&self, challenge_id: &str) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            DELETE FROM otp_challenges WHERE challenge_id = $1
            "#,
        )
        .bind(challenge_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

/// Postgres-backed refresh credential store
#[derive(Clone)]
pub struct PgRefreshTokenStore {
    pool: PgPool,
}

impl PgRefreshTokenStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RefreshTokenStore for PgRefreshTokenStore {
    async fn insert(
        &self,
        user_id: Uuid,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<RefreshToken, StoreError> {
        let token: RefreshToken = sqlx::query_as(
            r#"
            INSERT INTO refresh_tokens (id, user_id, token_hash, expires_at)
            VALUES ($1, $2, $3, $4)
            RETURNING id, user_id, token_hash, expires_at, revoked, revoked_at, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(token_hash)
        .bind(expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(token)
    }

    async fn list_active(&self) -> Result<Vec<RefreshToken>, StoreError> {
        let tokens: Vec<RefreshToken> = sqlx::query_as(
            r#"
            SELECT id, user_id, token_hash, expires_at, revoked, revoked_at, created_at
            FROM refresh_tokens
            WHERE revoked = FALSE
            ORDER BY created_at DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(tokens)
    }

    async fn revoke(&self, id: Uuid) -> Result<bool, StoreError> {
        let rows_affected = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET revoked = TRUE, revoked_at = NOW()
            WHERE id = $1 AND revoked = FALSE
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        Ok(rows_affected == 1)
    }
}

/// Postgres-backed user store
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn find_or_create(&self, phone: &str) -> Result<User, StoreError> {
        // Upsert keyed by phone; the no-op DO UPDATE makes RETURNING yield
        // the existing row as well as a fresh one.
        let user: User = sqlx::query_as(
            r#"
            INSERT INTO users (id, phone)
            VALUES ($1, $2)
            ON CONFLICT (phone) DO UPDATE SET phone = EXCLUDED.phone
            RETURNING id, phone, name, created_at, updated_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(phone)
        .fetch_one(&self.pool)
        .await?;

        Ok(user)
    }

    async fn find_by_id(&self, id: Uuid) -> Result<User, StoreError> {
        let user: User = sqlx::query_as(
            r#"
            SELECT id, phone, name, created_at, updated_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound)?;

        Ok(user)
    }
}
