//! Authentication models for otpgate

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

lazy_static! {
    /// E.164: +<country><subscriber>, 8-15 digits total
    pub static ref PHONE_RE: Regex = Regex::new(r"^\+[1-9]\d{7,14}$").unwrap();
    /// Exactly six decimal digits, zero-padded
    pub static ref CODE_RE: Regex = Regex::new(r"^\d{6}$").unwrap();
    /// Challenge ids are UUIDs
    pub static ref CHALLENGE_ID_RE: Regex = Regex::new(
        r"^[0-9a-f]{8}-[0-9a-f]{4}-[1-5][0-9a-f]{3}-[89ab][0-9a-f]{3}-[0-9a-f]{12}$"
    )
    .unwrap();
}

/// Outstanding OTP challenge row
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct OtpChallenge {
    pub id: Uuid,
    pub challenge_id: String,
    pub phone: String,
    pub code_hash: String,
    pub attempts: i32,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Refresh credential row. Never physically deleted; `revoked` only ever
/// moves false -> true.
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct RefreshToken {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ============================================================================
// Request/Response DTOs
// ============================================================================

/// Request to register a phone number
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(regex(path = "PHONE_RE", message = "Phone must be E.164 (e.g. +15551234567)"))]
    pub phone: String,
}

/// Request to send an OTP
#[derive(Debug, Deserialize, Validate)]
pub struct SendOtpRequest {
    #[validate(regex(path = "PHONE_RE", message = "Phone must be E.164 (e.g. +15551234567)"))]
    pub phone: String,
}

/// Response for a sent OTP. The plaintext code is never part of this body.
#[derive(Debug, Serialize)]
pub struct SendOtpResponse {
    pub challenge_id: String,
    pub expires_at: DateTime<Utc>,
    pub message: String,
}

/// Request to verify an OTP
#[derive(Debug, Deserialize, Validate)]
pub struct VerifyOtpRequest {
    #[validate(regex(path = "PHONE_RE", message = "Phone must be E.164 (e.g. +15551234567)"))]
    pub phone: String,
    #[validate(regex(path = "CHALLENGE_ID_RE", message = "Invalid challenge id"))]
    pub challenge_id: String,
    #[validate(regex(path = "CODE_RE", message = "Code must be 6 digits"))]
    pub code: String,
}

/// Auth tokens response: the access token only. The rotating refresh secret
/// travels exclusively in the http-only cookie.
#[derive(Debug, Serialize)]
pub struct AuthTokensResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub user: UserResponse,
}

/// User response (sanitized for API)
#[derive(Debug, Serialize, Clone)]
pub struct UserResponse {
    pub id: Uuid,
    pub phone: String,
    pub name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Logout response
#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phone_regex() {
        assert!(PHONE_RE.is_match("+15551234567"));
        assert!(PHONE_RE.is_match("+919876543210"));

        assert!(!PHONE_RE.is_match("15551234567")); // missing +
        assert!(!PHONE_RE.is_match("+05551234567")); // leading zero
        assert!(!PHONE_RE.is_match("+1555123")); // too short
        assert!(!PHONE_RE.is_match("+1555123456789012")); // too long
        assert!(!PHONE_RE.is_match("+1555-123-4567")); // punctuation
    }

    #[test]
    fn test_code_regex() {
        assert!(CODE_RE.is_match("000000"));
        assert!(CODE_RE.is_match("042917"));
        assert!(!CODE_RE.is_match("42917"));
        assert!(!CODE_RE.is_match("0429170"));
        assert!(!CODE_RE.is_match("o42917"));
    }

    #[test]
    fn test_challenge_id_regex() {
        let id = Uuid::new_v4().to_string();
        assert!(CHALLENGE_ID_RE.is_match(&id));
        assert!(!CHALLENGE_ID_RE.is_match("not-a-uuid"));
    }

    #[test]
    fn test_verify_request_validation() {
        let valid = VerifyOtpRequest {
            phone: "+15551234567".to_string(),
            challenge_id: Uuid::new_v4().to_string(),
            code: "042917".to_string(),
        };
        assert!(valid.validate().is_ok());

        let invalid = VerifyOtpRequest {
            phone: "5551234567".to_string(),
            challenge_id: "abc".to_string(),
            code: "1234".to_string(),
        };
        assert!(invalid.validate().is_err());
    }
}
