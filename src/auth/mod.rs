//! Authentication module for otpgate
//!
//! Phone-number OTP authentication and the credential lifecycle:
//! - OTP challenge issuance and single-use verification with attempt limits
//! - Access-token generation and stateless validation
//! - Refresh credential issuance, rotation-on-use, and revocation

mod hasher;
mod jwt;
mod service;
mod store;

pub use hasher::{otp_material, HashError, SecretHasher};
pub use jwt::{generate_access_token, user_id_from_claims, verify_access_token, Claims, JwtError};
pub use service::{AuthError, AuthService, IssuedChallenge, TokenPair};
pub use store::{
    ChallengeStore, PgChallengeStore, PgRefreshTokenStore, PgUserStore, RefreshTokenStore,
    StoreError, UserStore,
};
