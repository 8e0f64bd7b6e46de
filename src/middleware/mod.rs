//! Middleware for the otpgate API
//!
//! Request tracing, rate limiting, security headers, and the access-token
//! extractor used by protected routes.

pub mod auth;
mod rate_limiter;
mod security;
mod tracing;

pub use auth::AuthenticatedUser;
pub use rate_limiter::{rate_limit_layer, PhoneRateLimiter, RateLimiter};
pub use security::{hsts_header, security_headers};
pub use tracing::request_tracing;
