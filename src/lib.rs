//! otpgate: phone-number OTP authentication backend
//!
//! Issues single-use SMS OTP challenges and exchanges them for an access
//! token plus a rotating refresh credential delivered in an http-only
//! cookie.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod sms;
pub mod state;
