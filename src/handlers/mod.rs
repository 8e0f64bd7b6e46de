//! HTTP handlers for the otpgate API

pub mod auth;

pub use auth::*;
