//! Application state shared across handlers

use std::sync::Arc;

use axum::extract::FromRef;

use crate::auth::AuthService;
use crate::config::Environment;
use crate::middleware::PhoneRateLimiter;
use crate::sms::SmsSender;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub auth_service: Arc<AuthService>,
    pub sms_sender: Arc<dyn SmsSender>,
    pub send_limiter: PhoneRateLimiter,
    pub verify_limiter: PhoneRateLimiter,
    pub environment: Environment,
}

impl AppState {
    pub fn new(
        auth_service: Arc<AuthService>,
        sms_sender: Arc<dyn SmsSender>,
        send_limiter: PhoneRateLimiter,
        verify_limiter: PhoneRateLimiter,
        environment: Environment,
    ) -> Self {
        Self {
            auth_service,
            sms_sender,
            send_limiter,
            verify_limiter,
            environment,
        }
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(app_state: &AppState) -> Self {
        app_state.auth_service.clone()
    }
}
