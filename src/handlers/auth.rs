//! Authentication handlers
//!
//! The raw refresh secret travels exclusively in an http-only cookie scoped
//! to the auth routes; response bodies carry the access token only.

use axum::{
    extract::{Query, State},
    Json,
};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde::Deserialize;
use validator::Validate;

use crate::auth::TokenPair;
use crate::config::{ACCESS_TOKEN_TTL_SECS, REFRESH_COOKIE_NAME, REFRESH_COOKIE_PATH, REFRESH_TOKEN_TTL_DAYS};
use crate::error::{ApiError, ApiResult};
use crate::middleware::AuthenticatedUser;
use crate::models::{
    AuthTokensResponse, LogoutResponse, RegisterRequest, SendOtpRequest, SendOtpResponse,
    UserResponse, VerifyOtpRequest, CODE_RE,
};
use crate::state::AppState;

/// Build the refresh cookie carrying a raw secret
fn refresh_cookie(state: &AppState, secret: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(REFRESH_COOKIE_NAME, secret);
    cookie.set_http_only(true);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_path(REFRESH_COOKIE_PATH);
    cookie.set_secure(state.environment.is_production());
    cookie.set_max_age(time::Duration::days(REFRESH_TOKEN_TTL_DAYS));
    cookie
}

/// Expired cookie used to clear the refresh secret on logout
fn removal_cookie() -> Cookie<'static> {
    let mut cookie = Cookie::new(REFRESH_COOKIE_NAME, "");
    cookie.set_http_only(true);
    cookie.set_path(REFRESH_COOKIE_PATH);
    cookie
}

fn tokens_response(pair: &TokenPair, user: UserResponse) -> AuthTokensResponse {
    AuthTokensResponse {
        access_token: pair.access_token.clone(),
        token_type: "Bearer".to_string(),
        expires_in: ACCESS_TOKEN_TTL_SECS,
        user,
    }
}

/// Register a phone number (upsert)
///
/// POST /auth/register
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<Json<UserResponse>> {
    payload.validate()?;

    let user = state.auth_service.find_or_create_user(&payload.phone).await?;

    tracing::info!(user_id = %user.id, "User registered");

    Ok(Json(user.into()))
}

#[derive(Debug, Deserialize)]
pub struct SendOtpQuery {
    /// Forces the OTP code; honored outside production only.
    pub dev: Option<String>,
}

/// Issue an OTP challenge and deliver the code by SMS
///
/// POST /auth/send-otp
pub async fn send_otp(
    State(state): State<AppState>,
    Query(query): Query<SendOtpQuery>,
    Json(payload): Json<SendOtpRequest>,
) -> ApiResult<Json<SendOtpResponse>> {
    payload.validate()?;

    if !state.send_limiter.check(&payload.phone).await {
        tracing::warn!(phone = %payload.phone, "OTP send rate limit exceeded");
        return Err(ApiError::TooManyRequests);
    }

    let forced_code = match query.dev {
        Some(code) if !state.environment.is_production() && CODE_RE.is_match(&code) => {
            tracing::warn!(phone = %payload.phone, "Using dev-forced OTP code");
            Some(code)
        }
        _ => None,
    };

    let challenge = state
        .auth_service
        .issue_challenge(&payload.phone, forced_code)
        .await?;

    // The challenge is already persisted; a delivery failure surfaces as 502
    // without rolling it back.
    state
        .sms_sender
        .send(&payload.phone, &challenge.code)
        .await
        .map_err(|e| {
            tracing::error!(phone = %payload.phone, error = %e, "SMS delivery failed");
            ApiError::ExternalServiceError("Failed to deliver verification code".to_string())
        })?;

    tracing::info!(challenge_id = %challenge.challenge_id, "OTP challenge issued");

    Ok(Json(SendOtpResponse {
        challenge_id: challenge.challenge_id,
        expires_at: challenge.expires_at,
        message: "Verification code sent".to_string(),
    }))
}

/// Verify an OTP code and mint a credential pair
///
/// POST /auth/verify-otp
pub async fn verify_otp(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<VerifyOtpRequest>,
) -> ApiResult<(CookieJar, Json<AuthTokensResponse>)> {
    payload.validate()?;

    if !state.verify_limiter.check(&payload.phone).await {
        tracing::warn!(phone = %payload.phone, "OTP verify rate limit exceeded");
        return Err(ApiError::TooManyRequests);
    }

    state
        .auth_service
        .verify_challenge(&payload.phone, &payload.challenge_id, &payload.code)
        .await?;

    let user = state.auth_service.find_or_create_user(&payload.phone).await?;
    let pair = state.auth_service.issue_tokens(user.id).await?;

    tracing::info!(user_id = %user.id, "OTP verified, credentials issued");

    let jar = jar.add(refresh_cookie(&state, pair.refresh_secret.clone()));
    let body = tokens_response(&pair, user.into());

    Ok((jar, Json(body)))
}

/// Rotate the refresh credential presented in the cookie
///
/// POST /auth/refresh
pub async fn refresh(
    State(state): State<AppState>,
    jar: CookieJar,
) -> ApiResult<(CookieJar, Json<AuthTokensResponse>)> {
    let presented = jar
        .get(REFRESH_COOKIE_NAME)
        .map(|c| c.value().to_string())
        .ok_or_else(|| ApiError::Unauthorized("Invalid refresh".to_string()))?;

    let pair = state.auth_service.rotate_refresh(&presented).await?;

    let user = state
        .auth_service
        .get_user_by_id(pair.user_id)
        .await?
        .ok_or_else(|| ApiError::Unauthorized("Invalid refresh".to_string()))?;

    tracing::info!(user_id = %pair.user_id, "Refresh credential rotated");

    let jar = jar.add(refresh_cookie(&state, pair.refresh_secret.clone()));
    let body = tokens_response(&pair, user.into());

    Ok((jar, Json(body)))
}

/// Revoke the presented refresh credential and clear the cookie
///
/// POST /auth/logout
///
/// Always succeeds from the caller's point of view; revocation failures are
/// logged and swallowed so logout cannot strand a client.
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> (CookieJar, Json<LogoutResponse>) {
    if let Some(cookie) = jar.get(REFRESH_COOKIE_NAME) {
        if let Err(e) = state.auth_service.revoke_refresh(cookie.value()).await {
            tracing::error!(error = %e, "Refresh revocation during logout failed");
        }
    }

    let jar = jar.remove(removal_cookie());

    (jar, Json(LogoutResponse {
        message: "Logged out".to_string(),
    }))
}

/// Fetch the authenticated user's profile
///
/// GET /auth/profile
pub async fn profile(
    State(state): State<AppState>,
    auth: AuthenticatedUser,
) -> ApiResult<Json<UserResponse>> {
    let user = state
        .auth_service
        .get_user_by_id(auth.user_id)
        .await?
        .ok_or_else(|| ApiError::NotFound("User not found".to_string()))?;

    Ok(Json(user.into()))
}
