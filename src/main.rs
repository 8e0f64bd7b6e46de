//! otpgate server binary

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use axum::{
    http::{header, HeaderValue, Method, StatusCode},
    middleware as axum_middleware,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tracing_subscriber::EnvFilter;

use otpgate::auth::{
    AuthService, PgChallengeStore, PgRefreshTokenStore, PgUserStore, SecretHasher,
};
use otpgate::config::Config;
use otpgate::middleware::{
    hsts_header, rate_limit_layer, request_tracing, security_headers, PhoneRateLimiter,
    RateLimiter,
};
use otpgate::routes::auth_routes;
use otpgate::sms::{DevSmsSender, SmsSender, TwilioSmsSender};
use otpgate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env().context("configuration error")?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone())),
        )
        .init();

    tracing::info!(
        environment = %config.environment.as_str(),
        database = %config.database_url_masked(),
        "Starting otpgate"
    );

    let pool = PgPoolOptions::new()
        .max_connections(config.db_max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&config.database_url)
        .await
        .context("failed to connect to database")?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("failed to run migrations")?;

    let auth_service = Arc::new(AuthService::new(
        Arc::new(PgChallengeStore::new(pool.clone())),
        Arc::new(PgRefreshTokenStore::new(pool.clone())),
        Arc::new(PgUserStore::new(pool.clone())),
        SecretHasher::for_otp_codes(),
        SecretHasher::for_refresh_secrets(),
        config.jwt_access_secret.clone(),
        config.otp_pepper.clone(),
    ));

    let sms_sender: Arc<dyn SmsSender> = match (
        &config.twilio_account_sid,
        &config.twilio_auth_token,
        &config.twilio_phone_number,
    ) {
        (Some(sid), Some(token), Some(from)) => Arc::new(TwilioSmsSender::new(
            sid.clone(),
            token.clone(),
            from.clone(),
        )),
        _ if config.environment.is_production() => {
            anyhow::bail!("Twilio credentials are required in production");
        }
        _ => {
            tracing::warn!("Twilio credentials not set, using dev SMS sender");
            Arc::new(DevSmsSender)
        }
    };

    // 5 sends and 10 verifies per phone per 15 minutes.
    let send_limiter = PhoneRateLimiter::new(5, Duration::from_secs(15 * 60));
    let verify_limiter = PhoneRateLimiter::new(10, Duration::from_secs(15 * 60));

    let state = AppState::new(
        auth_service,
        sms_sender,
        send_limiter.clone(),
        verify_limiter.clone(),
        config.environment.clone(),
    );

    let ip_limiter = RateLimiter::new(config.rate_limit_rps);

    // Periodic eviction of stale limiter entries.
    {
        let ip_limiter = ip_limiter.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(300));
            loop {
                interval.tick().await;
                ip_limiter.cleanup(Duration::from_secs(600)).await;
                send_limiter.cleanup().await;
                verify_limiter.cleanup().await;
            }
        });
    }

    let cors = build_cors(&config);

    let health_pool = pool.clone();
    let mut app = Router::new()
        .route("/", get(root))
        .route("/health", get(move || health(health_pool.clone())))
        .merge(auth_routes())
        .with_state(state)
        .layer(cors)
        .layer(axum_middleware::from_fn(security_headers))
        .layer(axum_middleware::from_fn(request_tracing))
        .layer(axum_middleware::from_fn(rate_limit_layer(ip_limiter)));

    if config.environment.is_production() {
        app = app.layer(axum_middleware::from_fn(hsts_header));
    }

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!(addr = %addr, "otpgate listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

/// Build the CORS layer. Credentialed CORS requires explicit origins; the
/// permissive fallback is for development only.
fn build_cors(config: &Config) -> CorsLayer {
    match &config.cors_allowed_origins {
        Some(origins) => {
            let origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|o| o.trim().parse().ok())
                .collect();

            CorsLayer::new()
                .allow_origin(AllowOrigin::list(origins))
                .allow_methods([Method::GET, Method::POST])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
                .allow_credentials(true)
        }
        None => {
            tracing::warn!("CORS_ALLOWED_ORIGINS not set, allowing all origins without credentials");
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        }
    }
}

async fn root() -> impl IntoResponse {
    Json(serde_json::json!({
        "service": "otpgate",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

async fn health(pool: PgPool) -> impl IntoResponse {
    match sqlx::query("SELECT 1").execute(&pool).await {
        Ok(_) => (
            StatusCode::OK,
            Json(serde_json::json!({ "status": "healthy", "database": "connected" })),
        ),
        Err(e) => {
            tracing::error!(error = %e, "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "unhealthy", "database": "disconnected" })),
            )
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl+c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
