//! HTTP API for the identity server.
//!
//! # Modules
//!
//! - [`auth`]: Verification codes, registration, login, federated sign-in, password reset
//! - [`middleware`]: Bearer token guard for protected endpoints
//! - [`rate_limiter`]: Per-identifier throttle on code requests
//! - [`request_id`]: Request correlation ids
//! - [`errors`]: Error to status code mapping
//!
//! # Example Usage
//!
//! ```rust,no_run
//! use mi_server::api::{create_router, AppState};
//! # async fn example(state: AppState) -> Result<(), Box<dyn std::error::Error>> {
//! let app = create_router(state);
//!
//! let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # CORS
//!
//! CORS is configured permissively. In production, configure appropriate
//! origins, methods, and headers.

pub mod auth;
pub mod errors;
pub mod middleware;
pub mod rate_limiter;
pub mod request_id;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
};
use mentor_identity::{CredentialIssuer, VerificationBroker, db::Database};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

use rate_limiter::RequestThrottle;

/// Application state shared across all HTTP handlers.
///
/// Cloned for each request; every field is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub issuer: Arc<CredentialIssuer>,
    pub broker: Arc<VerificationBroker>,
    pub throttle: Arc<RequestThrottle>,
    /// `None` when running on in-memory stores
    pub database: Option<Arc<Database>>,
}

/// Create the complete API router with all endpoints and middleware.
///
/// ```text
/// GET  /health                              - Health check (public)
/// POST /api/v1/auth/verification/request    - Send a code (public)
/// POST /api/v1/auth/verification/check      - Check a code, get a ticket (public)
/// POST /api/v1/auth/register                - Register with a ticket (public)
/// POST /api/v1/auth/login                   - Email and password login (public)
/// POST /api/v1/auth/federated               - Google/Apple sign-in (public)
/// POST /api/v1/auth/password/reset          - Reset password with a ticket (public)
/// POST /api/v1/auth/refresh                 - Refresh an access token (public)
/// GET  /api/v1/auth/me                      - Current credential (auth required)
/// ```
pub fn create_router(state: AppState) -> Router {
    let v1_routes = create_v1_router(state.clone());

    Router::new()
        .route("/health", get(health_check))
        .nest("/api/v1", v1_routes)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn create_v1_router(state: AppState) -> Router<AppState> {
    let public_routes = Router::new()
        .route("/auth/verification/request", post(auth::request_code))
        .route("/auth/verification/check", post(auth::check_code))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/federated", post(auth::federated))
        .route("/auth/password/reset", post(auth::reset_password))
        .route("/auth/refresh", post(auth::refresh_token));

    let protected_routes = Router::new()
        .route("/auth/me", get(auth::me))
        .layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth_middleware,
        ));

    Router::new().merge(public_routes).merge(protected_routes)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the store answers, `503 Service Unavailable` otherwise.
///
/// ```bash
/// curl http://localhost:8080/health
/// # {"status":"healthy","storage":"postgres","database":true,"version":"0.1.0","timestamp":"..."}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (storage, db_healthy) = match &state.database {
        Some(database) => ("postgres", database.health_check().await.is_ok()),
        None => ("memory", true),
    };

    let status_code = if db_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if db_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "storage": storage,
        "database": db_healthy,
        "phone_channel": state.broker.supports(mentor_identity::IdentifierKind::Phone),
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
