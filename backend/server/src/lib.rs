//! Documentation of the AgriQual authentication backend.
//!
//! Crop diagnosis and advisories for farmers and inspectors. This crate owns accounts:
//! signup with an emailed one-time passcode, direct registration, login and password changes.
//!
//!
//!
//! # General Infrastructure
//! - Frontend talks to this server over JSON, CORS restricted to known origins
//! - Redis holds both the short-lived pending signups and the durable accounts
//! - Verification codes go out through a transactional mail API (Brevo)
//! - Sessions are HS256 JWTs valid for 7 days
//!
//!
//!
//! # Signup Flow
//!
//! **Goal**: Nobody gets an account for an email address they cannot read.
//!
//! - User submits name, email, phone, password and role
//! - If an account already owns the email, reject right away
//! - Generate a 6 digit code, keep only its SHA-256 digest
//! - Hash the password, park everything in Redis under `signup:<email>` for 10 minutes
//! - Email the code, if mail is down the code lands in the server log instead
//! - User sends the code back
//! - Wrong code bumps the attempt counter and restarts the 10 minute window
//! - 5 wrong codes and the pending signup is gone, user must start over
//! - Right code creates the account, drops the pending entry, hands back a token
//!
//!
//!
//! # Notes
//!
//! ## Attempt counting
//! Redis is treated as a plain key-value store, so incrementing the attempt counter is a
//! read-modify-write on the whole record. All signup mutations for one email go through a
//! per-email lock inside the process, which makes the count exact on a single instance.
//! With several instances behind one Redis the ceiling is still enforced, just not to the
//! exact attempt.
//!
//! ## Duplicate accounts
//! Direct registration skips the pending record entirely, so an account can appear while a
//! signup is waiting on its code. Verification checks again right before writing, and the
//! store itself only writes an account with `MSETNX`. A losing write surfaces as a duplicate,
//! never as a server error.
//!
//!
//!
//! # Setup
//!
//! Environment
//! ```sh
//! export REDIS_URL=redis://127.0.0.1:6379
//! export JWT_SECRET=change-me
//! export RUST_LOG=info
//! ```
//!
//! Optional mail delivery
//! ```sh
//! export BREVO_API_KEY=...
//! export BREVO_SENDER_EMAIL=no-reply@agriqual.app
//! ```
//!
//! View current docs.
//! ```sh
//! cargo doc --open
//! ```
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};

use signal::{
    ctrl_c,
    unix::{SignalKind, signal},
};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt};

pub mod accounts;
pub mod auth;
pub mod cache;
pub mod config;
pub mod cors;
pub mod database;
pub mod error;
pub mod mailer;
pub mod otp;
pub mod password;
pub mod routes;
pub mod signup;
pub mod state;
pub mod token;
pub mod utils;

use config::Config;
use cors::cors_layer;
use routes::{
    change_password_handler, health_handler, login_handler, register_handler,
    register_otp_handler, verify_otp_handler,
};
use state::State;

pub fn build_router(state: Arc<State>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/health", get(health_handler))
        .route("/api/auth/register-otp", post(register_otp_handler))
        .route("/api/auth/verify-otp", post(verify_otp_handler))
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/account/change-password", post(change_password_handler))
        .layer(cors_layer(state.origins.clone()))
        .with_state(state)
}

pub async fn start_server() -> anyhow::Result<()> {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    info!("Loading config...");
    let config = Config::load()?;

    info!("Initializing state...");
    let state = State::new(config).await?;

    info!("Starting server...");

    let address = format!("0.0.0.0:{}", state.config.port);
    let app = build_router(state);
    info!("Binding to {address}");

    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }

        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                tracing::error!("Failed to install signal handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
