use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::{
    accounts::StoreError, cache::CacheError, password::PasswordError, token::TokenError,
};

/// Infrastructure failures. Logged in full, never shown to clients.
#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("cache: {0}")]
    Cache(#[from] CacheError),

    #[error("account store: {0}")]
    Store(StoreError),

    #[error("pending record: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("password: {0}")]
    Password(#[from] PasswordError),

    #[error("token: {0}")]
    Token(#[from] TokenError),
}

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("{0}")]
    Validation(String),

    #[error("User already exists with this email")]
    DuplicateAccount,

    #[error("OTP expired or not found. Please sign up again.")]
    NoPendingSignup,

    #[error("Invalid OTP. {remaining} attempt(s) remaining")]
    InvalidOtp { remaining: u32 },

    #[error("Too many incorrect attempts. Please sign up again.")]
    TooManyAttempts,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("User not found")]
    AccountNotFound,

    #[error("Upstream failure: {0}")]
    Upstream(#[from] UpstreamError),
}

impl AuthError {
    pub fn validation(message: &str) -> Self {
        Self::Validation(message.to_string())
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Duplicate => AuthError::DuplicateAccount,
            StoreError::NotFound => AuthError::AccountNotFound,
            other => AuthError::Upstream(UpstreamError::Store(other)),
        }
    }
}

impl From<CacheError> for AuthError {
    fn from(e: CacheError) -> Self {
        AuthError::Upstream(e.into())
    }
}

impl From<serde_json::Error> for AuthError {
    fn from(e: serde_json::Error) -> Self {
        AuthError::Upstream(e.into())
    }
}

impl From<PasswordError> for AuthError {
    fn from(e: PasswordError) -> Self {
        AuthError::Upstream(e.into())
    }
}

impl From<TokenError> for AuthError {
    fn from(e: TokenError) -> Self {
        AuthError::Upstream(e.into())
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Malformed payload")]
    MalformedPayload,

    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::MalformedPayload => StatusCode::BAD_REQUEST,
            AppError::Auth(e) => match e {
                AuthError::Validation(_)
                | AuthError::DuplicateAccount
                | AuthError::NoPendingSignup
                | AuthError::InvalidOtp { .. }
                | AuthError::TooManyAttempts => StatusCode::BAD_REQUEST,
                AuthError::InvalidCredentials | AuthError::Unauthorized => {
                    StatusCode::UNAUTHORIZED
                }
                AuthError::AccountNotFound => StatusCode::NOT_FOUND,
                AuthError::Upstream(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            AppError::Auth(AuthError::Upstream(e)) => {
                error!("Request failed: {e}");
                "Server error".to_string()
            }
            other => other.to_string(),
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}
