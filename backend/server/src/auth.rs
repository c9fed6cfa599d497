use std::sync::Arc;

use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use crate::{
    accounts::{AccountStore, NewAccount},
    error::AuthError,
    password::{hash_password_blocking, verify_password_blocking},
    signup::{Registration, Session, SignupRequest},
    token::TokenIssuer,
    utils::normalize_email,
};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    #[serde(default)]
    pub old_password: String,
    #[serde(default)]
    pub new_password: String,
}

/// Account flows that skip email verification.
pub struct Auth {
    accounts: Arc<dyn AccountStore>,
    tokens: TokenIssuer,
    password_iterations: u32,
}

impl Auth {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        tokens: TokenIssuer,
        password_iterations: u32,
    ) -> Self {
        Self {
            accounts,
            tokens,
            password_iterations,
        }
    }

    pub async fn register(&self, request: SignupRequest) -> Result<Session, AuthError> {
        let registration = Registration::try_from(request)?;

        if self.accounts.find_by_email(&registration.email).await?.is_some() {
            return Err(AuthError::DuplicateAccount);
        }

        let password_hash =
            hash_password_blocking(registration.password, self.password_iterations).await?;

        let account = self
            .accounts
            .create(NewAccount {
                email: registration.email,
                name: registration.name,
                phone: registration.phone,
                role: registration.role,
                password_hash,
                email_verified: false,
            })
            .await?;

        info!(email = %account.email, id = %account.id, "Account registered");

        let token = self.tokens.issue(&account)?;
        Ok(Session { account, token })
    }

    pub async fn login(&self, request: LoginRequest) -> Result<Session, AuthError> {
        let email = normalize_email(&request.email);
        if email.is_empty() || request.password.is_empty() {
            return Err(AuthError::validation("Email and password are required"));
        }

        let Some(account) = self.accounts.find_by_email(&email).await? else {
            return Err(AuthError::InvalidCredentials);
        };

        if !verify_password_blocking(request.password, account.password_hash.clone()).await? {
            return Err(AuthError::InvalidCredentials);
        }

        let token = self.tokens.issue(&account)?;
        Ok(Session { account, token })
    }

    /// `authorization` is the raw `Authorization` header value.
    pub async fn change_password(
        &self,
        authorization: Option<&str>,
        request: ChangePasswordRequest,
    ) -> Result<(), AuthError> {
        let id = self.authenticate(authorization)?;

        if request.old_password.is_empty() || request.new_password.is_empty() {
            return Err(AuthError::validation(
                "Old password and new password are required",
            ));
        }

        if request.new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(AuthError::validation(
                "New password must be at least 8 characters long",
            ));
        }

        let account = self
            .accounts
            .find_by_id(&id)
            .await?
            .ok_or(AuthError::AccountNotFound)?;

        if !verify_password_blocking(request.old_password, account.password_hash).await? {
            return Err(AuthError::validation("Old password is incorrect"));
        }

        let password_hash =
            hash_password_blocking(request.new_password, self.password_iterations).await?;
        self.accounts.update_password_hash(&id, password_hash).await?;

        info!(id = %id, "Password changed");
        Ok(())
    }

    fn authenticate(&self, authorization: Option<&str>) -> Result<Uuid, AuthError> {
        let token = authorization
            .and_then(|header| header.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or(AuthError::Unauthorized)?;

        let claims = self
            .tokens
            .verify(token)
            .map_err(|_| AuthError::Unauthorized)?;

        Uuid::parse_str(&claims.user_id).map_err(|_| AuthError::Unauthorized)
    }
}
