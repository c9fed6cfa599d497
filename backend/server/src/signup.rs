//! # Signup verification
//!
//! A pending signup moves through `NONE -> PENDING -> VERIFIED | REJECTED`.
//!
//! - `submit` puts a [`PendingRegistration`] in the cache under `signup:<email>`. A second
//!   submit for the same email overwrites it, and with it the old code.
//! - `verify` either promotes the record into an account, counts a wrong code, or throws
//!   the record away once the attempt ceiling is hit.
//! - Expiry belongs to the cache. Every write restarts the window, wrong guesses included.
//!
//! All reads and writes for one email happen under that email's lock.
use std::{sync::Arc, time::Duration};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    accounts::{Account, AccountStore, NewAccount, Role, StoreError},
    cache::Cache,
    error::AuthError,
    mailer::Notifier,
    otp::{OtpSource, hash_otp, otp_matches},
    password::hash_password_blocking,
    token::TokenIssuer,
    utils::{KeyedLocks, normalize_email},
};

pub const PENDING_PREFIX: &str = "signup:";

pub fn pending_key(email: &str) -> String {
    format!("{PENDING_PREFIX}{email}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignupPolicy {
    pub ttl: Duration,
    pub max_attempts: u32,
    pub password_iterations: u32,
}

impl Default for SignupPolicy {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            max_attempts: 5,
            password_iterations: 100_000,
        }
    }
}

/// Registration form as it arrives from the client. Missing fields deserialize as empty
/// so they fail validation with a readable message.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignupRequest {
    #[serde(default, alias = "full_name")]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

/// A [`SignupRequest`] that passed validation.
#[derive(Debug, Clone)]
pub struct Registration {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub password: String,
    pub role: Role,
}

impl TryFrom<SignupRequest> for Registration {
    type Error = AuthError;

    fn try_from(request: SignupRequest) -> Result<Self, Self::Error> {
        let name = request.name.trim().to_string();
        let email = normalize_email(&request.email);

        if name.is_empty() || email.is_empty() || request.password.is_empty() {
            return Err(AuthError::validation(
                "Name, email and password are required",
            ));
        }

        let role = match request.role.as_deref().map(str::trim) {
            None | Some("") => Role::default(),
            Some(raw) => raw.parse::<Role>().map_err(AuthError::Validation)?,
        };

        Ok(Self {
            name,
            email,
            phone: request.phone.unwrap_or_default().trim().to_string(),
            password: request.password,
            role,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingRegistration {
    pub email: String,
    pub name: String,
    pub phone: String,
    pub role: Role,
    pub password_hash: String,
    pub otp_hash: String,
    pub attempt_count: u32,
    pub created_at: DateTime<Utc>,
}

impl PendingRegistration {
    fn into_new_account(self) -> NewAccount {
        NewAccount {
            email: self.email,
            name: self.name,
            phone: self.phone,
            role: self.role,
            password_hash: self.password_hash,
            email_verified: true,
        }
    }
}

/// A freshly authenticated account and its session token.
#[derive(Debug, Clone)]
pub struct Session {
    pub account: Account,
    pub token: String,
}

pub struct Signup {
    cache: Arc<dyn Cache>,
    accounts: Arc<dyn AccountStore>,
    mailer: Arc<dyn Notifier>,
    tokens: TokenIssuer,
    otp: Arc<dyn OtpSource>,
    locks: KeyedLocks,
    policy: SignupPolicy,
}

impl Signup {
    pub fn new(
        cache: Arc<dyn Cache>,
        accounts: Arc<dyn AccountStore>,
        mailer: Arc<dyn Notifier>,
        tokens: TokenIssuer,
        otp: Arc<dyn OtpSource>,
        policy: SignupPolicy,
    ) -> Self {
        Self {
            cache,
            accounts,
            mailer,
            tokens,
            otp,
            locks: KeyedLocks::new(),
            policy,
        }
    }

    pub async fn submit(&self, request: SignupRequest) -> Result<(), AuthError> {
        let registration = Registration::try_from(request)?;

        if self.accounts.find_by_email(&registration.email).await?.is_some() {
            return Err(AuthError::DuplicateAccount);
        }

        let password_hash = hash_password_blocking(
            registration.password,
            self.policy.password_iterations,
        )
        .await?;

        let otp = self.otp.generate();
        let pending = PendingRegistration {
            email: registration.email,
            name: registration.name,
            phone: registration.phone,
            role: registration.role,
            password_hash,
            otp_hash: hash_otp(&otp),
            attempt_count: 0,
            created_at: Utc::now(),
        };

        {
            let _guard = self.locks.acquire(&pending.email).await;

            // An account may have been created while the password was hashing.
            if self.accounts.find_by_email(&pending.email).await?.is_some() {
                return Err(AuthError::DuplicateAccount);
            }

            self.store(&pending).await?;
        }

        info!(email = %pending.email, "Pending signup stored");

        if let Err(e) = self.mailer.send_otp(&pending.email, &otp).await {
            warn!(
                email = %pending.email,
                code = %otp,
                "OTP delivery failed ({e}), code surfaced here for operators"
            );
        }

        Ok(())
    }

    pub async fn verify(&self, email: &str, otp: &str) -> Result<Session, AuthError> {
        let email = normalize_email(email);
        let otp = otp.trim();

        if email.is_empty() || otp.is_empty() {
            return Err(AuthError::validation("Email and OTP are required"));
        }

        let key = pending_key(&email);
        let _guard = self.locks.acquire(&email).await;

        let Some(mut pending) = self.load(&key).await? else {
            return Err(AuthError::NoPendingSignup);
        };

        if pending.attempt_count >= self.policy.max_attempts {
            self.cache.delete(&key).await?;
            warn!(email = %email, "Signup rejected after too many attempts");
            return Err(AuthError::TooManyAttempts);
        }

        if !otp_matches(otp, &pending.otp_hash) {
            pending.attempt_count += 1;
            self.store(&pending).await?;

            return Err(AuthError::InvalidOtp {
                remaining: self.policy.max_attempts.saturating_sub(pending.attempt_count),
            });
        }

        if self.accounts.find_by_email(&email).await?.is_some() {
            self.cache.delete(&key).await?;
            return Err(AuthError::DuplicateAccount);
        }

        let account = match self.accounts.create(pending.into_new_account()).await {
            Ok(account) => account,
            Err(StoreError::Duplicate) => {
                self.cache.delete(&key).await?;
                return Err(AuthError::DuplicateAccount);
            }
            Err(e) => return Err(e.into()),
        };

        if let Err(e) = self.cache.delete(&key).await {
            warn!(email = %email, "Account created but pending signup not removed: {e}");
        }

        info!(email = %email, id = %account.id, "Signup verified");

        let token = self.tokens.issue(&account)?;
        Ok(Session { account, token })
    }

    /// Current pending record for an email, if it has not expired.
    pub async fn pending(&self, email: &str) -> Result<Option<PendingRegistration>, AuthError> {
        self.load(&pending_key(&normalize_email(email))).await
    }

    async fn load(&self, key: &str) -> Result<Option<PendingRegistration>, AuthError> {
        match self.cache.get(key).await? {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn store(&self, pending: &PendingRegistration) -> Result<(), AuthError> {
        let json = serde_json::to_string(pending)?;
        self.cache
            .set(&pending_key(&pending.email), &json, self.policy.ttl)
            .await?;
        Ok(())
    }
}
