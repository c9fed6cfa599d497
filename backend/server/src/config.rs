use std::{env, fmt::Display, fs::read_to_string, str::FromStr, time::Duration};

use thiserror::Error;
use tracing::{info, warn};

use crate::signup::SignupPolicy;

pub const DEFAULT_ORIGINS: &str = "http://localhost:3000,https://sproj-p08-silk.vercel.app";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value: {message}")]
    Invalid { key: String, message: String },

    #[error("Secret {0} not found in /run/secrets or environment")]
    MissingSecret(String),
}

#[derive(Clone, Debug)]
pub struct BrevoConfig {
    pub api_key: String,
    pub sender_email: String,
    pub sender_name: Option<String>,
}

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    pub redis_url: String,
    pub jwt_secret: String,
    pub allowed_origins: Vec<String>,
    pub otp_ttl_secs: u64,
    pub otp_max_attempts: u32,
    pub token_ttl_days: i64,
    pub password_iterations: u32,
    pub brevo: Option<BrevoConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 5000,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            jwt_secret: String::new(),
            allowed_origins: split_list(DEFAULT_ORIGINS),
            otp_ttl_secs: 600,
            otp_max_attempts: 5,
            token_ttl_days: 7,
            password_iterations: 100_000,
            brevo: None,
        }
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        let jwt_secret =
            read_secret("JWT_SECRET").ok_or(ConfigError::MissingSecret("JWT_SECRET".into()))?;

        let brevo = match (read_secret("BREVO_API_KEY"), var("BREVO_SENDER_EMAIL").ok()) {
            (Some(api_key), Some(sender_email)) if !sender_email.trim().is_empty() => {
                Some(BrevoConfig {
                    api_key,
                    sender_email: sender_email.trim().to_string(),
                    sender_name: var("BREVO_SENDER_NAME").ok(),
                })
            }
            _ => {
                warn!("Brevo not configured, verification codes will only be logged");
                None
            }
        };

        Ok(Self {
            port: try_load("RUST_PORT", "5000")?,
            redis_url: try_load("REDIS_URL", "redis://127.0.0.1:6379")?,
            jwt_secret,
            allowed_origins: split_list(&try_load::<String>("ALLOWED_ORIGINS", DEFAULT_ORIGINS)?),
            otp_ttl_secs: try_load("OTP_TTL_SECS", "600")?,
            otp_max_attempts: try_load("OTP_MAX_ATTEMPTS", "5")?,
            token_ttl_days: try_load("TOKEN_TTL_DAYS", "7")?,
            password_iterations: try_load("PASSWORD_ITERATIONS", "100000")?,
            brevo,
        })
    }

    pub fn signup_policy(&self) -> SignupPolicy {
        SignupPolicy {
            ttl: Duration::from_secs(self.otp_ttl_secs),
            max_attempts: self.otp_max_attempts,
            password_iterations: self.password_iterations,
        }
    }

    pub fn token_validity(&self) -> chrono::Duration {
        chrono::Duration::days(self.token_ttl_days)
    }
}

fn var(key: &str) -> Result<String, ()> {
    env::var(key).map_err(|_| {
        info!("Environment variable {key} not found");
    })
}

fn try_load<T: FromStr>(key: &str, default: &str) -> Result<T, ConfigError>
where
    T::Err: Display,
{
    var(key)
        .unwrap_or_else(|_| {
            info!("{key} not set, using default: {default}");
            default.to_string()
        })
        .parse()
        .map_err(|e: T::Err| {
            warn!("Invalid {key} value: {e}");
            ConfigError::Invalid {
                key: key.to_string(),
                message: e.to_string(),
            }
        })
}

/// Docker secrets first, then a plain environment variable of the same name.
fn read_secret(secret_name: &str) -> Option<String> {
    let path = format!("/run/secrets/{secret_name}");

    read_to_string(&path)
        .map(|s| s.trim().to_string())
        .map_err(|e| {
            info!("Failed to read {secret_name} from file: {e}");
        })
        .ok()
        .or_else(|| var(secret_name).ok().map(|s| s.trim().to_string()))
        .filter(|s| !s.is_empty())
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
