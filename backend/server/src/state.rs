use std::sync::Arc;

use tracing::info;

use super::{
    accounts::{AccountStore, RedisAccounts},
    auth::Auth,
    cache::{Cache, RedisCache},
    config::Config,
    cors::OriginPolicy,
    database::init_redis,
    mailer::{BrevoMailer, NoopMailer, Notifier},
    otp::{OtpSource, RandomOtp},
    signup::Signup,
    token::TokenIssuer,
};

/// Collaborators behind the signup and auth flows.
pub struct Backends {
    pub cache: Arc<dyn Cache>,
    pub accounts: Arc<dyn AccountStore>,
    pub mailer: Arc<dyn Notifier>,
    pub otp: Arc<dyn OtpSource>,
}

pub struct State {
    pub config: Config,
    pub signup: Signup,
    pub auth: Auth,
    pub origins: Arc<OriginPolicy>,
}

impl State {
    pub async fn new(config: Config) -> anyhow::Result<Arc<Self>> {
        let redis_connection = init_redis(&config.redis_url).await?;
        info!("Connected to Redis");

        let mailer: Arc<dyn Notifier> = match &config.brevo {
            Some(brevo) => Arc::new(BrevoMailer::new(
                brevo.clone(),
                config.otp_ttl_secs.div_ceil(60),
            )),
            None => Arc::new(NoopMailer),
        };

        let backends = Backends {
            cache: Arc::new(RedisCache::new(redis_connection.clone())),
            accounts: Arc::new(RedisAccounts::new(redis_connection)),
            mailer,
            otp: Arc::new(RandomOtp),
        };

        Ok(Self::with_backends(config, backends)?)
    }

    pub fn with_backends(config: Config, backends: Backends) -> Result<Arc<Self>, regex::Error> {
        let tokens = TokenIssuer::new(config.jwt_secret.as_bytes(), config.token_validity());
        let origins = Arc::new(OriginPolicy::new(&config.allowed_origins)?);

        let signup = Signup::new(
            backends.cache,
            backends.accounts.clone(),
            backends.mailer,
            tokens.clone(),
            backends.otp,
            config.signup_policy(),
        );
        let auth = Auth::new(backends.accounts, tokens, config.password_iterations);

        Ok(Arc::new(Self {
            config,
            signup,
            auth,
            origins,
        }))
    }
}
