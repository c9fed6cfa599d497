//! # OTP delivery
//!
//! Best effort. Signup never fails because a code could not be sent, the caller logs the
//! code for an operator instead.
//!
//! Brevo is used through its HTTP API rather than SMTP. With no Brevo key configured every
//! send reports [`MailError::NotConfigured`].
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::config::BrevoConfig;

const BREVO_ENDPOINT: &str = "https://api.brevo.com/v3/smtp/email";
const SUBJECT: &str = "Your AgriQual verification code";

#[derive(Error, Debug)]
pub enum MailError {
    #[error("Mail delivery not configured")]
    NotConfigured,

    #[error("Mail request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Mail provider rejected message (status={status}): {body}")]
    Rejected { status: u16, body: String },
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_otp(&self, email: &str, otp: &str) -> Result<(), MailError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BrevoEmailAddress {
    email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BrevoSendEmailBody {
    sender: BrevoEmailAddress,
    to: Vec<BrevoEmailAddress>,
    subject: String,
    text_content: String,
}

pub struct BrevoMailer {
    client: Client,
    config: BrevoConfig,
    validity_minutes: u64,
}

impl BrevoMailer {
    pub fn new(config: BrevoConfig, validity_minutes: u64) -> Self {
        Self {
            client: Client::new(),
            config,
            validity_minutes,
        }
    }

    fn body(&self, email: &str, otp: &str) -> BrevoSendEmailBody {
        BrevoSendEmailBody {
            sender: BrevoEmailAddress {
                email: self.config.sender_email.clone(),
                name: self.config.sender_name.clone(),
            },
            to: vec![BrevoEmailAddress {
                email: email.to_string(),
                name: None,
            }],
            subject: SUBJECT.to_string(),
            text_content: format!(
                "Your verification code is {otp}. It will expire in {} minutes.",
                self.validity_minutes
            ),
        }
    }
}

#[async_trait]
impl Notifier for BrevoMailer {
    async fn send_otp(&self, email: &str, otp: &str) -> Result<(), MailError> {
        let response = self
            .client
            .post(BREVO_ENDPOINT)
            .header("api-key", &self.config.api_key)
            .header("Accept", "application/json")
            .json(&self.body(email, otp))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(MailError::Rejected {
            status: status.as_u16(),
            body,
        })
    }
}

pub struct NoopMailer;

#[async_trait]
impl Notifier for NoopMailer {
    async fn send_otp(&self, _email: &str, _otp: &str) -> Result<(), MailError> {
        Err(MailError::NotConfigured)
    }
}

/// Keeps every code it is asked to send. Set `fail` to simulate a provider outage; codes
/// are still recorded.
#[derive(Default)]
pub struct RecordingMailer {
    pub fail: bool,
    sent: Mutex<Vec<(String, String)>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }

    pub async fn last_code_for(&self, email: &str) -> Option<String> {
        self.sent
            .lock()
            .await
            .iter()
            .rev()
            .find(|(to, _)| to == email)
            .map(|(_, otp)| otp.clone())
    }
}

#[async_trait]
impl Notifier for RecordingMailer {
    async fn send_otp(&self, email: &str, otp: &str) -> Result<(), MailError> {
        self.sent
            .lock()
            .await
            .push((email.to_string(), otp.to_string()));

        if self.fail {
            return Err(MailError::Rejected {
                status: 503,
                body: "unavailable".to_string(),
            });
        }
        Ok(())
    }
}
