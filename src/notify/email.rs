//! SMTP delivery via lettre.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use super::{Notice, Notifier};
use crate::error::{ConfigError, NotifyError};

// ── Configuration ───────────────────────────────────────────────────

/// SMTP relay configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct SmtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl SmtpConfig {
    /// Build config from environment variables.
    /// Returns `Ok(None)` if `LETTERFLOW_SMTP_HOST` is not set (email disabled).
    pub fn from_env() -> Result<Option<Self>, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>, ConfigError> {
        let Some(host) = lookup("LETTERFLOW_SMTP_HOST").filter(|h| !h.trim().is_empty()) else {
            return Ok(None);
        };

        let port = match lookup("LETTERFLOW_SMTP_PORT") {
            Some(raw) => raw.trim().parse().map_err(|e| ConfigError::InvalidValue {
                key: "LETTERFLOW_SMTP_PORT".into(),
                message: format!("{e}"),
            })?,
            None => 587,
        };

        let username = lookup("LETTERFLOW_SMTP_USERNAME").unwrap_or_default();
        let password = SecretString::from(lookup("LETTERFLOW_SMTP_PASSWORD").unwrap_or_default());
        let from_address = lookup("LETTERFLOW_SMTP_FROM").unwrap_or_else(|| username.clone());
        if from_address.parse::<Mailbox>().is_err() {
            return Err(ConfigError::InvalidValue {
                key: "LETTERFLOW_SMTP_FROM".into(),
                message: format!("not a mailbox: {from_address:?}"),
            });
        }

        Ok(Some(Self {
            host,
            port,
            username,
            password,
            from_address,
        }))
    }
}

// ── Notifier ────────────────────────────────────────────────────────

pub struct EmailNotifier {
    config: SmtpConfig,
}

impl EmailNotifier {
    pub fn new(config: SmtpConfig) -> Self {
        Self { config }
    }

    fn build_message(&self, notice: &Notice) -> Result<Message, NotifyError> {
        let from: Mailbox =
            self.config
                .from_address
                .parse()
                .map_err(|e| NotifyError::InvalidAddress {
                    address: self.config.from_address.clone(),
                    reason: format!("{e}"),
                })?;
        let to: Mailbox = notice.to.parse().map_err(|e| NotifyError::InvalidAddress {
            address: notice.to.clone(),
            reason: format!("{e}"),
        })?;

        Message::builder()
            .from(from)
            .to(to)
            .subject(notice.subject.clone())
            .body(notice.body.clone())
            .map_err(|e| NotifyError::SendFailed {
                name: "email".into(),
                reason: format!("Failed to build email: {e}"),
            })
    }
}

/// Blocking send; run it on the blocking pool.
fn send_blocking(config: &SmtpConfig, email: &Message) -> Result<(), NotifyError> {
    let creds = Credentials::new(
        config.username.clone(),
        config.password.expose_secret().to_string(),
    );

    let transport = SmtpTransport::relay(&config.host)
        .map_err(|e| NotifyError::SendFailed {
            name: "email".into(),
            reason: format!("SMTP relay error: {e}"),
        })?
        .port(config.port)
        .credentials(creds)
        .build();

    transport.send(email).map_err(|e| NotifyError::SendFailed {
        name: "email".into(),
        reason: format!("SMTP send failed: {e}"),
    })?;
    Ok(())
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        "email"
    }

    async fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        let email = self.build_message(notice)?;
        let config = self.config.clone();
        tokio::task::spawn_blocking(move || send_blocking(&config, &email))
            .await
            .map_err(|e| NotifyError::SendFailed {
                name: "email".into(),
                reason: format!("send task failed: {e}"),
            })??;

        tracing::info!(to = %notice.to, "Email sent");
        Ok(())
    }
}
