//! Notifications: notices composed from letter events and delivered through
//! a [`Notifier`].

pub mod compose;
pub mod dispatch;
pub mod email;

use async_trait::async_trait;

use crate::error::NotifyError;

pub use compose::{audience, compose};
pub use dispatch::spawn_notifier_task;
pub use email::{EmailNotifier, SmtpConfig};

/// One message to one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// A delivery channel for notices.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn send(&self, notice: &Notice) -> Result<(), NotifyError>;
}

/// Writes notices to the log. Used when no mail relay is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        tracing::info!(to = %notice.to, subject = %notice.subject, "Notice");
        Ok(())
    }
}
