mod sendgrid;

pub use sendgrid::{SendGridNotifier, SendGridSettings, DEFAULT_SENDGRID_URL};

use super::domain::ArtifactLocation;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tracing::info;

pub const SUBJECT: &str = "A New Expense Report is Ready!";
pub const BODY_HTML: &str = "<p>Hello,</p>\
<p>A new expense report has been generated and is attached to this email. \
The spreadsheet lists every receipt with its compliance status and the \
document summarises the violations that need attention.</p>\
<p>Thank you.</p>";

/// Delivery outcome. Transport failures end up here rather than as errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationStatus {
    pub delivered: bool,
    pub message: String,
}

impl NotificationStatus {
    pub fn delivered(message: impl Into<String>) -> Self {
        Self {
            delivered: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            delivered: false,
            message: message.into(),
        }
    }
}

/// Delivers generated artifacts to the report recipient.
///
/// Never fails past its own boundary: problems become a failed status.
pub trait Notifier: Send + Sync {
    fn notify(
        &self,
        artifacts: &[ArtifactLocation],
    ) -> impl Future<Output = NotificationStatus> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    #[error("unable to read attachment {path}: {source}")]
    Attachment {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("mail transport error: {0}")]
    Transport(String),
    #[error("mail service rejected the message with {status}: {body}")]
    Rejected { status: u16, body: String },
}

/// Notifier used when no mail transport is configured.
#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    async fn notify(&self, artifacts: &[ArtifactLocation]) -> NotificationStatus {
        let names: Vec<String> = artifacts.iter().map(ArtifactLocation::file_name).collect();
        info!(subject = SUBJECT, attachments = %names.join(", "), "report ready (mail transport disabled)");
        NotificationStatus::delivered(format!("Logged notification for {}", names.join(", ")))
    }
}

/// Either configured transport, picked at startup.
#[derive(Debug, Clone)]
pub enum Mailer {
    SendGrid(SendGridNotifier),
    Log(LogNotifier),
}

impl Notifier for Mailer {
    async fn notify(&self, artifacts: &[ArtifactLocation]) -> NotificationStatus {
        match self {
            Mailer::SendGrid(notifier) => notifier.notify(artifacts).await,
            Mailer::Log(notifier) => notifier.notify(artifacts).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn log_notifier_always_delivers() {
        let status = LogNotifier
            .notify(&[ArtifactLocation("out/20250101-120000_expense_report.csv".into())])
            .await;
        assert!(status.delivered);
        assert!(status.message.contains("20250101-120000_expense_report.csv"));
    }
}
