use super::{NotificationError, NotificationStatus, Notifier, BODY_HTML, SUBJECT};
use crate::workflows::expense::domain::ArtifactLocation;
use base64::Engine as _;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_SENDGRID_URL: &str = "https://api.sendgrid.com";

#[derive(Debug, Clone)]
pub struct SendGridSettings {
    pub api_key: String,
    pub sender: String,
    pub recipient: String,
    pub base_url: String,
    pub timeout: Duration,
}

/// Mails the report artifacts through SendGrid's v3 API.
#[derive(Debug, Clone)]
pub struct SendGridNotifier {
    settings: SendGridSettings,
    http: reqwest::Client,
}

impl SendGridNotifier {
    pub fn new(settings: SendGridSettings) -> Result<Self, NotificationError> {
        let http = reqwest::Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|err| NotificationError::Transport(err.to_string()))?;
        Ok(Self { settings, http })
    }

    async fn attachment(artifact: &ArtifactLocation) -> Result<Value, NotificationError> {
        let bytes = tokio::fs::read(artifact.path()).await.map_err(|source| {
            NotificationError::Attachment {
                path: artifact.to_string(),
                source,
            }
        })?;
        let mime = mime_guess::from_path(artifact.path()).first_or_octet_stream();
        Ok(json!({
            "content": base64::engine::general_purpose::STANDARD.encode(bytes),
            "filename": artifact.file_name(),
            "type": mime.essence_str(),
            "disposition": "attachment",
        }))
    }

    async fn message(&self, artifacts: &[ArtifactLocation]) -> Result<Value, NotificationError> {
        let mut attachments = Vec::with_capacity(artifacts.len());
        for artifact in artifacts {
            attachments.push(Self::attachment(artifact).await?);
        }
        Ok(json!({
            "personalizations": [{ "to": [{ "email": self.settings.recipient }] }],
            "from": { "email": self.settings.sender },
            "subject": SUBJECT,
            "content": [{ "type": "text/html", "value": BODY_HTML }],
            "attachments": attachments,
        }))
    }

    async fn send(&self, artifacts: &[ArtifactLocation]) -> Result<(), NotificationError> {
        let body = self.message(artifacts).await?;
        let url = format!(
            "{}/v3/mail/send",
            self.settings.base_url.trim_end_matches('/')
        );
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.settings.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|err| NotificationError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(NotificationError::Rejected {
                status: status.as_u16(),
                body,
            })
        }
    }
}

impl Notifier for SendGridNotifier {
    async fn notify(&self, artifacts: &[ArtifactLocation]) -> NotificationStatus {
        match self.send(artifacts).await {
            Ok(()) => {
                info!(recipient = %self.settings.recipient, attachments = artifacts.len(), "report emailed");
                NotificationStatus::delivered("Email Sent.")
            }
            Err(err) => {
                warn!(error = %err, "report email failed");
                NotificationStatus::failed(format!("Email failed: {err}"))
            }
        }
    }
}
