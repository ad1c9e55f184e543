use super::domain::{ArtifactLocation, Receipt};
use super::extraction::ExtractionFailed;
use super::notify::NotificationStatus;
use super::state::ControlSignal;
use serde::Serialize;

/// Component that produced an update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageTag {
    Extraction,
    Compliance,
    Report,
    Notification,
    Control,
}

impl StageTag {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Extraction => "Extraction",
            Self::Compliance => "Compliance",
            Self::Report => "Report",
            Self::Notification => "Notification",
            Self::Control => "Control",
        }
    }
}

/// Run state fields an update can touch, so observers can filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunField {
    ExtractedReceipts,
    ExtractionFailures,
    ValidatedReceipts,
    ReportArtifacts,
    NotificationSent,
    ControlSignal,
}

/// One mergeable change to the run state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StateChange {
    ReceiptExtracted {
        receipt: Receipt,
    },
    ExtractionFailed {
        failure: ExtractionFailed,
    },
    ReceiptValidated {
        receipt: Receipt,
    },
    ReportGenerated {
        artifacts: Vec<ArtifactLocation>,
        receipts_covered: usize,
    },
    NotificationDispatched {
        status: NotificationStatus,
    },
    Terminated,
}

impl StateChange {
    pub fn fields(&self) -> &'static [RunField] {
        match self {
            Self::ReceiptExtracted { .. } => &[RunField::ExtractedReceipts],
            Self::ExtractionFailed { .. } => &[RunField::ExtractionFailures],
            Self::ReceiptValidated { .. } => &[RunField::ValidatedReceipts],
            Self::ReportGenerated { .. } => &[RunField::ReportArtifacts],
            Self::NotificationDispatched { .. } => {
                &[RunField::NotificationSent, RunField::ControlSignal]
            }
            Self::Terminated => &[RunField::ControlSignal],
        }
    }
}

/// Items done versus items known for the stage at the time of the update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Progress {
    pub done: usize,
    pub total: usize,
}

/// Incremental change emitted by the orchestrator before it continues.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PartialUpdate {
    pub stage: StageTag,
    pub change: StateChange,
    pub progress: Progress,
}

impl PartialUpdate {
    pub fn touches(&self, field: RunField) -> bool {
        self.change.fields().contains(&field)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.change, StateChange::Terminated)
    }

    pub fn signal(&self) -> Option<ControlSignal> {
        match self.change {
            StateChange::NotificationDispatched { .. } | StateChange::Terminated => {
                Some(ControlSignal::Terminate)
            }
            _ => None,
        }
    }

    /// Human readable one-liner for progress displays.
    pub fn describe(&self) -> String {
        let Progress { done, total } = self.progress;
        match &self.change {
            StateChange::ReceiptExtracted { receipt } => {
                format!("Extracted {done}/{total} ({})", receipt.receipt_id)
            }
            StateChange::ExtractionFailed { failure } => format!(
                "Extraction failed for {} ({done}/{total} settled): {}",
                failure.receipt_id, failure.cause
            ),
            StateChange::ReceiptValidated { receipt } => format!(
                "Validated {done}/{total} ({}: {})",
                receipt.receipt_id,
                receipt.compliance_label()
            ),
            StateChange::ReportGenerated { artifacts, .. } => {
                let names: Vec<String> = artifacts.iter().map(|a| a.file_name()).collect();
                format!("Report generated: {}", names.join(", "))
            }
            StateChange::NotificationDispatched { status } => {
                format!("Notification: {}", status.message)
            }
            StateChange::Terminated => "Run complete".to_string(),
        }
    }
}
