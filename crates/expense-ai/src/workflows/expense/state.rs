use super::domain::{
    ArtifactLocation, Receipt, ReceiptId, ReceiptSource, SubmissionMetadata,
};
use super::extraction::ExtractionFailed;
use super::intake::IntakeError;
use super::notify::NotificationStatus;
use super::ruleset::RuleSet;
use super::update::StateChange;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::warn;

/// Marker written by the action stage to pick the next graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlSignal {
    Continue,
    Terminate,
}

/// Whether the report stage runs once per run or again when new receipts
/// are validated after the artifacts were written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportMode {
    #[default]
    Barrier,
    Append,
}

/// The single mutable record threaded through one run.
///
/// Sources, rules and metadata are fixed at construction. The receipt
/// sequences only grow, and only through [`RunState::apply`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunState {
    receipt_sources: Vec<ReceiptSource>,
    extracted_receipts: Vec<Receipt>,
    #[serde(default)]
    extraction_failures: Vec<ExtractionFailed>,
    validated_receipts: Vec<Receipt>,
    compliance_rules: RuleSet,
    report_artifacts: Vec<ArtifactLocation>,
    #[serde(default)]
    reported_receipts: usize,
    notification_sent: bool,
    #[serde(default)]
    notification_status: Option<NotificationStatus>,
    metadata: SubmissionMetadata,
    control_signal: Option<ControlSignal>,
}

impl RunState {
    pub fn new(
        receipt_sources: Vec<ReceiptSource>,
        compliance_rules: RuleSet,
        metadata: SubmissionMetadata,
    ) -> Result<Self, IntakeError> {
        let mut seen = HashSet::new();
        for source in &receipt_sources {
            let id = source.receipt_id();
            if !seen.insert(id.clone()) {
                return Err(IntakeError::DuplicateReceipt(id));
            }
        }

        Ok(Self {
            receipt_sources,
            extracted_receipts: Vec::new(),
            extraction_failures: Vec::new(),
            validated_receipts: Vec::new(),
            compliance_rules,
            report_artifacts: Vec::new(),
            reported_receipts: 0,
            notification_sent: false,
            notification_status: None,
            metadata,
            control_signal: None,
        })
    }

    pub fn receipt_sources(&self) -> &[ReceiptSource] {
        &self.receipt_sources
    }

    pub fn extracted_receipts(&self) -> &[Receipt] {
        &self.extracted_receipts
    }

    pub fn extraction_failures(&self) -> &[ExtractionFailed] {
        &self.extraction_failures
    }

    pub fn validated_receipts(&self) -> &[Receipt] {
        &self.validated_receipts
    }

    pub fn compliance_rules(&self) -> &RuleSet {
        &self.compliance_rules
    }

    pub fn report_artifacts(&self) -> &[ArtifactLocation] {
        &self.report_artifacts
    }

    pub fn notification_sent(&self) -> bool {
        self.notification_sent
    }

    pub fn notification_status(&self) -> Option<&NotificationStatus> {
        self.notification_status.as_ref()
    }

    pub fn metadata(&self) -> &SubmissionMetadata {
        &self.metadata
    }

    pub fn control_signal(&self) -> Option<ControlSignal> {
        self.control_signal
    }

    pub(crate) fn set_control_signal(&mut self, signal: ControlSignal) {
        self.control_signal = Some(signal);
    }

    fn extracted_ids(&self) -> HashSet<&ReceiptId> {
        self.extracted_receipts
            .iter()
            .map(|receipt| &receipt.receipt_id)
            .collect()
    }

    fn validated_ids(&self) -> HashSet<&ReceiptId> {
        self.validated_receipts
            .iter()
            .map(|receipt| &receipt.receipt_id)
            .collect()
    }

    /// Sources with neither an extracted receipt nor a recorded failure, in source order.
    pub fn pending_sources(&self) -> Vec<ReceiptSource> {
        let mut settled = self.extracted_ids();
        settled.extend(self.extraction_failures.iter().map(|f| &f.receipt_id));
        self.receipt_sources
            .iter()
            .filter(|source| !settled.contains(&source.receipt_id()))
            .cloned()
            .collect()
    }

    /// Extracted receipts still waiting for a verdict, in extraction order.
    pub fn pending_validation(&self) -> impl Iterator<Item = &Receipt> + '_ {
        let validated = self.validated_ids();
        self.extracted_receipts
            .iter()
            .filter(move |receipt| !validated.contains(&receipt.receipt_id))
    }

    /// Count of sources that have either been extracted or failed.
    pub fn settled_sources(&self) -> usize {
        self.extracted_receipts.len() + self.extraction_failures.len()
    }

    pub fn extraction_complete(&self) -> bool {
        self.settled_sources() >= self.receipt_sources.len() && self.pending_sources().is_empty()
    }

    pub fn validation_complete(&self) -> bool {
        self.validated_receipts.len() >= self.extracted_receipts.len()
            && self.pending_validation().next().is_none()
    }

    pub fn needs_report(&self, mode: ReportMode) -> bool {
        if self.validated_receipts.is_empty() || !self.validation_complete() {
            return false;
        }
        match mode {
            ReportMode::Barrier => self.report_artifacts.is_empty(),
            ReportMode::Append => {
                self.report_artifacts.is_empty()
                    || self.reported_receipts < self.validated_receipts.len()
            }
        }
    }

    pub fn needs_notification(&self) -> bool {
        !self.report_artifacts.is_empty() && !self.notification_sent
    }

    /// True when any of extraction, validation, or reporting still has work.
    pub fn has_processing_work(&self, mode: ReportMode) -> bool {
        !self.extraction_complete() || !self.validation_complete() || self.needs_report(mode)
    }

    /// Receipts split into (compliant, non-compliant), preserving order.
    pub fn partition(&self) -> (Vec<Receipt>, Vec<Receipt>) {
        self.validated_receipts
            .iter()
            .cloned()
            .partition(Receipt::compliant)
    }

    /// Forget recorded extraction failures so the next advance retries them.
    pub fn retry_failed_extractions(&mut self) -> usize {
        let cleared = self.extraction_failures.len();
        self.extraction_failures.clear();
        cleared
    }

    /// Merge one change into the state. Changes that would break the
    /// run invariants are dropped with a warning.
    pub(crate) fn apply(&mut self, change: &StateChange) {
        match change {
            StateChange::ReceiptExtracted { receipt } => {
                let known_source = self
                    .receipt_sources
                    .iter()
                    .any(|source| source.receipt_id() == receipt.receipt_id);
                if !known_source || self.extracted_ids().contains(&receipt.receipt_id) {
                    warn!(receipt_id = %receipt.receipt_id, "ignoring extraction for unknown or duplicate receipt");
                    return;
                }
                self.extraction_failures
                    .retain(|failure| failure.receipt_id != receipt.receipt_id);
                self.extracted_receipts.push(receipt.clone());
            }
            StateChange::ExtractionFailed { failure } => {
                if self.extracted_ids().contains(&failure.receipt_id)
                    || self
                        .extraction_failures
                        .iter()
                        .any(|existing| existing.receipt_id == failure.receipt_id)
                {
                    return;
                }
                self.extraction_failures.push(failure.clone());
            }
            StateChange::ReceiptValidated { receipt } => {
                if receipt.is_compliant.is_none()
                    || !self.extracted_ids().contains(&receipt.receipt_id)
                    || self.validated_ids().contains(&receipt.receipt_id)
                {
                    warn!(receipt_id = %receipt.receipt_id, "ignoring validation for unextracted or duplicate receipt");
                    return;
                }
                self.validated_receipts.push(receipt.clone());
            }
            StateChange::ReportGenerated {
                artifacts,
                receipts_covered,
            } => {
                self.report_artifacts = artifacts.clone();
                self.reported_receipts = *receipts_covered;
            }
            StateChange::NotificationDispatched { status } => {
                if status.delivered {
                    self.notification_sent = true;
                }
                self.notification_status = Some(status.clone());
                self.control_signal = Some(ControlSignal::Terminate);
            }
            StateChange::Terminated => {
                self.control_signal = Some(ControlSignal::Terminate);
            }
        }
    }
}
