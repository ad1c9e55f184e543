//! Receipt-to-report workflow: extraction, compliance validation, report
//! generation and notification, driven from a resumable run state.

pub mod compliance;
pub mod domain;
mod drivers;
pub mod extraction;
pub mod graph;
mod intake;
pub mod llm;
pub mod notify;
mod pipeline;
pub mod report;
pub mod router;
mod ruleset;
mod state;
mod update;

pub use compliance::{
    ComplianceError, ComplianceEvaluator, DelegatedEvaluator, Evaluator, EvaluatorMode,
    RuleBasedEvaluator, Verdict,
};
pub use domain::{
    default_rules, ArtifactLocation, Category, LineItem, Receipt, ReceiptId, ReceiptSource,
    Rule, RuleKind, RuleValue, SubmissionMetadata,
};
pub use drivers::StageError;
pub use extraction::{ExtractionFailed, ExtractionFailure, ExtractionGateway, VisionExtractionGateway};
pub use graph::Node;
pub use intake::{discover_receipts, IntakeError, ReceiptRoot};
pub use llm::{LlmClient, LlmError, LlmSettings};
pub use notify::{
    LogNotifier, Mailer, NotificationError, NotificationStatus, Notifier, SendGridNotifier,
    SendGridSettings,
};
pub use pipeline::{
    Advance, Deadlines, ExpensePipeline, PipelineOptions, RunOutcome, DEFAULT_MAX_CONCURRENCY,
};
pub use report::{FileReportBuilder, ReportArtifacts, ReportBuilder, ReportError, ReportSummary};
pub use router::{expense_router, ExpenseApi, RunRequest, RunResponse};
pub use ruleset::{RuleSet, RuleSetError};
pub use state::{ControlSignal, ReportMode, RunState};
pub use update::{PartialUpdate, Progress, RunField, StageTag, StateChange};
