use crate::infra::{build_pipeline, parse_date};
use chrono::NaiveDate;
use clap::Args;
use expense_ai::config::AppConfig;
use expense_ai::error::AppError;
use expense_ai::telemetry;
use expense_ai::workflows::expense::{
    discover_receipts, graph, EvaluatorMode, RuleSet, RunOutcome, SubmissionMetadata,
};
use std::path::PathBuf;
use tracing::info;

#[derive(Args, Debug, Default)]
pub(crate) struct RunArgs {
    /// Directory holding the receipt images (.jpg, .jpeg, .png)
    #[arg(long, default_value = "receipts")]
    pub(crate) receipts: PathBuf,
    /// Rules file (JSON list or CSV with rule_name,value,type). Defaults to the built-in policy.
    #[arg(long)]
    pub(crate) rules: Option<PathBuf>,
    /// Person submitting the report
    #[arg(long, default_value = "")]
    pub(crate) requester: String,
    #[arg(long, default_value = "")]
    pub(crate) requester_department: String,
    /// Person approving the report
    #[arg(long, default_value = "")]
    pub(crate) approver: String,
    #[arg(long, default_value = "")]
    pub(crate) approver_department: String,
    #[arg(long, default_value = "")]
    pub(crate) client: String,
    #[arg(long, default_value = "")]
    pub(crate) project: String,
    /// First travel day (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) travel_start: Option<NaiveDate>,
    /// Last travel day (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) travel_end: Option<NaiveDate>,
    /// Compliance evaluator: `rules` or `llm`. Overrides EXPENSE_EVALUATOR.
    #[arg(long, value_parser = parse_evaluator)]
    pub(crate) evaluator: Option<EvaluatorMode>,
    /// Print the workflow graph as Mermaid and exit
    #[arg(long)]
    pub(crate) graph: bool,
}

impl RunArgs {
    fn metadata(&self) -> SubmissionMetadata {
        SubmissionMetadata {
            requester: self.requester.clone(),
            requester_department: self.requester_department.clone(),
            approver: self.approver.clone(),
            approver_department: self.approver_department.clone(),
            client: self.client.clone(),
            project: self.project.clone(),
            travel_start_date: self.travel_start.map(|date| date.to_string()),
            travel_end_date: self.travel_end.map(|date| date.to_string()),
        }
    }
}

fn parse_evaluator(raw: &str) -> Result<EvaluatorMode, String> {
    EvaluatorMode::parse(raw).ok_or_else(|| format!("unknown evaluator '{raw}' (expected rules or llm)"))
}

pub(crate) async fn run_receipts(args: RunArgs) -> Result<(), AppError> {
    if args.graph {
        println!("{}", graph::mermaid());
        return Ok(());
    }

    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    let sources = discover_receipts(&args.receipts)?;
    let rules = match &args.rules {
        Some(path) => RuleSet::from_path(path)?,
        None => RuleSet::default(),
    };
    info!(
        receipts = sources.len(),
        rules = rules.len(),
        dir = %args.receipts.display(),
        "starting expense run"
    );

    let pipeline = build_pipeline(&config, args.evaluator)?;
    let outcome = pipeline
        .run_streaming(sources, rules, args.metadata(), |update| {
            println!("[{}] {}", update.stage.label(), update.describe());
        })
        .await?;

    render_outcome(&outcome);

    match outcome.error {
        Some(err) => Err(err.into()),
        None => Ok(()),
    }
}

fn render_outcome(outcome: &RunOutcome) {
    let state = &outcome.state;
    let (compliant, non_compliant) = state.partition();

    println!();
    println!("Expense run summary");
    println!("===================");
    println!("Receipts submitted : {}", state.receipt_sources().len());
    println!("Extracted          : {}", state.extracted_receipts().len());
    println!("Extraction failures: {}", state.extraction_failures().len());
    println!("Compliant          : {}", compliant.len());
    println!("Non-compliant      : {}", non_compliant.len());

    for failure in state.extraction_failures() {
        println!("  ! {}: {}", failure.receipt_id, failure.cause);
    }
    for receipt in &non_compliant {
        println!("  x {} ({})", receipt.receipt_id, receipt.merchant);
        for violation in &receipt.violations {
            println!("      - {violation}");
        }
    }

    if !state.report_artifacts().is_empty() {
        println!("Artifacts:");
        for artifact in state.report_artifacts() {
            println!("  {}", artifact.path().display());
        }
    }
    match state.notification_status() {
        Some(status) => println!("Notification       : {}", status.message),
        None => println!("Notification       : not sent"),
    }
    if let Some(err) = &outcome.error {
        println!("Run stopped        : {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn metadata_carries_travel_window() {
        let args = RunArgs {
            requester: "Dana Reyes".to_string(),
            travel_start: NaiveDate::from_ymd_opt(2025, 3, 1),
            ..RunArgs::default()
        };
        let metadata = args.metadata();
        assert_eq!(metadata.requester, "Dana Reyes");
        assert_eq!(metadata.travel_window(), "2025-03-01 to Not Provided");
    }

    #[test]
    fn evaluator_flag_accepts_known_modes() {
        assert_eq!(parse_evaluator("llm"), Ok(EvaluatorMode::Llm));
        assert!(parse_evaluator("oracle").is_err());
    }
}
