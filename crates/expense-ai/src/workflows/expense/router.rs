use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use super::compliance::ComplianceEvaluator;
use super::domain::{Rule, SubmissionMetadata};
use super::extraction::ExtractionGateway;
use super::intake::ReceiptRoot;
use super::notify::Notifier;
use super::pipeline::ExpensePipeline;
use super::report::ReportBuilder;
use super::ruleset::RuleSet;
use super::state::RunState;

#[derive(Debug, Deserialize)]
pub struct RunRequest {
    pub receipt_paths: Vec<String>,
    #[serde(default)]
    pub rules: Option<Vec<Rule>>,
    #[serde(default)]
    pub metadata: SubmissionMetadata,
}

#[derive(Debug, Serialize)]
pub struct RunResponse {
    pub state: RunState,
    pub updates: BTreeMap<&'static str, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Shared handler state: the pipeline plus the directory receipts are read from.
pub struct ExpenseApi<E, C, R, N> {
    pipeline: Arc<ExpensePipeline<E, C, R, N>>,
    receipts: Arc<ReceiptRoot>,
}

impl<E, C, R, N> Clone for ExpenseApi<E, C, R, N> {
    fn clone(&self) -> Self {
        Self {
            pipeline: Arc::clone(&self.pipeline),
            receipts: Arc::clone(&self.receipts),
        }
    }
}

/// Router exposing pipeline runs over HTTP. Receipt paths in requests are
/// resolved inside `receipts`.
pub fn expense_router<E, C, R, N>(
    pipeline: Arc<ExpensePipeline<E, C, R, N>>,
    receipts: ReceiptRoot,
) -> Router
where
    E: ExtractionGateway + 'static,
    C: ComplianceEvaluator + 'static,
    R: ReportBuilder + 'static,
    N: Notifier + 'static,
{
    Router::new()
        .route("/api/v1/expenses/runs", post(run_handler::<E, C, R, N>))
        .with_state(ExpenseApi {
            pipeline,
            receipts: Arc::new(receipts),
        })
}

pub(crate) async fn run_handler<E, C, R, N>(
    State(api): State<ExpenseApi<E, C, R, N>>,
    Json(request): Json<RunRequest>,
) -> Response
where
    E: ExtractionGateway + 'static,
    C: ComplianceEvaluator + 'static,
    R: ReportBuilder + 'static,
    N: Notifier + 'static,
{
    let RunRequest {
        receipt_paths,
        rules,
        metadata,
    } = request;

    let rules = match rules {
        Some(rules) => match RuleSet::new(rules) {
            Ok(rules) => rules,
            Err(err) => return bad_request(err.to_string()),
        },
        None => RuleSet::default(),
    };
    let sources = match api.receipts.resolve_all(&receipt_paths) {
        Ok(sources) => sources,
        Err(err) => {
            warn!(error = %err, "rejected receipt path");
            return bad_request(err.to_string());
        }
    };

    let mut updates: BTreeMap<&'static str, usize> = BTreeMap::new();
    let outcome = api
        .pipeline
        .run_streaming(sources, rules, metadata, |update| {
            *updates.entry(update.stage.label()).or_default() += 1;
        })
        .await;

    match outcome {
        Ok(outcome) => {
            let status = if outcome.error.is_some() {
                StatusCode::BAD_GATEWAY
            } else {
                StatusCode::OK
            };
            if let Some(err) = &outcome.error {
                warn!(error = %err, "pipeline run ended with a stage failure");
            }
            let body = RunResponse {
                state: outcome.state,
                updates,
                error: outcome.error.map(|err| err.to_string()),
            };
            (status, Json(body)).into_response()
        }
        Err(err) => bad_request(err.to_string()),
    }
}

fn bad_request(message: String) -> Response {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": message }))).into_response()
}
