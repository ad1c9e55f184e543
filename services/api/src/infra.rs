use chrono::NaiveDate;
use expense_ai::config::{AppConfig, VisionConfig};
use expense_ai::error::AppError;
use expense_ai::workflows::expense::notify::DEFAULT_SENDGRID_URL;
use expense_ai::workflows::expense::{
    DelegatedEvaluator, Evaluator, EvaluatorMode, ExpensePipeline, FileReportBuilder, LlmClient,
    LlmSettings, LogNotifier, Mailer, RuleBasedEvaluator, SendGridNotifier, SendGridSettings,
    VisionExtractionGateway,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub(crate) type ServicePipeline =
    ExpensePipeline<VisionExtractionGateway, Evaluator, FileReportBuilder, Mailer>;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Wire the production collaborators from configuration.
pub(crate) fn build_pipeline(
    config: &AppConfig,
    evaluator: Option<EvaluatorMode>,
) -> Result<ServicePipeline, AppError> {
    let client = LlmClient::new(llm_settings(&config.vision, config.pipeline.extraction_timeout))?;
    let gateway = VisionExtractionGateway::new(client, config.vision.vision_model.clone());

    let evaluator = match evaluator.unwrap_or(config.pipeline.evaluator) {
        EvaluatorMode::Rules => Evaluator::Rules(RuleBasedEvaluator::new()),
        EvaluatorMode::Llm => {
            let judge =
                LlmClient::new(llm_settings(&config.vision, config.pipeline.compliance_timeout))?;
            Evaluator::Delegated(DelegatedEvaluator::new(judge, config.vision.judge_model.clone()))
        }
    };
    let reporter = FileReportBuilder::new(config.pipeline.output_dir.clone());
    let mailer = build_mailer(config)?;

    Ok(ExpensePipeline::new(gateway, evaluator, reporter, mailer)
        .with_options(config.pipeline.options()))
}

/// Each stage gets its own client so the HTTP timeout matches that stage's deadline.
fn llm_settings(vision: &VisionConfig, timeout: Duration) -> LlmSettings {
    LlmSettings {
        base_url: vision.base_url.clone(),
        api_key: vision.api_key.clone(),
        timeout,
    }
}

fn build_mailer(config: &AppConfig) -> Result<Mailer, AppError> {
    let mail = &config.mail;
    match (&mail.api_key, &mail.sender, &mail.recipient) {
        (Some(api_key), Some(sender), Some(recipient)) => {
            let notifier = SendGridNotifier::new(SendGridSettings {
                api_key: api_key.clone(),
                sender: sender.clone(),
                recipient: recipient.clone(),
                base_url: DEFAULT_SENDGRID_URL.to_string(),
                timeout: config.pipeline.notify_timeout,
            })?;
            Ok(Mailer::SendGrid(notifier))
        }
        _ => {
            info!("SendGrid settings incomplete; notifications will be logged only");
            Ok(Mailer::Log(LogNotifier))
        }
    }
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
