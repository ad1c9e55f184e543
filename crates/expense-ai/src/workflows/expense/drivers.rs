//! Thin adapters between the orchestrator and the four collaborators.
//!
//! Each driver takes only the slice of run state it needs and hands back a
//! value for the orchestrator to merge. None of them sees `RunState`.

use super::compliance::{ComplianceError, ComplianceEvaluator};
use super::domain::{ArtifactLocation, Receipt, ReceiptSource, SubmissionMetadata};
use super::extraction::{ExtractionFailed, ExtractionFailure, ExtractionGateway};
use super::notify::{NotificationStatus, Notifier};
use super::report::ReportBuilder;
use super::ruleset::RuleSet;
use super::update::StageTag;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Run-level failure of a barrier stage. Ends the update sequence early.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    #[error("report generation failed: {0}")]
    ReportGenerationFailed(String),
    #[error("{} stage exceeded its deadline of {deadline:?}", stage.label())]
    DeadlineExceeded { stage: StageTag, deadline: Duration },
}

impl StageError {
    pub fn stage(&self) -> StageTag {
        match self {
            StageError::ReportGenerationFailed(_) => StageTag::Report,
            StageError::DeadlineExceeded { stage, .. } => *stage,
        }
    }
}

async fn within<F: Future>(deadline: Option<Duration>, call: F) -> Result<F::Output, Duration> {
    match deadline {
        Some(limit) => tokio::time::timeout(limit, call).await.map_err(|_| limit),
        None => Ok(call.await),
    }
}

/// Extract one source. The receipt id always comes from the source and the
/// compliance fields are cleared whatever the gateway returned.
pub(crate) async fn extract<E: ExtractionGateway>(
    gateway: &E,
    source: &ReceiptSource,
    deadline: Option<Duration>,
) -> Result<Receipt, ExtractionFailed> {
    let outcome = match within(deadline, gateway.extract(source)).await {
        Ok(result) => result,
        Err(limit) => Err(ExtractionFailure::DeadlineExceeded(limit)),
    };

    match outcome {
        Ok(mut receipt) => {
            receipt.receipt_id = source.receipt_id();
            receipt.is_compliant = None;
            receipt.violations.clear();
            Ok(receipt)
        }
        Err(err) => {
            warn!(source = %source, error = %err, "receipt extraction failed");
            Err(ExtractionFailed::new(source, &err))
        }
    }
}

/// Annotate one receipt. Evaluator errors flag the receipt instead of dropping it.
pub(crate) async fn validate<C: ComplianceEvaluator>(
    evaluator: &C,
    receipt: Receipt,
    rules: &RuleSet,
    deadline: Option<Duration>,
) -> Receipt {
    let outcome = match within(deadline, evaluator.evaluate(&receipt, rules)).await {
        Ok(result) => result,
        Err(limit) => Err(ComplianceError::DeadlineExceeded(limit)),
    };

    match outcome {
        Ok(verdict) => {
            let compliant = verdict.is_compliant && verdict.violations.is_empty();
            receipt.annotate(compliant, verdict.violations)
        }
        Err(err) => {
            warn!(receipt_id = %receipt.receipt_id, error = %err, "compliance check degraded");
            let violation = format!("Compliance check failed: {err}");
            receipt.annotate(false, vec![violation])
        }
    }
}

pub(crate) async fn report<R: ReportBuilder>(
    builder: &R,
    compliant: &[Receipt],
    non_compliant: &[Receipt],
    metadata: &SubmissionMetadata,
    deadline: Option<Duration>,
) -> Result<Vec<ArtifactLocation>, StageError> {
    match within(deadline, builder.build(compliant, non_compliant, metadata)).await {
        Ok(Ok(artifacts)) => Ok(artifacts.into_vec()),
        Ok(Err(err)) => Err(StageError::ReportGenerationFailed(err.to_string())),
        Err(limit) => Err(StageError::DeadlineExceeded {
            stage: StageTag::Report,
            deadline: limit,
        }),
    }
}

pub(crate) async fn notify<N: Notifier>(
    notifier: &N,
    artifacts: &[ArtifactLocation],
    deadline: Option<Duration>,
) -> Result<NotificationStatus, StageError> {
    within(deadline, notifier.notify(artifacts))
        .await
        .map_err(|limit| StageError::DeadlineExceeded {
            stage: StageTag::Notification,
            deadline: limit,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::expense::compliance::Verdict;
    use crate::workflows::expense::domain::{Category, ReceiptId};

    fn receipt(id: &str) -> Receipt {
        Receipt {
            receipt_id: ReceiptId(id.to_string()),
            merchant: "Cafe".to_string(),
            date: "2025-08-01".to_string(),
            category: Category::Meals,
            items: Vec::new(),
            total: 9.0,
            alcohol_total: None,
            tip_amount: None,
            is_compliant: Some(true),
            violations: vec!["stale".to_string()],
        }
    }

    struct MislabelingGateway;

    impl ExtractionGateway for MislabelingGateway {
        async fn extract(&self, _source: &ReceiptSource) -> Result<Receipt, ExtractionFailure> {
            Ok(receipt("made-up-id"))
        }
    }

    struct SlowGateway;

    impl ExtractionGateway for SlowGateway {
        async fn extract(&self, _source: &ReceiptSource) -> Result<Receipt, ExtractionFailure> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(receipt("late"))
        }
    }

    struct FailingEvaluator;

    impl ComplianceEvaluator for FailingEvaluator {
        async fn evaluate(&self, _receipt: &Receipt, _rules: &RuleSet) -> Result<Verdict, ComplianceError> {
            Err(ComplianceError::Verdict("garbled".to_string()))
        }
    }

    struct ContradictoryEvaluator;

    impl ComplianceEvaluator for ContradictoryEvaluator {
        async fn evaluate(&self, _receipt: &Receipt, _rules: &RuleSet) -> Result<Verdict, ComplianceError> {
            Ok(Verdict {
                is_compliant: true,
                violations: vec!["Tip exceeds 20% of receipt total.".to_string()],
            })
        }
    }

    #[tokio::test]
    async fn extraction_keeps_source_identity() {
        let source = ReceiptSource::new("scans/lunch.jpg");
        let extracted = extract(&MislabelingGateway, &source, None)
            .await
            .expect("extraction succeeds");
        assert_eq!(extracted.receipt_id, ReceiptId("lunch.jpg".to_string()));
        assert!(extracted.is_compliant.is_none());
        assert!(extracted.violations.is_empty());
    }

    #[tokio::test]
    async fn extraction_deadline_is_an_item_failure() {
        let source = ReceiptSource::new("slow.png");
        let failure = extract(&SlowGateway, &source, Some(Duration::from_millis(50)))
            .await
            .expect_err("deadline fires");
        assert_eq!(failure.receipt_id, ReceiptId("slow.png".to_string()));
        assert!(failure.cause.contains("deadline"));
    }

    #[tokio::test]
    async fn evaluator_errors_degrade_to_non_compliant() {
        let annotated = validate(&FailingEvaluator, receipt("a.jpg"), &RuleSet::default(), None).await;
        assert_eq!(annotated.is_compliant, Some(false));
        assert_eq!(annotated.violations.len(), 1);
        assert!(annotated.violations[0].starts_with("Compliance check failed:"));
    }

    #[tokio::test]
    async fn listed_violations_override_compliant_flag() {
        let annotated =
            validate(&ContradictoryEvaluator, receipt("a.jpg"), &RuleSet::default(), None).await;
        assert_eq!(annotated.is_compliant, Some(false));
    }
}
