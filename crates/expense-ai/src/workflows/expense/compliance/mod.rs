mod judge;
mod rules;

pub use judge::DelegatedEvaluator;
pub use rules::RuleBasedEvaluator;

use super::domain::Receipt;
use super::llm::LlmError;
use super::ruleset::RuleSet;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Outcome of checking one receipt against the rule set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Verdict {
    pub is_compliant: bool,
    pub violations: Vec<String>,
}

impl Verdict {
    pub fn from_violations(violations: Vec<String>) -> Self {
        Self {
            is_compliant: violations.is_empty(),
            violations,
        }
    }
}

/// Produces a compliance verdict for a receipt. Same contract for the
/// deterministic and delegated implementations.
pub trait ComplianceEvaluator: Send + Sync {
    fn evaluate(
        &self,
        receipt: &Receipt,
        rules: &RuleSet,
    ) -> impl Future<Output = Result<Verdict, ComplianceError>> + Send;
}

#[derive(Debug, thiserror::Error)]
pub enum ComplianceError {
    #[error("reasoning service error: {0}")]
    Service(#[from] LlmError),
    #[error("verdict did not match the expected shape: {0}")]
    Verdict(String),
    #[error("reasoning service is not configured: {0}")]
    Unconfigured(String),
    #[error("compliance deadline of {0:?} exceeded")]
    DeadlineExceeded(std::time::Duration),
}

/// Which evaluator implementation a deployment uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvaluatorMode {
    #[default]
    Rules,
    Llm,
}

impl EvaluatorMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rules" | "rule" | "deterministic" => Some(Self::Rules),
            "llm" | "delegated" | "ai" => Some(Self::Llm),
            _ => None,
        }
    }
}

/// Configuration-selected evaluator.
#[derive(Debug, Clone)]
pub enum Evaluator {
    Rules(RuleBasedEvaluator),
    Delegated(DelegatedEvaluator),
}

impl ComplianceEvaluator for Evaluator {
    async fn evaluate(&self, receipt: &Receipt, rules: &RuleSet) -> Result<Verdict, ComplianceError> {
        match self {
            Evaluator::Rules(evaluator) => evaluator.evaluate(receipt, rules).await,
            Evaluator::Delegated(evaluator) => evaluator.evaluate(receipt, rules).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluator_mode_parses_aliases() {
        assert_eq!(EvaluatorMode::parse("Rules"), Some(EvaluatorMode::Rules));
        assert_eq!(EvaluatorMode::parse(" llm "), Some(EvaluatorMode::Llm));
        assert_eq!(EvaluatorMode::parse("oracle"), None);
    }

    #[test]
    fn verdict_from_violations_sets_flag() {
        assert!(Verdict::from_violations(Vec::new()).is_compliant);
        assert!(!Verdict::from_violations(vec!["x".to_string()]).is_compliant);
    }
}
