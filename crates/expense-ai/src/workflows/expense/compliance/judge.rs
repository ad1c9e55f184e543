use super::{ComplianceError, ComplianceEvaluator, Verdict};
use crate::workflows::expense::domain::Receipt;
use crate::workflows::expense::llm::{LlmClient, StructuredRequest};
use crate::workflows::expense::ruleset::RuleSet;
use serde::Deserialize;
use serde_json::{json, Value};

const SYSTEM_PROMPT: &str = "You are an expense auditor. Judge the receipt against every \
    rule provided and list each rule it breaks as a short sentence.";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct VerdictPayload {
    is_compliant: bool,
    violations: Vec<String>,
}

/// Evaluator that hands the judgement to an external reasoning model.
#[derive(Debug, Clone)]
pub struct DelegatedEvaluator {
    client: LlmClient,
    model: String,
}

impl DelegatedEvaluator {
    pub fn new(client: LlmClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }

    fn prompt(receipt: &Receipt, rules: &RuleSet) -> Result<String, ComplianceError> {
        let body = json!({
            "receipt": {
                "merchant": receipt.merchant,
                "date": receipt.date,
                "category": receipt.category,
                "items": receipt.items,
                "total": receipt.total,
                "alcohol_total": receipt.alcohol_total,
                "tip_amount": receipt.tip_amount,
            },
            "rules": rules,
        });
        serde_json::to_string_pretty(&body).map_err(|err| ComplianceError::Verdict(err.to_string()))
    }
}

pub(crate) fn verdict_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "is_compliant": { "type": "boolean" },
            "violations": { "type": "array", "items": { "type": "string" } }
        },
        "required": ["is_compliant", "violations"],
        "additionalProperties": false
    })
}

pub(crate) fn parse_verdict(raw: &str) -> Result<Verdict, ComplianceError> {
    let payload: VerdictPayload =
        serde_json::from_str(raw).map_err(|err| ComplianceError::Verdict(err.to_string()))?;
    let violations: Vec<String> = payload
        .violations
        .into_iter()
        .map(|violation| violation.trim().to_string())
        .filter(|violation| !violation.is_empty())
        .collect();
    Ok(Verdict {
        // A verdict listing violations is never compliant, whatever the flag says.
        is_compliant: payload.is_compliant && violations.is_empty(),
        violations,
    })
}

impl ComplianceEvaluator for DelegatedEvaluator {
    async fn evaluate(&self, receipt: &Receipt, rules: &RuleSet) -> Result<Verdict, ComplianceError> {
        if !self.client.is_configured() {
            return Err(ComplianceError::Unconfigured(
                "OPENAI_API_KEY is not set".to_string(),
            ));
        }

        let prompt = Self::prompt(receipt, rules)?;
        let raw = self
            .client
            .complete_structured(StructuredRequest {
                model: &self.model,
                system: SYSTEM_PROMPT,
                user_content: Value::String(prompt),
                schema_name: "compliance_verdict",
                schema: verdict_schema(),
                max_tokens: 500,
                temperature: 0.0,
            })
            .await?;

        parse_verdict(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::expense::llm::LlmSettings;
    use crate::workflows::expense::domain::{Category, ReceiptId};
    use std::time::Duration;

    fn receipt() -> Receipt {
        Receipt {
            receipt_id: ReceiptId("dinner.jpg".to_string()),
            merchant: "Harbor Grill".to_string(),
            date: "2025-04-02".to_string(),
            category: Category::Meals,
            items: Vec::new(),
            total: 84.1,
            alcohol_total: None,
            tip_amount: None,
            is_compliant: None,
            violations: Vec::new(),
        }
    }

    #[test]
    fn verdict_with_violations_is_not_compliant() {
        let verdict = parse_verdict(r#"{"is_compliant": true, "violations": ["Over budget"]}"#)
            .expect("verdict parses");
        assert!(!verdict.is_compliant);
        assert_eq!(verdict.violations, vec!["Over budget".to_string()]);
    }

    #[test]
    fn blank_violations_are_dropped() {
        let verdict = parse_verdict(r#"{"is_compliant": true, "violations": ["  "]}"#)
            .expect("verdict parses");
        assert!(verdict.is_compliant);
        assert!(verdict.violations.is_empty());
    }

    #[test]
    fn malformed_verdict_is_an_error() {
        assert!(matches!(
            parse_verdict(r#"{"compliant": "yes"}"#),
            Err(ComplianceError::Verdict(_))
        ));
    }

    #[test]
    fn prompt_carries_receipt_and_rules() {
        let prompt = DelegatedEvaluator::prompt(&receipt(), &RuleSet::default())
            .expect("prompt renders");
        assert!(prompt.contains("Harbor Grill"));
        assert!(prompt.contains("Max Daily Meal Budget"));
    }

    #[tokio::test]
    async fn missing_api_key_is_reported() {
        let client = LlmClient::new(LlmSettings {
            base_url: "http://127.0.0.1:9".to_string(),
            api_key: None,
            timeout: Duration::from_secs(1),
        })
        .expect("client builds");
        let evaluator = DelegatedEvaluator::new(client, "judge");
        let result = evaluator.evaluate(&receipt(), &RuleSet::default()).await;
        assert!(matches!(result, Err(ComplianceError::Unconfigured(_))));
    }
}
