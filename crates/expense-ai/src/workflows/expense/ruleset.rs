use super::domain::{default_rules, Rule, RuleKind, RuleValue};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

/// Errors raised while loading a rule set from a file or request body.
#[derive(Debug, thiserror::Error)]
pub enum RuleSetError {
    #[error("failed to read rules: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid rules JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid rules CSV: {0}")]
    Csv(#[from] csv::Error),
    #[error("rule '{name}' has unknown type '{raw}'")]
    UnknownKind { name: String, raw: String },
    #[error("rule '{name}' value '{raw}' does not match type {kind:?}")]
    ValueMismatch {
        name: String,
        raw: String,
        kind: RuleKind,
    },
    #[error("duplicate rule '{0}'")]
    Duplicate(String),
    #[error("unsupported rules file extension: {0}")]
    UnsupportedFormat(String),
}

/// Validated, read-only rule collection handed to the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Result<Self, RuleSetError> {
        let mut seen = HashSet::new();
        for rule in &rules {
            if !seen.insert(rule.name.to_ascii_lowercase()) {
                return Err(RuleSetError::Duplicate(rule.name.clone()));
            }
            let matches = matches!(
                (rule.kind, rule.value),
                (RuleKind::Boolean, RuleValue::Flag(_))
                    | (RuleKind::Amount, RuleValue::Number(_))
                    | (RuleKind::Percentage, RuleValue::Number(_))
            );
            if !matches {
                return Err(RuleSetError::ValueMismatch {
                    name: rule.name.clone(),
                    raw: rule.value.to_string(),
                    kind: rule.kind,
                });
            }
        }
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, RuleSetError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();
        let file = std::fs::File::open(path)?;
        match extension.as_str() {
            "json" => Self::from_json_reader(file),
            "csv" => Self::from_csv_reader(file),
            other => Err(RuleSetError::UnsupportedFormat(other.to_string())),
        }
    }

    pub fn from_json_reader<R: Read>(reader: R) -> Result<Self, RuleSetError> {
        let rows: Vec<RuleRow> = serde_json::from_reader(reader)?;
        Self::from_rows(rows)
    }

    pub fn from_csv_reader<R: Read>(reader: R) -> Result<Self, RuleSetError> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(reader);
        let mut rows = Vec::new();
        for record in csv_reader.deserialize::<CsvRuleRow>() {
            let row = record?;
            rows.push(RuleRow {
                rule_name: row.rule_name,
                value: serde_json::Value::String(row.value),
                kind: row.kind,
            });
        }
        Self::from_rows(rows)
    }

    fn from_rows(rows: Vec<RuleRow>) -> Result<Self, RuleSetError> {
        let rules = rows
            .into_iter()
            .map(RuleRow::into_rule)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(rules)
    }
}

#[derive(Debug, Deserialize)]
struct RuleRow {
    rule_name: String,
    value: serde_json::Value,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct CsvRuleRow {
    rule_name: String,
    value: String,
    #[serde(rename = "type")]
    kind: String,
}

impl RuleRow {
    fn into_rule(self) -> Result<Rule, RuleSetError> {
        let kind = RuleKind::parse(&self.kind).ok_or_else(|| RuleSetError::UnknownKind {
            name: self.rule_name.clone(),
            raw: self.kind.clone(),
        })?;

        let value = parse_value(&self.value, kind).ok_or_else(|| RuleSetError::ValueMismatch {
            name: self.rule_name.clone(),
            raw: self.value.to_string(),
            kind,
        })?;

        Ok(Rule {
            name: self.rule_name,
            value,
            kind,
        })
    }
}

fn parse_value(raw: &serde_json::Value, kind: RuleKind) -> Option<RuleValue> {
    match (kind, raw) {
        (RuleKind::Boolean, serde_json::Value::Bool(flag)) => Some(RuleValue::Flag(*flag)),
        (RuleKind::Boolean, serde_json::Value::String(text)) => {
            match text.trim().to_ascii_lowercase().as_str() {
                "true" | "yes" | "1" => Some(RuleValue::Flag(true)),
                "false" | "no" | "0" => Some(RuleValue::Flag(false)),
                _ => None,
            }
        }
        (_, serde_json::Value::Number(number)) if kind != RuleKind::Boolean => {
            number.as_f64().map(RuleValue::Number)
        }
        (_, serde_json::Value::String(text)) => text
            .trim()
            .trim_start_matches('$')
            .trim_end_matches('%')
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(RuleValue::Number),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn default_rule_set_matches_stock_policy() {
        let rules = RuleSet::default();
        assert_eq!(rules.len(), 7);
        assert_eq!(rules.rules()[0].name, "Max Daily Meal Budget");
    }

    #[test]
    fn loads_json_rules_with_display_type_labels() {
        let json = r#"[
            {"rule_name": "Max Daily Meal Budget", "value": 70, "type": "Amount ($)"},
            {"rule_name": "Tip Limit Per Receipt", "value": 20, "type": "Percentage (%)"},
            {"rule_name": "Rental Cars - No Luxury Vehicles Allowed", "value": true, "type": "Boolean"}
        ]"#;
        let rules = RuleSet::from_json_reader(Cursor::new(json)).expect("rules load");
        assert_eq!(rules.len(), 3);
        assert_eq!(rules.rules()[1].kind, RuleKind::Percentage);
        assert_eq!(rules.rules()[2].value, RuleValue::Flag(true));
    }

    #[test]
    fn loads_csv_rules() {
        let csv = "rule_name,value,type\nMax Lodging Cost Per Night,$250,Amount\nNo Luxury,yes,Boolean\n";
        let rules = RuleSet::from_csv_reader(Cursor::new(csv)).expect("rules load");
        assert_eq!(rules.rules()[0].value, RuleValue::Number(250.0));
        assert_eq!(rules.rules()[1].value, RuleValue::Flag(true));
    }

    #[test]
    fn rejects_unknown_rule_types() {
        let json = r#"[{"rule_name": "Mileage", "value": 0.67, "type": "Other"}]"#;
        match RuleSet::from_json_reader(Cursor::new(json)) {
            Err(RuleSetError::UnknownKind { name, .. }) => assert_eq!(name, "Mileage"),
            other => panic!("expected unknown kind, got {other:?}"),
        }
    }

    #[test]
    fn rejects_values_that_do_not_match_kind() {
        let json = r#"[{"rule_name": "Lodging", "value": true, "type": "Amount"}]"#;
        assert!(matches!(
            RuleSet::from_json_reader(Cursor::new(json)),
            Err(RuleSetError::ValueMismatch { .. })
        ));
    }

    #[test]
    fn rejects_duplicate_rule_names() {
        let rules = vec![
            Rule::amount("Max Daily Meal Budget", 70.0),
            Rule::amount("max daily meal budget", 80.0),
        ];
        assert!(matches!(
            RuleSet::new(rules),
            Err(RuleSetError::Duplicate(_))
        ));
    }
}
