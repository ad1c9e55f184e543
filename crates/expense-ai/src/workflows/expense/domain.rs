use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// Expense categories recognised by the policy. Anything else lands in `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Meals,
    Lodging,
    Airfare,
    RentalCar,
    Transportation,
    Other,
}

impl Category {
    pub const fn ordered() -> [Self; 6] {
        [
            Self::Meals,
            Self::Lodging,
            Self::Airfare,
            Self::RentalCar,
            Self::Transportation,
            Self::Other,
        ]
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Meals => "Meals",
            Self::Lodging => "Lodging",
            Self::Airfare => "Airfare",
            Self::RentalCar => "Rental Car",
            Self::Transportation => "Transportation",
            Self::Other => "Other",
        }
    }

    /// Coerce a free-form category string into the fixed enum.
    pub fn normalize(raw: &str) -> Self {
        let key = fold(raw);
        Self::ordered()
            .into_iter()
            .find(|category| fold(category.label()) == key)
            .unwrap_or(Self::Other)
    }
}

fn fold(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::normalize(&raw))
    }
}

/// Stable identifier derived from the receipt's source, never regenerated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptId(pub String);

impl fmt::Display for ReceiptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Input handle for one receipt image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReceiptSource {
    path: PathBuf,
}

impl ReceiptSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn receipt_id(&self) -> ReceiptId {
        let name = self
            .path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.path.to_string_lossy().into_owned());
        ReceiptId(name)
    }
}

impl fmt::Display for ReceiptSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path.display())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub name: String,
    pub price: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_alcohol: Option<bool>,
}

/// One extracted receipt. The compliance fields stay `None`/empty until the
/// receipt has been through the evaluator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Receipt {
    pub receipt_id: ReceiptId,
    pub merchant: String,
    pub date: String,
    pub category: Category,
    pub items: Vec<LineItem>,
    pub total: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alcohol_total: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tip_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_compliant: Option<bool>,
    #[serde(default)]
    pub violations: Vec<String>,
}

impl Receipt {
    pub fn items_total(&self) -> f64 {
        self.items.iter().map(|item| item.price).sum()
    }

    pub fn compliant(&self) -> bool {
        self.is_compliant.unwrap_or(false)
    }

    pub fn compliance_label(&self) -> &'static str {
        match self.is_compliant {
            Some(true) => "Compliant",
            Some(false) => "Non-Compliant",
            None => "Pending",
        }
    }

    /// Attach a verdict, consuming the unvalidated receipt.
    pub fn annotate(mut self, is_compliant: bool, violations: Vec<String>) -> Self {
        self.is_compliant = Some(is_compliant);
        self.violations = violations;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleKind {
    Amount,
    Percentage,
    Boolean,
}

impl RuleKind {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Amount => "Amount ($)",
            Self::Percentage => "Percentage (%)",
            Self::Boolean => "Boolean",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let key = fold(raw);
        match key.as_str() {
            "amount" | "amount($)" => Some(Self::Amount),
            "percentage" | "percentage(%)" | "percent" => Some(Self::Percentage),
            "boolean" | "bool" => Some(Self::Boolean),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleValue {
    Flag(bool),
    Number(f64),
}

impl RuleValue {
    pub fn as_number(self) -> Option<f64> {
        match self {
            Self::Number(value) => Some(value),
            Self::Flag(_) => None,
        }
    }

    pub fn as_flag(self) -> Option<bool> {
        match self {
            Self::Flag(value) => Some(value),
            Self::Number(_) => None,
        }
    }
}

impl fmt::Display for RuleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Flag(value) => write!(f, "{value}"),
            Self::Number(value) => write!(f, "{value}"),
        }
    }
}

/// One compliance constraint, fixed for the run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    #[serde(rename = "rule_name")]
    pub name: String,
    pub value: RuleValue,
    #[serde(rename = "type")]
    pub kind: RuleKind,
}

impl Rule {
    pub fn amount(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value: RuleValue::Number(value),
            kind: RuleKind::Amount,
        }
    }

    pub fn percentage(name: &str, value: f64) -> Self {
        Self {
            name: name.to_string(),
            value: RuleValue::Number(value),
            kind: RuleKind::Percentage,
        }
    }

    pub fn boolean(name: &str, value: bool) -> Self {
        Self {
            name: name.to_string(),
            value: RuleValue::Flag(value),
            kind: RuleKind::Boolean,
        }
    }
}

/// Stock travel policy used when the caller does not supply rules.
pub fn default_rules() -> Vec<Rule> {
    vec![
        Rule::amount("Max Daily Meal Budget", 70.0),
        Rule::amount("Individual Meals Receipt Approval Required Above", 200.0),
        Rule::percentage("Alcohol Limit Per Receipt", 20.0),
        Rule::percentage("Tip Limit Per Receipt", 20.0),
        Rule::amount("Max Lodging Cost Per Night", 250.0),
        Rule::boolean("Airfare - Economy Required for Flights < 6 hrs", true),
        Rule::boolean("Rental Cars - No Luxury Vehicles Allowed", true),
    ]
}

/// Submission context printed on the report. Immutable for the run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmissionMetadata {
    #[serde(default)]
    pub requester: String,
    #[serde(default)]
    pub requester_department: String,
    #[serde(default)]
    pub approver: String,
    #[serde(default)]
    pub approver_department: String,
    #[serde(default)]
    pub client: String,
    #[serde(default)]
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travel_start_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub travel_end_date: Option<String>,
}

impl SubmissionMetadata {
    pub fn travel_window(&self) -> String {
        format!(
            "{} to {}",
            self.travel_start_date.as_deref().unwrap_or("Not Provided"),
            self.travel_end_date.as_deref().unwrap_or("Not Provided")
        )
    }

    /// Flat view used by renderers and log lines.
    pub fn as_map(&self) -> BTreeMap<&'static str, String> {
        let mut map = BTreeMap::new();
        map.insert("requester", self.requester.clone());
        map.insert("requester_department", self.requester_department.clone());
        map.insert("approver", self.approver.clone());
        map.insert("approver_department", self.approver_department.clone());
        map.insert("client", self.client.clone());
        map.insert("project", self.project.clone());
        map.insert("travel_dates", self.travel_window());
        map
    }
}

/// Location of a generated report artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ArtifactLocation(pub PathBuf);

impl ArtifactLocation {
    pub fn path(&self) -> &Path {
        &self.0
    }

    pub fn file_name(&self) -> String {
        self.0
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.0.to_string_lossy().into_owned())
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_normalization_is_case_insensitive() {
        for raw in ["Meals", "meals", "MEALS", " meals "] {
            assert_eq!(Category::normalize(raw), Category::Meals);
        }
    }

    #[test]
    fn unknown_categories_become_other() {
        assert_eq!(Category::normalize("Snacks"), Category::Other);
        assert_eq!(Category::normalize(""), Category::Other);
    }

    #[test]
    fn rental_car_accepts_spacing_variants() {
        for raw in ["Rental Car", "rental_car", "RentalCar", "rental-car"] {
            assert_eq!(Category::normalize(raw), Category::RentalCar);
        }
    }

    #[test]
    fn category_deserializes_leniently() {
        let parsed: Category = serde_json::from_str("\"LODGING\"").expect("category parses");
        assert_eq!(parsed, Category::Lodging);
        let json = serde_json::to_string(&Category::RentalCar).expect("serializes");
        assert_eq!(json, "\"Rental Car\"");
    }

    #[test]
    fn receipt_id_comes_from_file_name() {
        let source = ReceiptSource::new("uploads/batch-7/dinner.jpg");
        assert_eq!(source.receipt_id(), ReceiptId("dinner.jpg".to_string()));
    }

    #[test]
    fn rules_use_wire_field_names() {
        let rule: Rule = serde_json::from_str(
            r#"{"rule_name": "Tip Limit Per Receipt", "value": 18, "type": "Percentage"}"#,
        )
        .expect("rule parses");
        assert_eq!(rule.kind, RuleKind::Percentage);
        assert_eq!(rule.value.as_number(), Some(18.0));

        let flag: Rule = serde_json::from_str(
            r#"{"rule_name": "No Luxury", "value": true, "type": "Boolean"}"#,
        )
        .expect("boolean rule parses");
        assert_eq!(flag.value.as_flag(), Some(true));
    }

    #[test]
    fn rule_kind_accepts_display_labels() {
        assert_eq!(RuleKind::parse("Amount ($)"), Some(RuleKind::Amount));
        assert_eq!(RuleKind::parse("Percentage (%)"), Some(RuleKind::Percentage));
        assert_eq!(RuleKind::parse("boolean"), Some(RuleKind::Boolean));
        assert_eq!(RuleKind::parse("Other"), None);
    }

    #[test]
    fn travel_window_defaults_when_missing() {
        let metadata = SubmissionMetadata::default();
        assert_eq!(metadata.travel_window(), "Not Provided to Not Provided");
    }
}
