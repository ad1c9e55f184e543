use crate::workflows::expense::domain::{Category, Receipt, SubmissionMetadata};
use serde::Serialize;
use std::collections::HashMap;

const TOP_VIOLATIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryTotal {
    pub category: Category,
    pub category_label: &'static str,
    pub receipts: usize,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViolationCount {
    pub violation: String,
    pub occurrences: usize,
}

/// Aggregate figures shared by the tabular and narrative artifacts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportSummary {
    pub submitted_on: String,
    pub travel_dates: String,
    pub metadata: SubmissionMetadata,
    pub total_receipts: usize,
    pub compliant_receipts: usize,
    pub non_compliant_receipts: usize,
    pub total_amount: f64,
    pub compliant_amount: f64,
    pub non_compliant_amount: f64,
    pub categories: Vec<CategoryTotal>,
    pub top_violations: Vec<ViolationCount>,
}

impl ReportSummary {
    pub fn build(
        compliant: &[Receipt],
        non_compliant: &[Receipt],
        metadata: &SubmissionMetadata,
        submitted_on: impl Into<String>,
    ) -> Self {
        let compliant_amount: f64 = compliant.iter().map(|receipt| receipt.total).sum();
        let non_compliant_amount: f64 = non_compliant.iter().map(|receipt| receipt.total).sum();

        let mut by_category: HashMap<Category, (usize, f64)> = HashMap::new();
        for receipt in compliant.iter().chain(non_compliant) {
            let entry = by_category.entry(receipt.category).or_default();
            entry.0 += 1;
            entry.1 += receipt.total;
        }
        let categories = Category::ordered()
            .into_iter()
            .filter_map(|category| {
                by_category
                    .get(&category)
                    .map(|(receipts, amount)| CategoryTotal {
                        category,
                        category_label: category.label(),
                        receipts: *receipts,
                        amount: *amount,
                    })
            })
            .collect();

        Self {
            submitted_on: submitted_on.into(),
            travel_dates: metadata.travel_window(),
            metadata: metadata.clone(),
            total_receipts: compliant.len() + non_compliant.len(),
            compliant_receipts: compliant.len(),
            non_compliant_receipts: non_compliant.len(),
            total_amount: compliant_amount + non_compliant_amount,
            compliant_amount,
            non_compliant_amount,
            categories,
            top_violations: top_violations(non_compliant),
        }
    }
}

/// Most frequent violations, ties broken by first appearance.
fn top_violations(receipts: &[Receipt]) -> Vec<ViolationCount> {
    let mut counts: Vec<ViolationCount> = Vec::new();
    for violation in receipts.iter().flat_map(|receipt| &receipt.violations) {
        match counts.iter_mut().find(|entry| &entry.violation == violation) {
            Some(entry) => entry.occurrences += 1,
            None => counts.push(ViolationCount {
                violation: violation.clone(),
                occurrences: 1,
            }),
        }
    }
    // stable sort keeps first-seen order among equal counts
    counts.sort_by(|a, b| b.occurrences.cmp(&a.occurrences));
    counts.truncate(TOP_VIOLATIONS);
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::expense::domain::ReceiptId;

    fn receipt(id: &str, category: Category, total: f64, violations: &[&str]) -> Receipt {
        Receipt {
            receipt_id: ReceiptId(id.to_string()),
            merchant: "Vendor".to_string(),
            date: "2025-05-01".to_string(),
            category,
            items: Vec::new(),
            total,
            alcohol_total: None,
            tip_amount: None,
            is_compliant: Some(violations.is_empty()),
            violations: violations.iter().map(|v| v.to_string()).collect(),
        }
    }

    #[test]
    fn totals_are_split_by_partition() {
        let compliant = vec![receipt("a", Category::Meals, 20.0, &[])];
        let flagged = vec![
            receipt("b", Category::Lodging, 300.0, &["Too pricey"]),
            receipt("c", Category::Meals, 90.0, &["Over budget"]),
        ];
        let summary =
            ReportSummary::build(&compliant, &flagged, &SubmissionMetadata::default(), "2025-05-02");

        assert_eq!(summary.total_receipts, 3);
        assert_eq!(summary.non_compliant_receipts, 2);
        assert!((summary.total_amount - 410.0).abs() < f64::EPSILON);
        assert_eq!(summary.categories[0].category, Category::Meals);
        assert_eq!(summary.categories[0].receipts, 2);
        assert_eq!(summary.travel_dates, "Not Provided to Not Provided");
    }

    #[test]
    fn top_violations_are_ranked_and_capped() {
        let flagged: Vec<Receipt> = (0..7)
            .map(|n| {
                let violations = if n < 3 {
                    vec!["Over budget".to_string()]
                } else {
                    vec![format!("Rule {n}")]
                };
                let mut r = receipt(&format!("r{n}"), Category::Meals, 10.0, &[]);
                r.is_compliant = Some(false);
                r.violations = violations;
                r
            })
            .collect();

        let ranked = top_violations(&flagged);
        assert_eq!(ranked.len(), 5);
        assert_eq!(ranked[0].violation, "Over budget");
        assert_eq!(ranked[0].occurrences, 3);
        assert_eq!(ranked[1].violation, "Rule 3");
    }
}
