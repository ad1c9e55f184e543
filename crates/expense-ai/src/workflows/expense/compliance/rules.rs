use super::{ComplianceError, ComplianceEvaluator, Verdict};
use crate::workflows::expense::domain::{Category, Receipt, Rule, RuleKind, RuleValue};
use crate::workflows::expense::ruleset::RuleSet;
use tracing::debug;

const ALCOHOL_KEYWORDS: [&str; 5] = ["beer", "wine", "alcohol", "cocktail", "liquor"];

/// Policy check a rule name maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Check {
    MealBudget,
    MealApproval,
    AlcoholShare,
    TipShare,
    LodgingCap,
    EconomyAirfare,
    NoLuxuryRental,
}

fn classify(rule: &Rule) -> Option<Check> {
    let lowered = rule.name.to_ascii_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();
    let has = |candidates: &[&str]| words.iter().any(|word| candidates.contains(word));

    let check = if has(&["alcohol"]) {
        Check::AlcoholShare
    } else if has(&["tip", "tips", "gratuity"]) {
        Check::TipShare
    } else if has(&["lodging", "hotel"]) {
        Check::LodgingCap
    } else if has(&["airfare", "economy", "flight", "flights"]) {
        Check::EconomyAirfare
    } else if has(&["luxury"]) {
        Check::NoLuxuryRental
    } else if has(&["meal", "meals"]) && has(&["approval"]) {
        Check::MealApproval
    } else if has(&["meal", "meals"]) {
        Check::MealBudget
    } else {
        return None;
    };

    let compatible = match check {
        Check::MealBudget | Check::MealApproval | Check::LodgingCap => {
            rule.kind == RuleKind::Amount
        }
        Check::AlcoholShare | Check::TipShare => rule.kind == RuleKind::Percentage,
        Check::EconomyAirfare | Check::NoLuxuryRental => rule.kind == RuleKind::Boolean,
    };
    compatible.then_some(check)
}

/// Deterministic evaluator mapping rule names onto fixed policy checks.
#[derive(Debug, Clone, Default)]
pub struct RuleBasedEvaluator;

impl RuleBasedEvaluator {
    pub fn new() -> Self {
        Self
    }

    pub fn violations(&self, receipt: &Receipt, rules: &RuleSet) -> Vec<String> {
        let mut violations = Vec::new();
        for rule in rules.rules() {
            let Some(check) = classify(rule) else {
                debug!(rule = %rule.name, "no deterministic check for rule");
                continue;
            };
            if let Some(violation) = apply_check(check, rule.value, receipt) {
                violations.push(violation);
            }
        }
        violations
    }
}

impl ComplianceEvaluator for RuleBasedEvaluator {
    async fn evaluate(&self, receipt: &Receipt, rules: &RuleSet) -> Result<Verdict, ComplianceError> {
        Ok(Verdict::from_violations(self.violations(receipt, rules)))
    }
}

fn apply_check(check: Check, value: RuleValue, receipt: &Receipt) -> Option<String> {
    let total = receipt.total;
    match check {
        Check::MealBudget => {
            let limit = value.as_number()?;
            (receipt.category == Category::Meals && total > limit).then(|| {
                format!("Meal exceeds daily budget (${limit:.2}), total was ${total:.2}.")
            })
        }
        Check::MealApproval => {
            let limit = value.as_number()?;
            (receipt.category == Category::Meals && total > limit).then(|| {
                format!("Meal above ${limit:.2} requires approval, total was ${total:.2}.")
            })
        }
        Check::AlcoholShare => {
            let percent = value.as_number()?;
            let alcohol = alcohol_amount(receipt);
            (total > 0.0 && alcohol > total * percent / 100.0).then(|| {
                format!(
                    "Alcohol exceeds {}% of receipt total.",
                    format_percent(percent)
                )
            })
        }
        Check::TipShare => {
            let percent = value.as_number()?;
            let tip = tip_amount(receipt);
            (total > 0.0 && tip > total * percent / 100.0).then(|| {
                format!("Tip exceeds {}% of receipt total.", format_percent(percent))
            })
        }
        Check::LodgingCap => {
            let limit = value.as_number()?;
            (receipt.category == Category::Lodging && total > limit)
                .then(|| format!("Lodging cost exceeds ${limit:.2} and requires approval."))
        }
        Check::EconomyAirfare => {
            let enforced = value.as_flag()?;
            (enforced
                && receipt.category == Category::Airfare
                && mentions_any(receipt, &["first class", "business class"]))
            .then(|| "Premium-cabin airfare is not reimbursable.".to_string())
        }
        Check::NoLuxuryRental => {
            let enforced = value.as_flag()?;
            (enforced && receipt.category == Category::RentalCar && mentions_any(receipt, &["luxury"]))
                .then(|| "Luxury car rentals are not reimbursable.".to_string())
        }
    }
}

fn alcohol_amount(receipt: &Receipt) -> f64 {
    if let Some(explicit) = receipt.alcohol_total {
        return explicit;
    }
    if receipt.items.iter().any(|item| item.is_alcohol.is_some()) {
        return receipt
            .items
            .iter()
            .filter(|item| item.is_alcohol == Some(true))
            .map(|item| item.price)
            .sum();
    }
    receipt
        .items
        .iter()
        .filter(|item| {
            let name = item.name.to_ascii_lowercase();
            ALCOHOL_KEYWORDS.iter().any(|keyword| name.contains(keyword))
        })
        .map(|item| item.price)
        .sum()
}

fn tip_amount(receipt: &Receipt) -> f64 {
    match receipt.tip_amount {
        Some(tip) => tip,
        // Without an explicit tip only restaurant receipts leave a gap worth reading as one.
        None if receipt.category == Category::Meals => {
            (receipt.total - receipt.items_total()).max(0.0)
        }
        None => 0.0,
    }
}

fn mentions_any(receipt: &Receipt, needles: &[&str]) -> bool {
    receipt.items.iter().any(|item| {
        let name = item.name.to_ascii_lowercase();
        needles.iter().any(|needle| name.contains(needle))
    })
}

fn format_percent(value: f64) -> String {
    if value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        format!("{value}")
    }
}
