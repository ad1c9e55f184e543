//! Strict structured-output contract for the document-understanding service.

use super::ExtractionFailure;
use crate::workflows::expense::domain::{Category, LineItem, Receipt, ReceiptId};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ReceiptPayload {
    merchant: String,
    date: String,
    category: String,
    items: Vec<ItemPayload>,
    total: f64,
    #[serde(default)]
    alcohol_total: Option<f64>,
    #[serde(default)]
    tip_amount: Option<f64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ItemPayload {
    name: String,
    price: f64,
    #[serde(default)]
    is_alcohol: Option<bool>,
}

/// Validate a raw JSON document against the extraction contract and build
/// an unvalidated [`Receipt`] carrying the given id.
pub fn parse_receipt(raw: &str, receipt_id: ReceiptId) -> Result<Receipt, ExtractionFailure> {
    let payload: ReceiptPayload =
        serde_json::from_str(raw).map_err(|err| ExtractionFailure::Schema(err.to_string()))?;

    if payload.merchant.trim().is_empty() {
        return Err(ExtractionFailure::Schema("merchant is empty".to_string()));
    }
    check_amount("total", payload.total)?;
    for (field, value) in [
        ("alcohol_total", payload.alcohol_total),
        ("tip_amount", payload.tip_amount),
    ] {
        if let Some(value) = value {
            check_amount(field, value)?;
        }
    }

    let items = payload
        .items
        .into_iter()
        .map(|item| {
            check_amount("items.price", item.price)?;
            Ok(LineItem {
                name: item.name.trim().to_string(),
                price: item.price,
                is_alcohol: item.is_alcohol,
            })
        })
        .collect::<Result<Vec<_>, ExtractionFailure>>()?;

    Ok(Receipt {
        receipt_id,
        merchant: payload.merchant.trim().to_string(),
        date: payload.date.trim().to_string(),
        category: Category::normalize(&payload.category),
        items,
        total: payload.total,
        alcohol_total: payload.alcohol_total,
        tip_amount: payload.tip_amount,
        is_compliant: None,
        violations: Vec::new(),
    })
}

fn check_amount(field: &str, value: f64) -> Result<(), ExtractionFailure> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ExtractionFailure::Schema(format!(
            "{field} must be a non-negative number, got {value}"
        )))
    }
}

/// JSON schema sent with the extraction request.
pub fn json_schema() -> Value {
    let categories: Vec<&str> = Category::ordered()
        .into_iter()
        .map(Category::label)
        .collect();

    json!({
        "type": "object",
        "properties": {
            "merchant": { "type": "string" },
            "date": { "type": "string" },
            "category": { "type": "string", "enum": categories },
            "items": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "price": { "type": "number" },
                        "is_alcohol": { "type": "boolean" }
                    },
                    "required": ["name", "price", "is_alcohol"],
                    "additionalProperties": false
                }
            },
            "total": { "type": "number" },
            "alcohol_total": { "type": "number" },
            "tip_amount": { "type": "number" }
        },
        "required": [
            "merchant", "date", "category", "items", "total", "alcohol_total", "tip_amount"
        ],
        "additionalProperties": false
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id() -> ReceiptId {
        ReceiptId("lunch.jpg".to_string())
    }

    #[test]
    fn parses_full_payload() {
        let raw = r#"{
            "merchant": " Blue Door Bistro ",
            "date": "2025-02-11",
            "category": "meals",
            "items": [
                {"name": "Burger", "price": 18.5, "is_alcohol": false},
                {"name": "IPA", "price": 7.0, "is_alcohol": true}
            ],
            "total": 30.5,
            "alcohol_total": 7.0,
            "tip_amount": 5.0
        }"#;

        let receipt = parse_receipt(raw, id()).expect("payload parses");
        assert_eq!(receipt.merchant, "Blue Door Bistro");
        assert_eq!(receipt.category, Category::Meals);
        assert_eq!(receipt.items.len(), 2);
        assert_eq!(receipt.items[1].is_alcohol, Some(true));
        assert_eq!(receipt.receipt_id, id());
        assert!(receipt.is_compliant.is_none());
    }

    #[test]
    fn unknown_category_is_coerced() {
        let raw = r#"{"merchant": "Kiosk", "date": "2025-02-11", "category": "Snacks",
            "items": [], "total": 4.0}"#;
        let receipt = parse_receipt(raw, id()).expect("payload parses");
        assert_eq!(receipt.category, Category::Other);
    }

    #[test]
    fn unexpected_fields_fail_extraction() {
        let raw = r#"{"merchant": "Kiosk", "date": "2025-02-11", "category": "Other",
            "items": [], "total": 4.0, "currency": "USD"}"#;
        assert!(matches!(
            parse_receipt(raw, id()),
            Err(ExtractionFailure::Schema(_))
        ));
    }

    #[test]
    fn missing_required_fields_fail_extraction() {
        let raw = r#"{"merchant": "Kiosk", "category": "Other", "items": [], "total": 4.0}"#;
        assert!(matches!(
            parse_receipt(raw, id()),
            Err(ExtractionFailure::Schema(_))
        ));
    }

    #[test]
    fn negative_totals_are_rejected() {
        let raw = r#"{"merchant": "Kiosk", "date": "2025-02-11", "category": "Other",
            "items": [], "total": -4.0}"#;
        assert!(parse_receipt(raw, id()).is_err());
    }

    #[test]
    fn schema_lists_every_category_label() {
        let schema = json_schema();
        let labels = schema["properties"]["category"]["enum"]
            .as_array()
            .expect("enum array");
        assert_eq!(labels.len(), 6);
        assert!(labels.contains(&Value::String("Rental Car".to_string())));
    }
}
