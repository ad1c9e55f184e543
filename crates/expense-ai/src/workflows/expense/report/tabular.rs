use super::summary::ReportSummary;
use super::ReportError;
use crate::workflows::expense::domain::Receipt;

const RECEIPT_HEADER: [&str; 6] = ["Receipt", "Merchant", "Date", "Category", "Total", "Status"];

/// Render the spreadsheet artifact: Summary, Compliant, Non-Compliant and
/// Items sections separated by blank rows.
pub(crate) fn render_csv(
    summary: &ReportSummary,
    compliant: &[Receipt],
    non_compliant: &[Receipt],
) -> Result<Vec<u8>, ReportError> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_writer(Vec::new());

    writer.write_record(["Summary"])?;
    let metadata = &summary.metadata;
    for (label, value) in [
        ("Submission Date", summary.submitted_on.clone()),
        ("Travel Dates", summary.travel_dates.clone()),
        ("Requester", metadata.requester.clone()),
        ("Requester Department", metadata.requester_department.clone()),
        ("Approver", metadata.approver.clone()),
        ("Approver Department", metadata.approver_department.clone()),
        ("Client", metadata.client.clone()),
        ("Project", metadata.project.clone()),
        ("Total Receipts", summary.total_receipts.to_string()),
        ("Compliant Receipts", summary.compliant_receipts.to_string()),
        ("Non-Compliant Receipts", summary.non_compliant_receipts.to_string()),
        ("Total Amount", money(summary.total_amount)),
        ("Compliant Amount", money(summary.compliant_amount)),
        ("Non-Compliant Amount", money(summary.non_compliant_amount)),
    ] {
        writer.write_record([label, value.as_str()])?;
    }

    writer.write_record([""])?;
    writer.write_record(["Compliant"])?;
    writer.write_record(RECEIPT_HEADER)?;
    for receipt in compliant {
        writer.write_record(receipt_row(receipt))?;
    }

    writer.write_record([""])?;
    writer.write_record(["Non-Compliant"])?;
    let mut header = RECEIPT_HEADER.to_vec();
    header.push("Violations");
    writer.write_record(&header)?;
    for receipt in non_compliant {
        let mut row = receipt_row(receipt).to_vec();
        row.push(receipt.violations.join("; "));
        writer.write_record(&row)?;
    }

    writer.write_record([""])?;
    writer.write_record(["Items"])?;
    writer.write_record(["Receipt", "Merchant", "Item", "Price", "Alcohol"])?;
    for receipt in compliant.iter().chain(non_compliant) {
        for item in &receipt.items {
            writer.write_record([
                receipt.receipt_id.0.as_str(),
                receipt.merchant.as_str(),
                item.name.as_str(),
                money(item.price).as_str(),
                if item.is_alcohol.unwrap_or(false) { "Yes" } else { "No" },
            ])?;
        }
    }

    writer
        .into_inner()
        .map_err(|err| ReportError::Render(err.to_string()))
}

fn receipt_row(receipt: &Receipt) -> [String; 6] {
    [
        receipt.receipt_id.to_string(),
        receipt.merchant.clone(),
        receipt.date.clone(),
        receipt.category.label().to_string(),
        money(receipt.total),
        receipt.compliance_label().to_string(),
    ]
}

pub(crate) fn money(amount: f64) -> String {
    format!("${amount:.2}")
}
