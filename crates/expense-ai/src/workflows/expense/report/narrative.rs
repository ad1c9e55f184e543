use super::summary::ReportSummary;
use super::tabular::money;
use super::ReportError;
use crate::workflows::expense::domain::Receipt;
use printpdf::{
    BuiltinFont, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference, PdfLayerReference,
};
use std::io::BufWriter;

const PAGE_WIDTH: Mm = Mm(210.0);
const PAGE_HEIGHT: Mm = Mm(297.0);
const TOP: Mm = Mm(280.0);
const BOTTOM: Mm = Mm(20.0);
const WRAP_AT: usize = 90;

/// One laid-out line of the narrative document.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Line {
    Title(String),
    Heading(String),
    Text(String),
    Detail(String),
    Gap,
}

impl Line {
    fn advance(&self) -> Mm {
        match self {
            Line::Title(_) => Mm(10.0),
            Line::Heading(_) => Mm(7.0),
            Line::Text(_) | Line::Detail(_) => Mm(5.0),
            Line::Gap => Mm(4.0),
        }
    }
}

pub(crate) fn layout(
    summary: &ReportSummary,
    compliant: &[Receipt],
    non_compliant: &[Receipt],
) -> Vec<Line> {
    let mut lines = vec![Line::Title("Expense Report".to_string())];

    lines.push(Line::Heading("Report Details".to_string()));
    let metadata = &summary.metadata;
    for (label, value) in [
        ("Submission Date", summary.submitted_on.as_str()),
        ("Travel Dates", summary.travel_dates.as_str()),
        ("Requester", metadata.requester.as_str()),
        ("Department", metadata.requester_department.as_str()),
        ("Approver", metadata.approver.as_str()),
        ("Approver Department", metadata.approver_department.as_str()),
        ("Client", metadata.client.as_str()),
        ("Project", metadata.project.as_str()),
    ] {
        lines.push(Line::Text(format!("{label}: {value}")));
    }
    lines.push(Line::Gap);

    lines.push(Line::Heading("Summary".to_string()));
    push_wrapped(
        &mut lines,
        &format!(
            "{} receipts totalling {}: {} compliant ({}) and {} non-compliant ({}).",
            summary.total_receipts,
            money(summary.total_amount),
            summary.compliant_receipts,
            money(summary.compliant_amount),
            summary.non_compliant_receipts,
            money(summary.non_compliant_amount),
        ),
        Line::Text,
    );
    for category in &summary.categories {
        lines.push(Line::Detail(format!(
            "{}: {} receipt(s), {}",
            category.category_label,
            category.receipts,
            money(category.amount)
        )));
    }
    lines.push(Line::Gap);

    if !summary.top_violations.is_empty() {
        lines.push(Line::Heading("Top Violations".to_string()));
        for (rank, entry) in summary.top_violations.iter().enumerate() {
            push_wrapped(
                &mut lines,
                &format!("{}. {} ({})", rank + 1, entry.violation, entry.occurrences),
                Line::Detail,
            );
        }
        lines.push(Line::Gap);
    }

    push_section(&mut lines, "Compliant Receipts", compliant);
    push_section(&mut lines, "Non-Compliant Receipts", non_compliant);
    lines
}

fn push_section(lines: &mut Vec<Line>, title: &str, receipts: &[Receipt]) {
    lines.push(Line::Heading(title.to_string()));
    if receipts.is_empty() {
        lines.push(Line::Text("None.".to_string()));
        lines.push(Line::Gap);
        return;
    }

    for receipt in receipts {
        lines.push(Line::Text(format!(
            "{} ({}, {}, {})",
            receipt.merchant,
            receipt.date,
            receipt.category.label(),
            money(receipt.total)
        )));
        for violation in &receipt.violations {
            push_wrapped(lines, &format!("- {violation}"), Line::Detail);
        }
        for item in &receipt.items {
            let alcohol = if item.is_alcohol.unwrap_or(false) { " [alcohol]" } else { "" };
            push_wrapped(
                lines,
                &format!("{}  {}{alcohol}", item.name, money(item.price)),
                Line::Detail,
            );
        }
        lines.push(Line::Gap);
    }
}

fn push_wrapped(lines: &mut Vec<Line>, text: &str, kind: fn(String) -> Line) {
    lines.extend(wrap(text, WRAP_AT).into_iter().map(kind));
}

fn wrap(text: &str, width: usize) -> Vec<String> {
    let mut wrapped = Vec::new();
    let mut current = String::new();
    for word in text.split_whitespace() {
        if !current.is_empty() && current.len() + 1 + word.len() > width {
            wrapped.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || wrapped.is_empty() {
        wrapped.push(current);
    }
    wrapped
}

struct Fonts {
    regular: IndirectFontRef,
    bold: IndirectFontRef,
}

/// Paints `lines` onto A4 pages, starting a new page when one fills up.
pub(crate) fn render_pdf(lines: &[Line]) -> Result<Vec<u8>, ReportError> {
    let (doc, page, layer) = PdfDocument::new("Expense Report", PAGE_WIDTH, PAGE_HEIGHT, "Layer 1");
    let fonts = Fonts {
        regular: builtin(&doc, BuiltinFont::Helvetica)?,
        bold: builtin(&doc, BuiltinFont::HelveticaBold)?,
    };

    let mut layer: PdfLayerReference = doc.get_page(page).get_layer(layer);
    let mut y = TOP;
    let mut pages = 1;
    for line in lines {
        if y - line.advance() < BOTTOM {
            pages += 1;
            let (page, next) = doc.add_page(PAGE_WIDTH, PAGE_HEIGHT, format!("Layer {pages}"));
            layer = doc.get_page(page).get_layer(next);
            y = TOP;
        }
        match line {
            Line::Title(text) => layer.use_text(text.as_str(), 16.0, Mm(20.0), y, &fonts.bold),
            Line::Heading(text) => layer.use_text(text.as_str(), 12.0, Mm(20.0), y, &fonts.bold),
            Line::Text(text) => layer.use_text(text.as_str(), 10.0, Mm(20.0), y, &fonts.regular),
            Line::Detail(text) => layer.use_text(text.as_str(), 9.0, Mm(26.0), y, &fonts.regular),
            Line::Gap => {}
        }
        y -= line.advance();
    }

    let mut buffer = BufWriter::new(Vec::new());
    doc.save(&mut buffer)
        .map_err(|err| ReportError::Render(format!("unable to save pdf: {err}")))?;
    buffer
        .into_inner()
        .map_err(|err| ReportError::Render(format!("unable to flush pdf: {err}")))
}

fn builtin(doc: &PdfDocumentReference, font: BuiltinFont) -> Result<IndirectFontRef, ReportError> {
    doc.add_builtin_font(font)
        .map_err(|err| ReportError::Render(format!("pdf font error: {err}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::expense::domain::{Category, LineItem, ReceiptId, SubmissionMetadata};

    fn flagged() -> Vec<Receipt> {
        vec![Receipt {
            receipt_id: ReceiptId("steak.jpg".to_string()),
            merchant: "Smith & Wollensky".to_string(),
            date: "2025-06-03".to_string(),
            category: Category::Meals,
            items: vec![LineItem {
                name: "Cabernet".to_string(),
                price: 64.0,
                is_alcohol: Some(true),
            }],
            total: 231.0,
            alcohol_total: None,
            tip_amount: None,
            is_compliant: Some(false),
            violations: vec!["Meal above $200.00 requires approval, total was $231.00.".to_string()],
        }]
    }

    #[test]
    fn layout_lists_violations_and_empty_sections() {
        let flagged = flagged();
        let summary = ReportSummary::build(&[], &flagged, &SubmissionMetadata::default(), "2025-06-04");

        let lines = layout(&summary, &[], &flagged);
        assert_eq!(lines[0], Line::Title("Expense Report".to_string()));
        assert!(lines.contains(&Line::Heading("Top Violations".to_string())));
        assert!(lines.contains(&Line::Text("Smith & Wollensky (2025-06-03, Meals, $231.00)".to_string())));
        assert!(lines.contains(&Line::Detail("Cabernet  $64.00 [alcohol]".to_string())));

        let compliant_at = lines
            .iter()
            .position(|line| *line == Line::Heading("Compliant Receipts".to_string()))
            .expect("compliant section");
        assert_eq!(lines[compliant_at + 1], Line::Text("None.".to_string()));
    }

    #[test]
    fn long_text_wraps_on_word_boundaries() {
        let wrapped = wrap("alpha beta gamma delta", 11);
        assert_eq!(wrapped, vec!["alpha beta", "gamma delta"]);
        assert_eq!(wrap("", 10), vec![String::new()]);
    }

    #[test]
    fn renders_a_multi_page_pdf() {
        let mut lines = vec![Line::Title("Expense Report".to_string())];
        lines.extend((0..120).map(|n| Line::Text(format!("Receipt line {n}"))));

        let bytes = render_pdf(&lines).expect("pdf renders");
        assert!(bytes.starts_with(b"%PDF-"));
    }
}
