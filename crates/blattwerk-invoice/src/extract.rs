// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Invoice field extraction from OCR text. Each field has an ordered list of
// matchers; the first one that matches decides the field.

use std::sync::OnceLock;

use blattwerk_core::types::{InvoiceRecord, LineItem, OcrRecord};
use regex::Regex;
use tracing::debug;

// -- Compiled regex cache -------------------------------------------------------

macro_rules! re {
    ($name:ident, $pat:expr) => {
        fn $name() -> &'static Regex {
            static R: OnceLock<Regex> = OnceLock::new();
            R.get_or_init(|| Regex::new($pat).expect("invalid regex"))
        }
    };
}

re!(re_invoice_number_labeled,
    r"(?i)(?:arve\s*nr|invoice\s*no|arve\s*number)[:.\s]*([A-Z0-9\-/]+)");
re!(re_invoice_number_loose,
    r"(?i)(?:arve|invoice)[:.\s]*([A-Z0-9\-/]+)");

re!(re_date,
    r"\d{1,2}[./\-]\d{1,2}[./\-]\d{2,4}");

re!(re_total_decimal,
    r"(?i)(?:summa|kokku|total)[:.\s]*(\d+[,.]\d{2})");
re!(re_total_integer,
    r"(?i)(?:summa|kokku|total)[:.\s]*(\d+)[€\s]");
re!(re_total_euro,
    r"€\s*(\d+[,.]\d{2})");

re!(re_tax_decimal,
    r"(?i)(?:käibemaks|km|vat)[:.\s]*(\d+[,.]\d{2})");
re!(re_tax_integer,
    r"(?i)(?:käibemaks|km|vat)[:.\s]*(\d+)[€\s]");

re!(re_supplier,
    r"(?i)(?:müüja|supplier|vendor)[:.\s]*([^\n]+)");

re!(re_reg_number,
    r"(?i)(?:reg\.?\s*nr|registration\s*no|reg\s*code)[:.\s]*([A-Z0-9]+)");
re!(re_vat_number,
    r"(?i)(?:kmkr|vat\s*no)[:.\s]*([A-Z0-9]+)");

re!(re_price,
    r"\d+[,.]\d{2}");
re!(re_unit,
    r"(?i)\b(?:tk|pcs|kg|g|m|l)\b");
re!(re_quantity,
    r"(?i)(\d+(?:[,.]\d+)?)\s*(?:tk|pcs|kg|g|m|l)\b");
re!(re_column_gap,
    r"\s{2,}");

// -- Matcher tables ---------------------------------------------------------------

/// A matcher whose first capture group holds the field value.
type Matcher = fn() -> &'static Regex;

const INVOICE_NUMBER: &[Matcher] = &[re_invoice_number_labeled, re_invoice_number_loose];
const TOTAL_AMOUNT: &[Matcher] = &[re_total_decimal, re_total_integer, re_total_euro];
const TAX_AMOUNT: &[Matcher] = &[re_tax_decimal, re_tax_integer];
const SUPPLIER_NAME: &[Matcher] = &[re_supplier];
const SUPPLIER_REG_NUMBER: &[Matcher] = &[re_reg_number, re_vat_number];

/// Capture of the first matcher in `table` that matches `text`, trimmed.
/// A capture that is blank after trimming counts as unknown.
fn first_capture<'t>(table: &[Matcher], text: &'t str) -> Option<&'t str> {
    table
        .iter()
        .find_map(|matcher| matcher().captures(text))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
}

// -- Public extraction API --------------------------------------------------------

/// Turns OCR output into an [`InvoiceRecord`]. Pure and deterministic.
pub struct Extractor;

impl Extractor {
    /// Extract fields from an OCR record. Word boxes are not used yet.
    pub fn extract(record: &OcrRecord) -> InvoiceRecord {
        Self::extract_text(&record.text)
    }

    /// Extract fields from plain text.
    pub fn extract_text(text: &str) -> InvoiceRecord {
        let mut dates = re_date().find_iter(text).map(|m| m.as_str().to_string());
        let invoice_date = dates.next();
        let due_date = dates.next();

        let record = InvoiceRecord {
            invoice_number: first_capture(INVOICE_NUMBER, text).map(str::to_string),
            invoice_date,
            due_date,
            total_amount: first_capture(TOTAL_AMOUNT, text).and_then(parse_amount),
            tax_amount: first_capture(TAX_AMOUNT, text).and_then(parse_amount),
            supplier_name: Self::extract_supplier(text),
            supplier_reg_number: first_capture(SUPPLIER_REG_NUMBER, text).map(str::to_string),
            line_items: text.lines().filter_map(parse_line_item).collect(),
        };

        debug!(
            invoice_number = record.invoice_number.is_some(),
            total = record.total_amount.is_some(),
            line_items = record.line_items.len(),
            "Invoice fields extracted"
        );
        record
    }

    /// Labelled supplier, else the first non-empty line.
    fn extract_supplier(text: &str) -> Option<String> {
        first_capture(SUPPLIER_NAME, text)
            .or_else(|| text.lines().map(str::trim).find(|line| !line.is_empty()))
            .map(str::to_string)
    }
}

// -- Line items ---------------------------------------------------------------------

/// Parse one table row such as `Paber A4  2 tk  5,00  10,00`.
///
/// Rows need a price token, a unit word, and at least three columns separated
/// by runs of two or more spaces. Rows without a quantity or unit price are
/// skipped.
fn parse_line_item(line: &str) -> Option<LineItem> {
    let line = line.trim();
    if !re_price().is_match(line) || !re_unit().is_match(line) {
        return None;
    }

    let columns: Vec<&str> = re_column_gap().split(line).collect();
    if columns.len() < 3 {
        return None;
    }

    let quantity = re_quantity()
        .captures(line)
        .and_then(|caps| caps.get(1))
        .and_then(|m| parse_amount(m.as_str()))?;

    let prices: Vec<f64> = re_price()
        .find_iter(line)
        .filter_map(|m| parse_amount(m.as_str()))
        .collect();
    let unit_price = *prices.first()?;
    let total = match prices.as_slice() {
        [_, .., last] => *last,
        _ => round_cents(quantity * unit_price),
    };

    Some(LineItem {
        description: columns[0].trim().to_string(),
        quantity: Some(quantity),
        unit_price: Some(unit_price),
        total: Some(total),
    })
}

// -- Amount parsing -------------------------------------------------------------------

/// Parse `123,45` or `123.45`.
fn parse_amount(s: &str) -> Option<f64> {
    s.trim().replace(',', ".").parse().ok()
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// -- Tests ------------------------------------------------------------------------------
