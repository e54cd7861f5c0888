// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Core domain types for Blattwerk.

use serde::{Deserialize, Serialize};

/// Hint about what kind of paper document a photo shows.
///
/// Only selects an enhancement variant; detection never looks at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DocumentHint {
    /// Narrow/tall or very bright documents such as till receipts.
    pub receipt_like: bool,
}

impl DocumentHint {
    pub fn receipt() -> Self {
        Self { receipt_like: true }
    }

    pub fn generic() -> Self {
        Self { receipt_like: false }
    }
}

/// Axis-aligned bounding box of a recognised word, in image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

/// A single word reported by the OCR engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrWord {
    pub text: String,
    pub bbox: BoundingBox,
    /// Recognition confidence (0.0–1.0), when the engine reports one.
    pub confidence: Option<f32>,
}

/// Output of an OCR engine: plain text plus word-level layout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrRecord {
    pub text: String,
    pub words: Vec<OcrWord>,
}

impl OcrRecord {
    /// Record with text only and no word layout.
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            words: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// One row of an invoice's item table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub description: String,
    pub quantity: Option<f64>,
    pub unit_price: Option<f64>,
    pub total: Option<f64>,
}

/// Invoice fields extracted from OCR text.
///
/// Every scalar is optional: `None` means the field was not found or could
/// not be parsed. Field names are the JSON export keys.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub invoice_number: Option<String>,
    pub invoice_date: Option<String>,
    pub due_date: Option<String>,
    pub total_amount: Option<f64>,
    pub tax_amount: Option<f64>,
    pub supplier_name: Option<String>,
    pub supplier_reg_number: Option<String>,
    pub line_items: Vec<LineItem>,
}

impl InvoiceRecord {
    /// True when no scalar field is known and there are no line items.
    pub fn is_empty(&self) -> bool {
        self.invoice_number.is_none()
            && self.invoice_date.is_none()
            && self.due_date.is_none()
            && self.total_amount.is_none()
            && self.tax_amount.is_none()
            && self.supplier_name.is_none()
            && self.supplier_reg_number.is_none()
            && self.line_items.is_empty()
    }

    /// Fold a later page of the same document into this record.
    ///
    /// Known fields are kept; unknown ones are filled from `page`. Line items
    /// are appended in page order.
    pub fn merge_page(&mut self, page: InvoiceRecord) {
        fill(&mut self.invoice_number, page.invoice_number);
        fill(&mut self.invoice_date, page.invoice_date);
        fill(&mut self.due_date, page.due_date);
        fill(&mut self.total_amount, page.total_amount);
        fill(&mut self.tax_amount, page.tax_amount);
        fill(&mut self.supplier_name, page.supplier_name);
        fill(&mut self.supplier_reg_number, page.supplier_reg_number);
        self.line_items.extend(page.line_items);
    }
}

fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
    if slot.is_none() {
        *slot = value;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(description: &str) -> LineItem {
        LineItem {
            description: description.into(),
            quantity: Some(1.0),
            unit_price: Some(2.5),
            total: Some(2.5),
        }
    }

    #[test]
    fn default_record_is_empty() {
        assert!(InvoiceRecord::default().is_empty());
    }

    #[test]
    fn merge_fills_only_missing_fields() {
        let mut first = InvoiceRecord {
            invoice_number: Some("A-1".into()),
            line_items: vec![item("first")],
            ..Default::default()
        };
        let second = InvoiceRecord {
            invoice_number: Some("B-2".into()),
            total_amount: Some(99.5),
            line_items: vec![item("second")],
            ..Default::default()
        };

        first.merge_page(second);

        assert_eq!(first.invoice_number.as_deref(), Some("A-1"));
        assert_eq!(first.total_amount, Some(99.5));
        let names: Vec<_> = first.line_items.iter().map(|i| i.description.as_str()).collect();
        assert_eq!(names, ["first", "second"]);
    }

    #[test]
    fn json_uses_record_field_names() {
        let record = InvoiceRecord {
            supplier_reg_number: Some("EE100".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["supplier_reg_number"], "EE100");
        assert!(json["invoice_number"].is_null());
        assert!(json["line_items"].as_array().unwrap().is_empty());
    }

    #[test]
    fn whitespace_ocr_record_is_empty() {
        assert!(OcrRecord::from_text(" \n\t").is_empty());
        assert!(!OcrRecord::from_text("x").is_empty());
    }
}
