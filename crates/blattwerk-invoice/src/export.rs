// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Accounting export of invoice records: semicolon-separated CSV tables and
// pretty-printed JSON.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use blattwerk_core::error::{BlattwerkError, Result};
use blattwerk_core::types::{InvoiceRecord, LineItem};
use tracing::{debug, info};

/// Header row of the invoice table.
pub const INVOICE_HEADER: [&str; 7] = [
    "invoice_ref",
    "invoice_date",
    "due_date",
    "total_ttc",
    "total_vat",
    "supplier_name",
    "supplier_vat",
];

/// Header row of the line-item table.
pub const ITEM_HEADER: [&str; 4] = ["description", "quantity", "unit_price", "total"];

const DELIMITER: u8 = b';';

fn text(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn number(value: Option<f64>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn csv_writer<W: Write>(writer: W) -> csv::Writer<W> {
    csv::WriterBuilder::new().delimiter(DELIMITER).from_writer(writer)
}

/// I/O failures stay `Io` so file exports can attach their path.
fn csv_error(err: csv::Error) -> BlattwerkError {
    match err.into_kind() {
        csv::ErrorKind::Io(io) => BlattwerkError::Io(io),
        other => BlattwerkError::Export(format!("{other:?}")),
    }
}

fn write_failed(path: &Path, reason: impl std::fmt::Display) -> BlattwerkError {
    BlattwerkError::OutputWrite {
        path: path.display().to_string(),
        reason: reason.to_string(),
    }
}

/// Report I/O failures while writing `path` as `OutputWrite`.
fn at_path(path: &Path) -> impl Fn(BlattwerkError) -> BlattwerkError + '_ {
    move |err| match err {
        BlattwerkError::Io(io) => write_failed(path, io),
        other => other,
    }
}

fn create(path: &Path) -> Result<File> {
    File::create(path).map_err(|err| write_failed(path, err))
}

/// Write the header and the single invoice row.
pub fn write_invoice_csv<W: Write>(record: &InvoiceRecord, writer: W) -> Result<()> {
    let mut wtr = csv_writer(writer);
    wtr.write_record(INVOICE_HEADER).map_err(csv_error)?;
    wtr.write_record([
        text(&record.invoice_number),
        text(&record.invoice_date),
        text(&record.due_date),
        &number(record.total_amount),
        &number(record.tax_amount),
        text(&record.supplier_name),
        text(&record.supplier_reg_number),
    ])
    .map_err(csv_error)?;
    wtr.flush()?;
    Ok(())
}

/// Write the header and one row per line item.
pub fn write_items_csv<W: Write>(items: &[LineItem], writer: W) -> Result<()> {
    let mut wtr = csv_writer(writer);
    wtr.write_record(ITEM_HEADER).map_err(csv_error)?;
    for item in items {
        wtr.write_record([
            item.description.as_str(),
            &number(item.quantity),
            &number(item.unit_price),
            &number(item.total),
        ])
        .map_err(csv_error)?;
    }
    wtr.flush()?;
    Ok(())
}

/// `invoice.csv` → `invoice_items.csv`, in the same directory.
pub fn items_path(path: &Path) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{stem}_items.csv"))
}

/// Export `record` to `path`, plus the item table next to it when the record
/// has line items. Returns the item table's path if one was written.
pub fn export_csv(record: &InvoiceRecord, path: impl AsRef<Path>) -> Result<Option<PathBuf>> {
    let path = path.as_ref();
    write_invoice_csv(record, create(path)?).map_err(at_path(path))?;
    info!(path = %path.display(), "Invoice CSV written");

    if record.line_items.is_empty() {
        return Ok(None);
    }
    let items = items_path(path);
    write_items_csv(&record.line_items, create(&items)?).map_err(at_path(&items))?;
    debug!(path = %items.display(), count = record.line_items.len(), "Line items written");
    Ok(Some(items))
}

/// Pretty-printed JSON using the record's field names.
pub fn to_json(record: &InvoiceRecord) -> Result<String> {
    Ok(serde_json::to_string_pretty(record)?)
}

pub fn export_json(record: &InvoiceRecord, path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let json = to_json(record)?;
    let mut file = create(path)?;
    file.write_all(json.as_bytes())
        .and_then(|()| file.flush())
        .map_err(|err| write_failed(path, err))?;
    info!(path = %path.display(), "Invoice JSON written");
    Ok(())
}
