// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Blattwerk Invoice — structured field extraction from OCR text, CSV/JSON
// export for accounting import, and a photo-to-record reader.

pub mod export;
pub mod extract;
pub mod reader;

pub use export::{export_csv, export_json, to_json};
pub use extract::Extractor;
pub use reader::InvoiceReader;
