// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Scanning stages — outline detection, perspective rectification, foreground
// separation, enhancement, size optimization, classification, and the OCR
// engine seam.

pub mod classify;
pub mod detect;
pub mod enhance;
pub mod geometry;
pub mod ocr;
pub mod optimize;
pub mod rectify;
pub mod separate;
pub mod threshold;

#[cfg(feature = "ocr")]
pub mod ocrs_engine;

pub use detect::GeometryDetector;
pub use enhance::QualityEnhancer;
pub use ocr::OcrEngine;
