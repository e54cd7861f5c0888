// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// blattwerk-document — Document photo normalization for Blattwerk.
//
// Locates a paper document in a photo, warps it upright, optionally removes
// the background, enhances legibility and shrinks the result for archival.
// Text recognition is reached through the `OcrEngine` trait.

pub mod image;
pub mod pipeline;
pub mod scan;

// Re-export the primary types so callers can use `blattwerk_document::DocumentPipeline` etc.
pub use crate::image::processor::ImageProcessor;
pub use pipeline::{DocumentPipeline, ProcessedDocument};
pub use scan::detect::{Detection, DetectionMethod, GeometryDetector};
pub use scan::enhance::{EnhancementPath, QualityEnhancer};
pub use scan::geometry::Quad;
pub use scan::ocr::{OcrEngine, StaticOcr};
pub use scan::separate::{BackgroundKeySegmenter, ForegroundSeparator, NoSegmenter, Segmenter};

#[cfg(feature = "ocr")]
pub use scan::ocrs_engine::OcrsEngine;
