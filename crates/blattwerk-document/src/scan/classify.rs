// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Receipt-vs-document classification from file name, shape and brightness.

use blattwerk_core::types::DocumentHint;
use image::DynamicImage;
use tracing::debug;

use crate::image::processor::mean_luma;

/// File-name fragments that mark a receipt or invoice photo.
const RECEIPT_KEYWORDS: [&str; 4] = ["kvit", "arve", "tsek", "tšek"];

/// Height/width ratio above which a document counts as a till roll.
const TALL_ASPECT: f64 = 1.5;

/// Mean gray level above which a document counts as receipt paper.
const BRIGHT_MEAN: f64 = 180.0;

/// Classify a photo as receipt-like or generic.
///
/// Checked in order: file-name keywords, aspect ratio, mean brightness.
pub fn classify(image: &DynamicImage, file_name: &str) -> DocumentHint {
    let name = file_name.to_lowercase();
    if RECEIPT_KEYWORDS.iter().any(|k| name.contains(k)) {
        debug!(file_name, "Receipt keyword in file name");
        return DocumentHint::receipt();
    }

    let (width, height) = (image.width(), image.height());
    if width > 0 && height as f64 / width as f64 > TALL_ASPECT {
        debug!(width, height, "Tall document");
        return DocumentHint::receipt();
    }

    let brightness = mean_luma(&image.to_luma8());
    if brightness > BRIGHT_MEAN {
        debug!(brightness, "Bright document");
        return DocumentHint::receipt();
    }

    DocumentHint::generic()
}
