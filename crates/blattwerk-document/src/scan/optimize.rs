// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Output size optimization: downsampling, desaturation, and the export JPEG
// quality / DPI that go with each optimization level.

use blattwerk_core::OptimizationLevel;
use image::DynamicImage;
use tracing::{debug, instrument};

use crate::image::processor::ImageProcessor;

/// What an optimization level does to the final raster.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptimizationProfile {
    pub grayscale: bool,
    pub scale: f32,
    pub jpeg_quality: u8,
    pub dpi_cap: Option<u32>,
}

impl OptimizationProfile {
    pub fn for_level(level: OptimizationLevel) -> Self {
        match level {
            OptimizationLevel::None => Self {
                grayscale: false,
                scale: 1.0,
                jpeg_quality: 100,
                dpi_cap: None,
            },
            OptimizationLevel::Light => Self {
                grayscale: false,
                scale: 0.8,
                jpeg_quality: 90,
                dpi_cap: None,
            },
            OptimizationLevel::Medium => Self {
                grayscale: true,
                scale: 0.6,
                jpeg_quality: 80,
                dpi_cap: Some(300),
            },
            OptimizationLevel::Strong => Self {
                grayscale: true,
                scale: 0.4,
                jpeg_quality: 65,
                dpi_cap: Some(200),
            },
        }
    }

    /// Export DPI for a requested resolution.
    pub fn export_dpi(&self, requested: u32) -> u32 {
        self.dpi_cap.map_or(requested, |cap| requested.min(cap))
    }
}

/// A raster ready for export, with its encoding parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizedImage {
    pub image: DynamicImage,
    pub jpeg_quality: u8,
    pub dpi: u32,
}

/// Apply the profile for `level` to `image`.
#[instrument(skip(image), fields(width = image.width(), height = image.height()))]
pub fn optimize(image: DynamicImage, level: OptimizationLevel, dpi: u32) -> OptimizedImage {
    let profile = OptimizationProfile::for_level(level);
    let mut processor = ImageProcessor::from_dynamic(image);

    if profile.grayscale {
        processor = processor.grayscale();
    }
    if profile.scale < 1.0 {
        processor = processor.downscale(profile.scale);
    }

    let image = processor.into_dynamic();
    let dpi = profile.export_dpi(dpi);
    debug!(
        width = image.width(),
        height = image.height(),
        quality = profile.jpeg_quality,
        dpi,
        "Output optimized"
    );

    OptimizedImage {
        image,
        jpeg_quality: profile.jpeg_quality,
        dpi,
    }
}
