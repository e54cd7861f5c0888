// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Foreground separation — pluggable background removal with graceful
// pass-through, a classical corner-colour segmenter, and compositing of
// alpha images onto a white backing.

use std::sync::Arc;

use blattwerk_core::error::BlattwerkError;
use image::imageops::FilterType;
use image::{DynamicImage, ImageBuffer, Luma, Pixel, Rgb, RgbImage, RgbaImage};
use tracing::{debug, info, instrument, warn};

/// A background-removal model.
///
/// Implementations return an RGBA image of the same dimensions as the input
/// whose alpha channel marks the foreground.
pub trait Segmenter: Send + Sync {
    fn separate(&self, image: &RgbImage) -> Result<RgbaImage, BlattwerkError>;
}

/// Stand-in for environments without a segmentation model.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSegmenter;

impl Segmenter for NoSegmenter {
    fn separate(&self, _image: &RgbImage) -> Result<RgbaImage, BlattwerkError> {
        Err(BlattwerkError::SegmentationUnavailable)
    }
}

/// Classical segmenter keyed on the background colour sampled at the corners.
///
/// Alpha is 0 within `tolerance` (Euclidean RGB distance) of the background,
/// 255 beyond twice the tolerance, and a linear ramp in between.
#[derive(Debug, Clone, Copy)]
pub struct BackgroundKeySegmenter {
    pub tolerance: f32,
}

impl Default for BackgroundKeySegmenter {
    fn default() -> Self {
        Self { tolerance: 40.0 }
    }
}

impl BackgroundKeySegmenter {
    fn background(image: &RgbImage) -> [f32; 3] {
        let (w, h) = image.dimensions();
        let corners = [(0, 0), (w - 1, 0), (0, h - 1), (w - 1, h - 1)];
        let mut sum = [0.0f32; 3];
        for (x, y) in corners {
            let px = image.get_pixel(x, y).0;
            for c in 0..3 {
                sum[c] += px[c] as f32;
            }
        }
        sum.map(|s| s / 4.0)
    }
}

impl Segmenter for BackgroundKeySegmenter {
    fn separate(&self, image: &RgbImage) -> Result<RgbaImage, BlattwerkError> {
        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            return Err(BlattwerkError::Segmentation("empty image".into()));
        }
        let background = Self::background(image);
        let tolerance = self.tolerance.max(f32::EPSILON);

        let output = RgbaImage::from_fn(w, h, |x, y| {
            let [r, g, b] = image.get_pixel(x, y).0;
            let dist = ((r as f32 - background[0]).powi(2)
                + (g as f32 - background[1]).powi(2)
                + (b as f32 - background[2]).powi(2))
            .sqrt();
            let alpha = ((dist - tolerance) / tolerance).clamp(0.0, 1.0);
            image::Rgba([r, g, b, (alpha * 255.0).round() as u8])
        });
        Ok(output)
    }
}

/// Runs the configured segmenter, falling back to the untouched input.
#[derive(Clone)]
pub struct ForegroundSeparator {
    segmenter: Option<Arc<dyn Segmenter>>,
    working_width: u32,
}

impl std::fmt::Debug for ForegroundSeparator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForegroundSeparator")
            .field("active", &self.is_active())
            .field("working_width", &self.working_width)
            .finish()
    }
}

impl ForegroundSeparator {
    /// Separator that always passes images through.
    pub fn disabled() -> Self {
        Self {
            segmenter: None,
            working_width: 0,
        }
    }

    /// Separator using `segmenter` on copies no wider than `working_width`.
    pub fn new(segmenter: Arc<dyn Segmenter>, working_width: u32) -> Self {
        Self {
            segmenter: Some(segmenter),
            working_width,
        }
    }

    pub fn is_active(&self) -> bool {
        self.segmenter.is_some()
    }

    /// Run the segmenter and check its output, propagating any failure.
    #[instrument(skip_all, fields(width = image.width(), height = image.height()))]
    pub fn try_separate(&self, image: &DynamicImage) -> Result<DynamicImage, BlattwerkError> {
        let segmenter = self
            .segmenter
            .as_ref()
            .ok_or(BlattwerkError::SegmentationUnavailable)?;

        let input = if self.working_width > 0 && image.width() > self.working_width {
            let scale = self.working_width as f32 / image.width() as f32;
            let height = ((image.height() as f32 * scale).round() as u32).max(1);
            debug!(width = self.working_width, height, "Downscaled for segmentation");
            image.resize_exact(self.working_width, height, FilterType::CatmullRom)
        } else {
            image.clone()
        };

        let rgb = input.to_rgb8();
        let output = segmenter.separate(&rgb)?;
        if output.dimensions() != rgb.dimensions() {
            return Err(BlattwerkError::Segmentation(format!(
                "segmenter returned {:?} for a {:?} input",
                output.dimensions(),
                rgb.dimensions()
            )));
        }

        info!("Foreground separated");
        Ok(DynamicImage::ImageRgba8(output))
    }

    /// Separate the foreground, or return `image` unchanged when no segmenter
    /// is configured or it fails.
    ///
    /// The returned flag is true when segmentation was applied.
    pub fn separate(&self, image: DynamicImage) -> (DynamicImage, bool) {
        if !self.is_active() {
            return (image, false);
        }
        match self.try_separate(&image) {
            Ok(separated) => (separated, true),
            Err(err) => {
                warn!(error = %err, "Segmentation failed; continuing without it");
                (image, false)
            }
        }
    }
}

/// Flatten an image with alpha onto a white background.
///
/// `out = fg·α + 255·(1−α)`, rounded. RGBA becomes RGB and gray+alpha becomes
/// gray; images without alpha are returned unchanged.
pub fn composite_on_white(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageRgba8(buf) => {
            DynamicImage::ImageRgb8(flatten(&buf, |c: [u8; 3]| Rgb(c)))
        }
        DynamicImage::ImageLumaA8(buf) => {
            DynamicImage::ImageLuma8(flatten(&buf, |c: [u8; 1]| Luma(c)))
        }
        other if other.color().has_alpha() => {
            DynamicImage::ImageRgb8(flatten(&other.to_rgba8(), |c: [u8; 3]| Rgb(c)))
        }
        other => other,
    }
}

fn flatten<P, Q, const N: usize>(
    buf: &ImageBuffer<P, Vec<u8>>,
    make: impl Fn([u8; N]) -> Q,
) -> ImageBuffer<Q, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
    Q: Pixel<Subpixel = u8>,
{
    let (w, h) = buf.dimensions();
    ImageBuffer::from_fn(w, h, |x, y| {
        let channels = buf.get_pixel(x, y).channels();
        let alpha = channels[N] as f32 / 255.0;
        let mut out = [0u8; N];
        for (slot, &value) in out.iter_mut().zip(channels) {
            *slot = (value as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        }
        make(out)
    })
}
