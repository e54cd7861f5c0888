// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Quality enhancement for rectified document images: a generic
// denoise/sharpen/contrast/brightness path and a receipt path that equalizes
// local contrast and binarizes.

use blattwerk_core::OptimizationLevel;
use blattwerk_core::error::BlattwerkError;
use blattwerk_core::types::DocumentHint;
use image::{DynamicImage, GrayImage, Luma};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use super::threshold::{Polarity, adaptive_threshold};
use crate::image::processor::ImageProcessor;

/// Tuning constants for [`QualityEnhancer`].
#[derive(Debug, Clone, PartialEq)]
pub struct EnhanceParams {
    /// Median filter radius (1 → 3×3).
    pub denoise_radius: u32,
    pub sharpness: f32,
    pub contrast: f32,
    pub brightness: f32,
    /// CLAHE grid size per axis.
    pub clahe_tiles: u32,
    pub clahe_clip_limit: f32,
    /// Binarization window radius (10 → 21×21).
    pub binarize_radius: u32,
    pub binarize_bias: i32,
}

impl Default for EnhanceParams {
    fn default() -> Self {
        Self {
            denoise_radius: 1,
            sharpness: 2.0,
            contrast: 1.8,
            brightness: 1.1,
            clahe_tiles: 8,
            clahe_clip_limit: 2.0,
            binarize_radius: 10,
            binarize_bias: 11,
        }
    }
}

/// Which enhancement variant was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnhancementPath {
    Generic,
    Receipt,
}

/// Receipt path only for colour photos of receipt-like documents, and never
/// at optimization level 0.
pub fn select_path(hint: DocumentHint, channels: u8, level: OptimizationLevel) -> EnhancementPath {
    if hint.receipt_like && channels >= 3 && level != OptimizationLevel::None {
        EnhancementPath::Receipt
    } else {
        EnhancementPath::Generic
    }
}

type StepFn<'a> = Box<dyn Fn(&DynamicImage) -> Result<DynamicImage, BlattwerkError> + 'a>;
type Step<'a> = (&'static str, StepFn<'a>);

fn step<'a>(f: impl Fn(&DynamicImage) -> Result<DynamicImage, BlattwerkError> + 'a) -> StepFn<'a> {
    Box::new(f)
}

/// Improves legibility of a rectified document image.
#[derive(Debug, Clone, Default)]
pub struct QualityEnhancer {
    params: EnhanceParams,
}

impl QualityEnhancer {
    pub fn new(params: EnhanceParams) -> Self {
        Self { params }
    }

    /// Pick a path for `hint` and `level` and apply it.
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn enhance(
        &self,
        image: DynamicImage,
        hint: DocumentHint,
        level: OptimizationLevel,
    ) -> (DynamicImage, EnhancementPath) {
        let channels = image.color().channel_count();
        let path = select_path(hint, channels, level);
        debug!(?path, channels, "Enhancement path selected");

        let enhanced = match path {
            EnhancementPath::Generic => self.enhance_generic(image),
            EnhancementPath::Receipt => self.enhance_receipt(image),
        };
        info!(?path, "Image enhanced");
        (enhanced, path)
    }

    /// Median denoise, sharpen, contrast, brightness. Alpha is untouched.
    pub fn enhance_generic(&self, image: DynamicImage) -> DynamicImage {
        let p = &self.params;
        let steps: Vec<Step<'_>> = vec![
            ("denoise", step(|img| Ok(processor(img)?.denoise(p.denoise_radius).into_dynamic()))),
            ("sharpen", step(|img| Ok(processor(img)?.adjust_sharpness(p.sharpness).into_dynamic()))),
            ("contrast", step(|img| Ok(processor(img)?.adjust_contrast(p.contrast).into_dynamic()))),
            ("brightness", step(|img| Ok(processor(img)?.adjust_brightness(p.brightness).into_dynamic()))),
        ];
        run_steps(image, &steps)
    }

    /// Grayscale, CLAHE, then local-mean binarization.
    pub fn enhance_receipt(&self, image: DynamicImage) -> DynamicImage {
        let p = &self.params;
        let steps: Vec<Step<'_>> = vec![
            ("grayscale", step(|img| Ok(processor(img)?.grayscale().into_dynamic()))),
            (
                "equalize",
                step(|img| {
                    let gray = processor(img)?.grayscale().into_dynamic().into_luma8();
                    Ok(DynamicImage::ImageLuma8(clahe(&gray, p.clahe_tiles, p.clahe_clip_limit)))
                }),
            ),
            (
                "binarize",
                step(|img| {
                    let gray = processor(img)?.grayscale().into_dynamic().into_luma8();
                    let binary = adaptive_threshold(&gray, p.binarize_radius, p.binarize_bias, Polarity::BrightForeground);
                    Ok(DynamicImage::ImageLuma8(binary))
                }),
            ),
        ];
        run_steps(image, &steps)
    }
}

/// Wrap a copy of `image` for processing; empty images cannot be enhanced.
fn processor(image: &DynamicImage) -> Result<ImageProcessor, BlattwerkError> {
    if image.width() == 0 || image.height() == 0 {
        return Err(BlattwerkError::ImageError(format!(
            "cannot enhance an empty {}x{} image",
            image.width(),
            image.height()
        )));
    }
    Ok(ImageProcessor::from_dynamic(image.clone()))
}

/// Apply steps in order, keeping the last good image when one fails.
fn run_steps(image: DynamicImage, steps: &[Step<'_>]) -> DynamicImage {
    let mut current = image;
    for (name, apply) in steps {
        match apply(&current) {
            Ok(next) => current = next,
            Err(err) => {
                warn!(step = *name, error = %err, "Enhancement step failed; keeping previous result");
                break;
            }
        }
    }
    current
}

/// Contrast-limited adaptive histogram equalization.
///
/// The image is split into a `tiles`×`tiles` grid (fewer when the image is
/// smaller than that in pixels). Each tile's histogram is clipped at
/// `clip_limit` times the mean bin height, the excess is spread evenly over
/// all bins, and pixels are mapped by bilinear interpolation between the
/// lookup tables of the four nearest tile centres.
pub fn clahe(gray: &GrayImage, tiles: u32, clip_limit: f32) -> GrayImage {
    let (width, height) = gray.dimensions();
    if width == 0 || height == 0 {
        return gray.clone();
    }
    let tiles_x = tiles.clamp(1, width);
    let tiles_y = tiles.clamp(1, height);

    let bounds = |index: u32, count: u32, size: u32| (index * size / count, (index + 1) * size / count);

    let mut luts = vec![[0u8; 256]; (tiles_x * tiles_y) as usize];
    for ty in 0..tiles_y {
        let (y0, y1) = bounds(ty, tiles_y, height);
        for tx in 0..tiles_x {
            let (x0, x1) = bounds(tx, tiles_x, width);

            let mut hist = [0u32; 256];
            for y in y0..y1 {
                for x in x0..x1 {
                    hist[gray.get_pixel(x, y).0[0] as usize] += 1;
                }
            }
            let area = (x1 - x0) * (y1 - y0);
            luts[(ty * tiles_x + tx) as usize] = clipped_equalization(&mut hist, area, clip_limit);
        }
    }

    // Tile centres in pixel coordinates, for interpolation.
    let tile_w = width as f32 / tiles_x as f32;
    let tile_h = height as f32 / tiles_y as f32;
    let neighbours = |pos: u32, size: f32, count: u32| {
        let f = (pos as f32 + 0.5) / size - 0.5;
        let lower = f.floor().clamp(0.0, (count - 1) as f32) as u32;
        let upper = (lower + 1).min(count - 1);
        let weight = (f - lower as f32).clamp(0.0, 1.0);
        (lower, upper, weight)
    };

    GrayImage::from_fn(width, height, |x, y| {
        let value = gray.get_pixel(x, y).0[0] as usize;
        let (ty0, ty1, wy) = neighbours(y, tile_h, tiles_y);
        let (tx0, tx1, wx) = neighbours(x, tile_w, tiles_x);
        let lut = |tx: u32, ty: u32| luts[(ty * tiles_x + tx) as usize][value] as f32;

        let top = lut(tx0, ty0) * (1.0 - wx) + lut(tx1, ty0) * wx;
        let bottom = lut(tx0, ty1) * (1.0 - wx) + lut(tx1, ty1) * wx;
        let mapped = top * (1.0 - wy) + bottom * wy;
        Luma([mapped.round().clamp(0.0, 255.0) as u8])
    })
}

/// Clip a tile histogram and build its cumulative lookup table.
fn clipped_equalization(hist: &mut [u32; 256], area: u32, clip_limit: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if area == 0 {
        for (value, slot) in lut.iter_mut().enumerate() {
            *slot = value as u8;
        }
        return lut;
    }

    let limit = ((clip_limit * area as f32 / 256.0) as u32).max(1);
    let mut excess = 0u32;
    for bin in hist.iter_mut() {
        if *bin > limit {
            excess += *bin - limit;
            *bin = limit;
        }
    }
    let share = excess / 256;
    let remainder = (excess % 256) as usize;
    for (i, bin) in hist.iter_mut().enumerate() {
        *bin += share + u32::from(i < remainder);
    }

    let scale = 255.0 / area as f32;
    let mut cumulative = 0u32;
    for (bin, slot) in hist.iter().zip(lut.iter_mut()) {
        cumulative += bin;
        *slot = (cumulative as f32 * scale).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage, Rgba, RgbaImage};

    fn solid_rgb(value: u8) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 60, Rgb([value; 3])))
    }

    #[test]
    fn path_selection() {
        use OptimizationLevel::*;
        let receipt = DocumentHint::receipt();
        assert_eq!(select_path(receipt, 3, Medium), EnhancementPath::Receipt);
        assert_eq!(select_path(receipt, 4, Light), EnhancementPath::Receipt);
        assert_eq!(select_path(receipt, 1, Medium), EnhancementPath::Generic);
        assert_eq!(select_path(receipt, 3, None), EnhancementPath::Generic);
        assert_eq!(select_path(DocumentHint::generic(), 3, Strong), EnhancementPath::Generic);
    }

    #[test]
    fn enhancing_twice_on_extremes_does_not_panic() {
        let enhancer = QualityEnhancer::default();
        for value in [0u8, 255] {
            for hint in [DocumentHint::generic(), DocumentHint::receipt()] {
                let (once, _) = enhancer.enhance(solid_rgb(value), hint, OptimizationLevel::Medium);
                let (twice, _) = enhancer.enhance(once, hint, OptimizationLevel::Medium);
                assert_eq!((twice.width(), twice.height()), (40, 60));
            }
        }
    }

    #[test]
    fn white_page_stays_white() {
        let enhancer = QualityEnhancer::default();
        let (generic, _) = enhancer.enhance(solid_rgb(255), DocumentHint::generic(), OptimizationLevel::Medium);
        assert!(generic.to_rgb8().pixels().all(|p| p.0 == [255, 255, 255]));

        let (receipt, path) = enhancer.enhance(solid_rgb(255), DocumentHint::receipt(), OptimizationLevel::Medium);
        assert_eq!(path, EnhancementPath::Receipt);
        assert!(matches!(&receipt, DynamicImage::ImageLuma8(g) if g.pixels().all(|p| p.0[0] == 255)));
    }

    #[test]
    fn receipt_path_binarizes() {
        let mut img = RgbImage::from_pixel(60, 60, Rgb([230, 225, 220]));
        for x in 10..50 {
            for y in 28..32 {
                img.put_pixel(x, y, Rgb([30, 30, 30]));
            }
        }
        let (out, _) = QualityEnhancer::default().enhance(
            DynamicImage::ImageRgb8(img),
            DocumentHint::receipt(),
            OptimizationLevel::Strong,
        );
        let gray = out.to_luma8();
        assert!(gray.pixels().all(|p| p.0[0] == 0 || p.0[0] == 255));
        assert_eq!(gray.get_pixel(30, 30).0[0], 0);
        assert_eq!(gray.get_pixel(30, 5).0[0], 255);
    }

    #[test]
    fn generic_path_keeps_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([100, 120, 140, 77])));
        let (out, path) = QualityEnhancer::default().enhance(img, DocumentHint::generic(), OptimizationLevel::Light);
        assert_eq!(path, EnhancementPath::Generic);
        assert!(out.to_rgba8().pixels().all(|p| p.0[3] == 77));
    }

    #[test]
    fn empty_image_is_returned_unchanged() {
        let empty = DynamicImage::ImageRgb8(RgbImage::new(0, 0));
        let out = QualityEnhancer::default().enhance_generic(empty.clone());
        assert_eq!(out, empty);
    }

    #[test]
    fn clahe_spreads_a_narrow_histogram() {
        let gray = GrayImage::from_fn(64, 64, |x, _| Luma([100 + (x % 8) as u8]));
        let out = clahe(&gray, 8, 2.0);
        let (min, max) = out
            .pixels()
            .fold((255u8, 0u8), |(lo, hi), p| (lo.min(p.0[0]), hi.max(p.0[0])));
        assert!(max - min > 7, "range {min}..{max} not widened");
    }

    #[test]
    fn clahe_handles_images_smaller_than_grid() {
        let gray = GrayImage::from_pixel(3, 2, Luma([42u8]));
        let out = clahe(&gray, 8, 2.0);
        assert_eq!(out.dimensions(), (3, 2));
    }
}
