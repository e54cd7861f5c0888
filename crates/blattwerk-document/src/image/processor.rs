// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Image processor — channel-layout normalization, resize, grayscale,
// sharpness/contrast/brightness, denoise, and encoding. Operates on in-memory
// images using the `image` and `imageproc` crates.

use blattwerk_core::error::BlattwerkError;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, Pixel};
use imageproc::filter::median_filter;
use tracing::{debug, info, instrument};

/// 8-bit image buffer with a `Vec<u8>` backing store.
type Buffer<P> = ImageBuffer<P, Vec<u8>>;

/// Image processing pipeline operating on a single in-memory image.
///
/// All operations are non-destructive: each method consumes `self` and returns a
/// new `ImageProcessor` wrapping the transformed image, enabling method chaining.
///
/// ```ignore
/// let jpeg = ImageProcessor::open("receipt.jpg")?
///     .denoise(1)
///     .adjust_sharpness(2.0)
///     .adjust_contrast(1.8)
///     .to_jpeg_bytes(90)?;
/// ```
pub struct ImageProcessor {
    /// The current working image. Always one of the 8-bit layouts
    /// gray, gray+alpha, RGB or RGBA.
    image: DynamicImage,
}

impl ImageProcessor {
    // -- Construction ---------------------------------------------------------

    /// Load an image from a file path.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self, BlattwerkError> {
        let img = image::open(path.as_ref()).map_err(|err| BlattwerkError::UnreadableInput {
            source_name: path.as_ref().display().to_string(),
            reason: err.to_string(),
        })?;
        info!(width = img.width(), height = img.height(), "Image loaded");
        Ok(Self::from_dynamic(img))
    }

    /// Create a processor from raw encoded bytes (JPEG, PNG, etc.).
    #[instrument(skip(data), fields(data_len = data.len()))]
    pub fn from_bytes(data: &[u8]) -> Result<Self, BlattwerkError> {
        let img = image::load_from_memory(data).map_err(|err| BlattwerkError::UnreadableInput {
            source_name: "<memory>".to_string(),
            reason: err.to_string(),
        })?;
        debug!(width = img.width(), height = img.height(), "Image decoded from bytes");
        Ok(Self::from_dynamic(img))
    }

    /// Wrap an already-decoded `DynamicImage`, normalizing its channel layout.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        Self {
            image: normalize_layout(image),
        }
    }

    // -- Accessors ------------------------------------------------------------

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Number of channels (1, 2, 3 or 4).
    pub fn channel_count(&self) -> u8 {
        self.image.color().channel_count()
    }

    /// Borrow the underlying `DynamicImage`.
    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    /// Consume the processor and return the underlying `DynamicImage`.
    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    // -- Transformations (consume self, return new Self) -----------------------

    /// Resize to `width`, keeping the aspect ratio. Uses cubic filtering.
    #[instrument(skip(self), fields(width))]
    pub fn resize_to_width(self, width: u32) -> Self {
        let (w, h) = (self.image.width(), self.image.height());
        if w == 0 || width == w {
            return self;
        }
        let height = ((h as f64 * width as f64 / w as f64) as u32).max(1);
        info!(from_w = w, from_h = h, width, height, "Resizing image");
        Self {
            image: self.image.resize_exact(width, height, FilterType::CatmullRom),
        }
    }

    /// Shrink by `factor` (0 < factor < 1) using area averaging.
    ///
    /// Each source pixel contributes to exactly one target pixel, which keeps
    /// fine text from aliasing when shrinking. Factors of 1.0 or more are a
    /// no-op.
    #[instrument(skip(self), fields(factor))]
    pub fn downscale(self, factor: f32) -> Self {
        if factor >= 1.0 || factor <= 0.0 {
            return self;
        }
        let width = ((self.image.width() as f32 * factor) as u32).max(1);
        let height = ((self.image.height() as f32 * factor) as u32).max(1);
        debug!(width, height, "Area downscale");
        Self {
            image: self.image.thumbnail_exact(width, height),
        }
    }

    /// Convert to single-channel luma. Gray inputs are returned unchanged.
    #[instrument(skip(self))]
    pub fn grayscale(self) -> Self {
        match self.image {
            DynamicImage::ImageLuma8(_) => self,
            other => {
                info!("Converting to grayscale");
                Self {
                    image: DynamicImage::ImageLuma8(other.to_luma8()),
                }
            }
        }
    }

    /// Scale brightness by `factor` (1.0 = unchanged, 0.0 = black).
    #[instrument(skip(self), fields(factor))]
    pub fn adjust_brightness(self, factor: f32) -> Self {
        info!(factor, "Adjusting brightness");
        let lut = lookup_table(|v| v * factor);
        Self {
            image: apply_lut(&self.image, &lut),
        }
    }

    /// Adjust contrast by a factor around the image's mean luminance.
    /// Values > 1.0 increase contrast; 1.0 is a no-op; 0.0 yields a flat
    /// image at the mean.
    #[instrument(skip(self), fields(factor))]
    pub fn adjust_contrast(self, factor: f32) -> Self {
        let mean = mean_luma(&self.image.to_luma8()).round() as f32;
        info!(factor, mean, "Adjusting contrast");
        let lut = lookup_table(|v| mean + factor * (v - mean));
        Self {
            image: apply_lut(&self.image, &lut),
        }
    }

    /// Sharpen by blending away from a 3x3 smoothed copy.
    ///
    /// `factor` 1.0 is a no-op, 0.0 returns the smoothed image, 2.0 doubles
    /// the difference between each pixel and its smoothed neighbourhood.
    #[instrument(skip(self), fields(factor))]
    pub fn adjust_sharpness(self, factor: f32) -> Self {
        info!(factor, "Adjusting sharpness");
        let image = match &self.image {
            DynamicImage::ImageLuma8(buf) => DynamicImage::ImageLuma8(sharpen_buffer(buf, factor)),
            DynamicImage::ImageLumaA8(buf) => {
                DynamicImage::ImageLumaA8(sharpen_buffer(buf, factor))
            }
            DynamicImage::ImageRgb8(buf) => DynamicImage::ImageRgb8(sharpen_buffer(buf, factor)),
            DynamicImage::ImageRgba8(buf) => DynamicImage::ImageRgba8(sharpen_buffer(buf, factor)),
            other => DynamicImage::ImageRgb8(sharpen_buffer(&other.to_rgb8(), factor)),
        };
        Self { image }
    }

    /// Edge-preserving noise removal with a square median filter.
    #[instrument(skip(self), fields(radius))]
    pub fn denoise(self, radius: u32) -> Self {
        if radius == 0 {
            return self;
        }
        info!(radius, "Denoising");
        let image = match &self.image {
            DynamicImage::ImageLuma8(buf) => {
                DynamicImage::ImageLuma8(median_filter(buf, radius, radius))
            }
            DynamicImage::ImageLumaA8(buf) => {
                DynamicImage::ImageLumaA8(median_filter(buf, radius, radius))
            }
            DynamicImage::ImageRgb8(buf) => {
                DynamicImage::ImageRgb8(median_filter(buf, radius, radius))
            }
            DynamicImage::ImageRgba8(buf) => {
                DynamicImage::ImageRgba8(median_filter(buf, radius, radius))
            }
            other => DynamicImage::ImageRgb8(median_filter(&other.to_rgb8(), radius, radius)),
        };
        Self { image }
    }

    // -- Output ---------------------------------------------------------------

    /// Encode the current image as PNG bytes.
    pub fn to_png_bytes(&self) -> Result<Vec<u8>, BlattwerkError> {
        encode_to_format(&self.image, ImageFormat::Png)
    }

    /// Encode the current image as JPEG bytes with the given quality (1-100).
    ///
    /// Gray images stay single-channel; alpha is dropped.
    pub fn to_jpeg_bytes(&self, quality: u8) -> Result<Vec<u8>, BlattwerkError> {
        let mut buffer = Vec::new();
        let encoder =
            image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100));
        let result = match &self.image {
            DynamicImage::ImageLuma8(gray) => gray.write_with_encoder(encoder),
            DynamicImage::ImageLumaA8(_) => self.image.to_luma8().write_with_encoder(encoder),
            other => other.to_rgb8().write_with_encoder(encoder),
        };
        result.map_err(|err| BlattwerkError::ImageError(format!("JPEG encoding failed: {}", err)))?;
        Ok(buffer)
    }

    /// Write the image to a file. The format is inferred from the file extension.
    pub fn save(&self, path: impl AsRef<std::path::Path>) -> Result<(), BlattwerkError> {
        self.image
            .save(path.as_ref())
            .map_err(|err| BlattwerkError::OutputWrite {
                path: path.as_ref().display().to_string(),
                reason: err.to_string(),
            })
    }

    /// Write the image as JPEG with an explicit quality.
    pub fn save_jpeg(
        &self,
        path: impl AsRef<std::path::Path>,
        quality: u8,
    ) -> Result<(), BlattwerkError> {
        let bytes = self.to_jpeg_bytes(quality)?;
        std::fs::write(path.as_ref(), bytes).map_err(|err| BlattwerkError::OutputWrite {
            path: path.as_ref().display().to_string(),
            reason: err.to_string(),
        })
    }
}

// -- Layout helpers -------------------------------------------------------------

/// Coerce any decoded image into one of the four 8-bit layouts the pipeline
/// works with: gray, gray+alpha, RGB, RGBA.
pub fn normalize_layout(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(_)
        | DynamicImage::ImageLumaA8(_)
        | DynamicImage::ImageRgb8(_)
        | DynamicImage::ImageRgba8(_) => image,
        DynamicImage::ImageLuma16(_) => DynamicImage::ImageLuma8(image.to_luma8()),
        DynamicImage::ImageLumaA16(_) => DynamicImage::ImageLumaA8(image.to_luma_alpha8()),
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Mean gray level of a single-channel image (0.0 for an empty image).
pub fn mean_luma(gray: &GrayImage) -> f64 {
    let count = gray.width() as u64 * gray.height() as u64;
    if count == 0 {
        return 0.0;
    }
    let sum: u64 = gray.pixels().map(|p| p.0[0] as u64).sum();
    sum as f64 / count as f64
}

/// Build a saturating 256-entry lookup table from a per-value mapping.
fn lookup_table(map: impl Fn(f32) -> f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (value, slot) in lut.iter_mut().enumerate() {
        *slot = map(value as f32).round().clamp(0.0, 255.0) as u8;
    }
    lut
}

/// Number of colour channels in a pixel type (alpha excluded).
fn colour_channels<P: Pixel>() -> usize {
    match P::CHANNEL_COUNT {
        2 | 4 => P::CHANNEL_COUNT as usize - 1,
        n => n as usize,
    }
}

fn map_buffer<P>(buf: &Buffer<P>, lut: &[u8; 256]) -> Buffer<P>
where
    P: Pixel<Subpixel = u8>,
{
    let colour = colour_channels::<P>();
    let mut out = buf.clone();
    for pixel in out.pixels_mut() {
        for channel in pixel.channels_mut()[..colour].iter_mut() {
            *channel = lut[*channel as usize];
        }
    }
    out
}

/// Apply a lookup table to the colour channels, leaving alpha untouched.
fn apply_lut(image: &DynamicImage, lut: &[u8; 256]) -> DynamicImage {
    match image {
        DynamicImage::ImageLuma8(buf) => DynamicImage::ImageLuma8(map_buffer(buf, lut)),
        DynamicImage::ImageLumaA8(buf) => DynamicImage::ImageLumaA8(map_buffer(buf, lut)),
        DynamicImage::ImageRgb8(buf) => DynamicImage::ImageRgb8(map_buffer(buf, lut)),
        DynamicImage::ImageRgba8(buf) => DynamicImage::ImageRgba8(map_buffer(buf, lut)),
        other => DynamicImage::ImageRgb8(map_buffer(&other.to_rgb8(), lut)),
    }
}

/// Sharpen the colour channels of a buffer.
///
/// The smoothing kernel is 1 1 1 / 1 5 1 / 1 1 1 (sum 13). Border pixels keep
/// their original values as the smoothed reference.
fn sharpen_buffer<P>(buf: &Buffer<P>, factor: f32) -> Buffer<P>
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = buf.dimensions();
    let colour = colour_channels::<P>();
    let mut out = buf.clone();
    if width < 3 || height < 3 {
        return out;
    }

    for y in 1..height - 1 {
        for x in 1..width - 1 {
            for c in 0..colour {
                let mut acc = 0u32;
                for dy in 0..3 {
                    for dx in 0..3 {
                        let weight = if dx == 1 && dy == 1 { 5 } else { 1 };
                        acc += weight * buf.get_pixel(x + dx - 1, y + dy - 1).channels()[c] as u32;
                    }
                }
                let smooth = acc as f32 / 13.0;
                let original = buf.get_pixel(x, y).channels()[c] as f32;
                let value = smooth + factor * (original - smooth);
                out.get_pixel_mut(x, y).channels_mut()[c] = value.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

/// Encode a `DynamicImage` into the specified format, returning the raw bytes.
fn encode_to_format(image: &DynamicImage, format: ImageFormat) -> Result<Vec<u8>, BlattwerkError> {
    let mut buffer = Vec::new();
    let mut cursor = std::io::Cursor::new(&mut buffer);
    image
        .write_to(&mut cursor, format)
        .map_err(|err| BlattwerkError::ImageError(format!("image encoding failed: {}", err)))?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage, Rgba, RgbaImage};

    fn gray(width: u32, height: u32, value: u8) -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_pixel(width, height, Luma([value])))
    }

    #[test]
    fn sixteen_bit_input_is_normalized() {
        let img = DynamicImage::ImageRgb16(image::ImageBuffer::new(4, 4));
        let processor = ImageProcessor::from_dynamic(img);
        assert!(matches!(processor.as_dynamic(), DynamicImage::ImageRgb8(_)));
    }

    #[test]
    fn brightness_saturates() {
        let out = ImageProcessor::from_dynamic(gray(4, 4, 250))
            .adjust_brightness(1.1)
            .into_dynamic();
        assert!(out.to_luma8().pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn contrast_on_flat_image_is_identity() {
        let out = ImageProcessor::from_dynamic(gray(5, 5, 77))
            .adjust_contrast(1.8)
            .into_dynamic();
        assert!(out.to_luma8().pixels().all(|p| p.0[0] == 77));
    }

    #[test]
    fn contrast_preserves_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(3, 3, Rgba([10, 200, 90, 33])));
        let out = ImageProcessor::from_dynamic(img)
            .adjust_contrast(1.8)
            .into_dynamic();
        assert!(out.to_rgba8().pixels().all(|p| p.0[3] == 33));
    }

    #[test]
    fn sharpen_flat_image_is_identity() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(6, 6, Rgb([120, 60, 30])));
        let out = ImageProcessor::from_dynamic(img.clone())
            .adjust_sharpness(2.0)
            .into_dynamic();
        assert_eq!(out.to_rgb8(), img.to_rgb8());
    }

    #[test]
    fn sharpen_amplifies_an_isolated_dot() {
        let mut buf = GrayImage::from_pixel(5, 5, Luma([100]));
        buf.put_pixel(2, 2, Luma([150]));
        let out = ImageProcessor::from_dynamic(DynamicImage::ImageLuma8(buf))
            .adjust_sharpness(2.0)
            .into_dynamic()
            .to_luma8();
        assert!(out.get_pixel(2, 2).0[0] > 150);
    }

    #[test]
    fn downscale_uses_floor_dimensions() {
        let out = ImageProcessor::from_dynamic(gray(101, 53, 10)).downscale(0.4);
        assert_eq!((out.width(), out.height()), (40, 21));
    }

    #[test]
    fn resize_to_width_keeps_aspect() {
        let out = ImageProcessor::from_dynamic(gray(200, 100, 10)).resize_to_width(50);
        assert_eq!((out.width(), out.height()), (50, 25));
    }

    #[test]
    fn grayscale_gray_is_untouched() {
        let out = ImageProcessor::from_dynamic(gray(3, 3, 9)).grayscale();
        assert_eq!(out.channel_count(), 1);
    }

    #[test]
    fn jpeg_keeps_gray_single_channel() {
        let bytes = ImageProcessor::from_dynamic(gray(8, 8, 128))
            .to_jpeg_bytes(80)
            .unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.color().channel_count(), 1);
    }

    #[test]
    fn undecodable_bytes_are_unreadable_input() {
        let err = ImageProcessor::from_bytes(b"not an image")
            .err()
            .expect("decode must fail");
        assert!(matches!(err, BlattwerkError::UnreadableInput { .. }));
    }

    #[test]
    fn save_to_missing_directory_is_output_error() {
        let err = ImageProcessor::from_dynamic(gray(2, 2, 0))
            .save_jpeg("/nonexistent-dir/blattwerk/out.jpg", 90)
            .unwrap_err();
        assert!(matches!(err, BlattwerkError::OutputWrite { .. }));
    }
}
