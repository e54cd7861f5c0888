// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Document normalization pipeline — classify, detect, rectify, separate,
// enhance and optimize a single photo, or a batch of them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use blattwerk_core::error::BlattwerkError;
use blattwerk_core::types::DocumentHint;
use blattwerk_core::{OptimizationLevel, PipelineConfig};
use image::DynamicImage;
use tracing::{debug, info, instrument, warn};

use crate::image::processor::ImageProcessor;
use crate::scan::classify::classify;
use crate::scan::detect::{Detection, GeometryDetector};
use crate::scan::enhance::{EnhancementPath, QualityEnhancer};
use crate::scan::optimize::optimize;
use crate::scan::rectify::rectify;
use crate::scan::separate::{ForegroundSeparator, Segmenter, composite_on_white};

/// A normalized document image and what was done to produce it.
#[derive(Debug, Clone)]
pub struct ProcessedDocument {
    pub image: DynamicImage,
    pub hint: DocumentHint,
    pub detection: Detection,
    /// False when rectification failed and the unwarped photo was kept.
    pub rectified: bool,
    pub segmented: bool,
    pub enhancement: EnhancementPath,
    pub jpeg_quality: u8,
    pub dpi: u32,
}

impl ProcessedDocument {
    /// Encode as JPEG at the optimization level's quality.
    pub fn to_jpeg_bytes(&self) -> Result<Vec<u8>, BlattwerkError> {
        ImageProcessor::from_dynamic(self.image.clone()).to_jpeg_bytes(self.jpeg_quality)
    }

    pub fn to_png_bytes(&self) -> Result<Vec<u8>, BlattwerkError> {
        ImageProcessor::from_dynamic(self.image.clone()).to_png_bytes()
    }

    pub fn save_jpeg(&self, path: impl AsRef<Path>) -> Result<(), BlattwerkError> {
        ImageProcessor::from_dynamic(self.image.clone()).save_jpeg(path, self.jpeg_quality)
    }
}

/// Turns document photos into flat, upright, enhanced rasters.
///
/// Construction resolves whether a segmenter is used; processing itself is
/// synchronous and never fails once the input has been decoded.
#[derive(Debug, Clone)]
pub struct DocumentPipeline {
    config: PipelineConfig,
    detector: GeometryDetector,
    separator: ForegroundSeparator,
    enhancer: QualityEnhancer,
}

impl DocumentPipeline {
    /// Pipeline without background removal.
    pub fn new(config: PipelineConfig) -> Result<Self, BlattwerkError> {
        config.validate()?;
        Ok(Self {
            config,
            detector: GeometryDetector::default(),
            separator: ForegroundSeparator::disabled(),
            enhancer: QualityEnhancer::default(),
        })
    }

    /// Pipeline that removes backgrounds with `segmenter` when the
    /// configuration enables segmentation.
    pub fn with_segmenter(config: PipelineConfig, segmenter: Arc<dyn Segmenter>) -> Result<Self, BlattwerkError> {
        let mut pipeline = Self::new(config)?;
        if pipeline.config.use_segmentation {
            pipeline.separator = ForegroundSeparator::new(segmenter, pipeline.config.segmentation_width);
        } else {
            debug!("Segmentation disabled by configuration");
        }
        Ok(pipeline)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Normalize an encoded image at the configured optimization level.
    #[instrument(skip(self, data), fields(data_len = data.len()))]
    pub fn process_bytes(&self, data: &[u8], file_name: &str) -> Result<ProcessedDocument, BlattwerkError> {
        let image = ImageProcessor::from_bytes(data)
            .map_err(|err| match err {
                BlattwerkError::UnreadableInput { reason, .. } => BlattwerkError::UnreadableInput {
                    source_name: file_name.to_string(),
                    reason,
                },
                other => other,
            })?
            .into_dynamic();
        Ok(self.process_image(image, file_name, self.config.optimization_level))
    }

    /// Load and normalize an image file at the configured optimization level.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn process_path(&self, path: impl AsRef<Path>) -> Result<ProcessedDocument, BlattwerkError> {
        let path = path.as_ref();
        let image = ImageProcessor::open(path)?.into_dynamic();
        let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
        Ok(self.process_image(image, &file_name, self.config.optimization_level))
    }

    /// Normalize every file in `paths`. A file that cannot be read yields an
    /// error in its own slot; the rest of the batch continues.
    pub fn process_batch<P: AsRef<Path>>(&self, paths: &[P]) -> Vec<(PathBuf, Result<ProcessedDocument, BlattwerkError>)> {
        info!(count = paths.len(), "Processing batch");
        paths
            .iter()
            .map(|path| {
                let path = path.as_ref();
                let result = self.process_path(path);
                if let Err(err) = &result {
                    warn!(path = %path.display(), error = %err, "Skipping document");
                }
                (path.to_path_buf(), result)
            })
            .collect()
    }

    /// Run every stage on a decoded image.
    ///
    /// `file_name` feeds the receipt classifier and names debug output.
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn process_image(&self, image: DynamicImage, file_name: &str, level: OptimizationLevel) -> ProcessedDocument {
        let image = crate::image::processor::normalize_layout(image);
        let stem = Path::new(file_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document".to_string());
        self.save_stage(&stem, "1_original", &image);

        let hint = classify(&image, file_name);
        let detection = self.detector.detect_at_width(&image, self.config.detection_width);
        debug!(method = ?detection.method, quad = ?detection.quad.ordered(), "Outline located");

        let (flat, rectified) = match rectify(&image, &detection.quad) {
            Ok(warped) => (warped, true),
            Err(err) => {
                warn!(error = %err, "Rectification failed; using the unrectified photo");
                (image, false)
            }
        };
        self.save_stage(&stem, "2_rectified", &flat);

        let (separated, segmented) = self.separator.separate(flat);
        if segmented {
            self.save_stage(&stem, "3_separated", &separated);
        }
        let opaque = composite_on_white(separated);

        let (enhanced, path) = self.enhancer.enhance(opaque, hint, level);
        let enhanced = composite_on_white(enhanced);
        self.save_stage(&stem, "4_enhanced", &enhanced);

        let optimized = optimize(enhanced, level, self.config.dpi);
        info!(
            width = optimized.image.width(),
            height = optimized.image.height(),
            level = %level,
            "Document normalized"
        );

        ProcessedDocument {
            image: optimized.image,
            hint,
            detection,
            rectified,
            segmented,
            enhancement: path,
            jpeg_quality: optimized.jpeg_quality,
            dpi: optimized.dpi,
        }
    }

    /// Write an intermediate image to the debug directory, if one is set.
    fn save_stage(&self, stem: &str, stage: &str, image: &DynamicImage) {
        let Some(dir) = &self.config.debug_dir else {
            return;
        };
        let path = dir.join(format!("{stem}_{stage}.png"));
        let result = std::fs::create_dir_all(dir)
            .map_err(BlattwerkError::from)
            .and_then(|()| ImageProcessor::from_dynamic(image.clone()).save(&path));
        if let Err(err) = result {
            warn!(path = %path.display(), error = %err, "Could not write debug image");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::detect::DetectionMethod;
    use crate::scan::separate::{BackgroundKeySegmenter, NoSegmenter};
    use image::{GrayImage, Luma, Rgb, RgbImage};
    use imageproc::drawing::draw_polygon_mut;
    use imageproc::point::Point;

    fn assert_send_sync<T: Send + Sync>() {}

    /// Green table with a white sheet drawn slightly skewed.
    fn desk_photo() -> DynamicImage {
        let mut img = RgbImage::from_pixel(400, 500, Rgb([40, 90, 50]));
        let sheet = [Point::new(60, 50), Point::new(330, 70), Point::new(345, 450), Point::new(50, 430)];
        draw_polygon_mut(&mut img, &sheet, Rgb([245, 245, 240]));
        DynamicImage::ImageRgb8(img)
    }

    fn config(level: OptimizationLevel) -> PipelineConfig {
        PipelineConfig::default().with_level(level)
    }

    #[test]
    fn pipeline_types_are_thread_safe() {
        assert_send_sync::<DocumentPipeline>();
        assert_send_sync::<ProcessedDocument>();
    }

    #[test]
    fn invalid_config_is_rejected() {
        let bad = PipelineConfig {
            dpi: 0,
            ..PipelineConfig::default()
        };
        assert!(matches!(DocumentPipeline::new(bad), Err(BlattwerkError::Config(_))));
    }

    #[test]
    fn desk_photo_is_cropped_to_the_sheet() {
        let pipeline = DocumentPipeline::new(config(OptimizationLevel::None)).unwrap();
        let doc = pipeline.process_image(desk_photo(), "scan.jpg", OptimizationLevel::None);

        assert!(doc.rectified);
        assert!(!doc.segmented);
        assert_ne!(doc.detection.method, DetectionMethod::Fallback);
        assert!(doc.image.width() < 400 && doc.image.height() < 500);
        assert_eq!(doc.jpeg_quality, 100);
        assert_eq!(doc.dpi, 300);
    }

    #[test]
    fn strong_level_outputs_small_gray_image() {
        let pipeline = DocumentPipeline::new(config(OptimizationLevel::Strong)).unwrap();
        let doc = pipeline.process_image(desk_photo(), "scan.jpg", OptimizationLevel::Strong);
        assert_eq!(doc.image.color().channel_count(), 1);
        assert_eq!(doc.jpeg_quality, 65);
        assert_eq!(doc.dpi, 200);
        assert!(!doc.to_jpeg_bytes().unwrap().is_empty());
    }

    #[test]
    fn receipt_name_selects_receipt_path() {
        let pipeline = DocumentPipeline::new(config(OptimizationLevel::Medium)).unwrap();
        let doc = pipeline.process_image(desk_photo(), "kvitung_01.jpg", OptimizationLevel::Medium);
        assert!(doc.hint.receipt_like);
        assert_eq!(doc.enhancement, EnhancementPath::Receipt);
    }

    #[test]
    fn failing_segmenter_is_absorbed() {
        let pipeline = DocumentPipeline::with_segmenter(config(OptimizationLevel::Light), Arc::new(NoSegmenter)).unwrap();
        let doc = pipeline.process_image(desk_photo(), "scan.jpg", OptimizationLevel::Light);
        assert!(!doc.segmented);
        assert_eq!(doc.image.color().channel_count(), 3);
    }

    #[test]
    fn working_segmenter_yields_opaque_output() {
        let pipeline = DocumentPipeline::with_segmenter(
            config(OptimizationLevel::Light),
            Arc::new(BackgroundKeySegmenter::default()),
        )
        .unwrap();
        let doc = pipeline.process_image(desk_photo(), "scan.jpg", OptimizationLevel::Light);
        assert!(doc.segmented);
        assert!(!doc.image.color().has_alpha());
    }

    #[test]
    fn segmentation_can_be_switched_off() {
        let cfg = PipelineConfig {
            use_segmentation: false,
            ..config(OptimizationLevel::Light)
        };
        let pipeline = DocumentPipeline::with_segmenter(cfg, Arc::new(BackgroundKeySegmenter::default())).unwrap();
        let doc = pipeline.process_image(desk_photo(), "scan.jpg", OptimizationLevel::Light);
        assert!(!doc.segmented);
    }

    #[test]
    fn undecodable_bytes_are_unreadable_input() {
        let pipeline = DocumentPipeline::new(PipelineConfig::default()).unwrap();
        let err = pipeline.process_bytes(b"not an image", "broken.jpg").unwrap_err();
        assert!(matches!(&err, BlattwerkError::UnreadableInput { source_name, .. } if source_name == "broken.jpg"));
        assert!(err.is_fatal());
    }

    #[test]
    fn batch_continues_past_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = dir.path().join("page.png");
        DynamicImage::ImageLuma8(GrayImage::from_pixel(60, 40, Luma([200u8])))
            .save(&good)
            .unwrap();
        let missing = dir.path().join("missing.png");

        let pipeline = DocumentPipeline::new(PipelineConfig::default()).unwrap();
        let results = pipeline.process_batch(&[missing.clone(), good.clone()]);

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, missing);
        assert!(results[0].1.is_err());
        assert!(results[1].1.is_ok());
    }

    #[test]
    fn debug_stages_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig {
            debug_dir: Some(dir.path().join("stages")),
            ..config(OptimizationLevel::Light)
        };
        let pipeline = DocumentPipeline::new(cfg).unwrap();
        pipeline.process_image(desk_photo(), "photo.jpg", OptimizationLevel::Light);

        for stage in ["1_original", "2_rectified", "4_enhanced"] {
            let path = dir.path().join("stages").join(format!("photo_{stage}.png"));
            assert!(path.exists(), "missing {}", path.display());
        }
    }

    #[test]
    fn processed_document_saves_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");
        let pipeline = DocumentPipeline::new(PipelineConfig::default()).unwrap();
        let doc = pipeline.process_image(desk_photo(), "scan.jpg", OptimizationLevel::Medium);
        doc.save_jpeg(&path).unwrap();
        let reloaded = image::open(&path).unwrap();
        assert_eq!((reloaded.width(), reloaded.height()), (doc.image.width(), doc.image.height()));
    }
}
