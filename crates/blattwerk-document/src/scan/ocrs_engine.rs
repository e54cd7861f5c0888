// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Neural OCR backed by the `ocrs` crate, with models executed by `rten`.
//
// Only compiled with the `ocr` feature. The engine needs two model files,
// `text-detection.rten` and `text-recognition.rten`, which `ocrs-cli`
// downloads into `$XDG_CACHE_HOME/ocrs` (usually `~/.cache/ocrs`) on first
// run. Build `ocrs` and `rten` in release mode; debug builds are very slow.

use std::path::{Path, PathBuf};

use blattwerk_core::error::BlattwerkError;
use blattwerk_core::types::{BoundingBox, OcrRecord, OcrWord};
use image::DynamicImage;
use ocrs::{ImageSource, OcrEngine as NeuralEngine, OcrEngineParams, TextItem};
use rten::Model;
use tracing::{debug, info, instrument};

use super::ocr::OcrEngine;

const DETECTION_MODEL_FILENAME: &str = "text-detection.rten";
const RECOGNITION_MODEL_FILENAME: &str = "text-recognition.rten";

/// `$XDG_CACHE_HOME/ocrs`, else `~/.cache/ocrs`, else `./ocrs-models`.
pub fn model_directory() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("ocrs")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("ocrs")
    } else {
        PathBuf::from("ocrs-models")
    }
}

/// Locations of the two model files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OcrModelPaths {
    pub detection: PathBuf,
    pub recognition: PathBuf,
}

impl Default for OcrModelPaths {
    fn default() -> Self {
        Self::from_dir(model_directory())
    }
}

impl OcrModelPaths {
    /// Both models under `dir` with their standard file names.
    pub fn from_dir(dir: impl AsRef<Path>) -> Self {
        let dir = dir.as_ref();
        Self {
            detection: dir.join(DETECTION_MODEL_FILENAME),
            recognition: dir.join(RECOGNITION_MODEL_FILENAME),
        }
    }

    /// True when both files exist.
    pub fn available(&self) -> bool {
        self.detection.exists() && self.recognition.exists()
    }

    fn load(path: &Path, role: &str) -> Result<Model, BlattwerkError> {
        if !path.exists() {
            return Err(BlattwerkError::OcrError(format!(
                "{role} model not found at {}; run `ocrs-cli` once to download it",
                path.display()
            )));
        }
        Model::load_file(path).map_err(|err| {
            BlattwerkError::OcrError(format!("failed to load {role} model from {}: {err}", path.display()))
        })
    }
}

/// [`OcrEngine`] implementation running the `ocrs` detection and recognition
/// networks. Reports one [`OcrWord`] per recognised word with its bounding
/// box; `ocrs` gives no confidence scores.
pub struct OcrsEngine {
    engine: NeuralEngine,
}

impl OcrsEngine {
    /// Load both models. This is the expensive step; reuse the engine.
    #[instrument(skip_all, fields(
        detection = %paths.detection.display(),
        recognition = %paths.recognition.display(),
    ))]
    pub fn new(paths: &OcrModelPaths) -> Result<Self, BlattwerkError> {
        let detection_model = OcrModelPaths::load(&paths.detection, "detection")?;
        let recognition_model = OcrModelPaths::load(&paths.recognition, "recognition")?;

        let engine = NeuralEngine::new(OcrEngineParams {
            detection_model: Some(detection_model),
            recognition_model: Some(recognition_model),
            ..Default::default()
        })
        .map_err(|err| BlattwerkError::OcrError(format!("failed to initialise OCR engine: {err}")))?;

        info!("OCR models loaded");
        Ok(Self { engine })
    }

    /// Engine using models from the default cache directory.
    pub fn with_defaults() -> Result<Self, BlattwerkError> {
        Self::new(&OcrModelPaths::default())
    }
}

impl OcrEngine for OcrsEngine {
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    fn recognize(&self, image: &DynamicImage, language: &str) -> Result<OcrRecord, BlattwerkError> {
        // The bundled recognition model covers Latin script only.
        debug!(language, "Starting text recognition");

        let rgb = image.to_rgb8();
        let source = ImageSource::from_bytes(rgb.as_raw(), rgb.dimensions()).map_err(|err| {
            BlattwerkError::OcrError(format!("unusable image {:?}: {err}", rgb.dimensions()))
        })?;
        let input = self
            .engine
            .prepare_input(source)
            .map_err(|err| BlattwerkError::OcrError(format!("OCR preprocessing failed: {err}")))?;

        let word_rects = self
            .engine
            .detect_words(&input)
            .map_err(|err| BlattwerkError::OcrError(format!("word detection failed: {err}")))?;
        let line_rects = self.engine.find_text_lines(&input, &word_rects);
        let lines = self
            .engine
            .recognize_text(&input, &line_rects)
            .map_err(|err| BlattwerkError::OcrError(format!("line recognition failed: {err}")))?;

        let mut text_lines = Vec::with_capacity(lines.len());
        let mut words = Vec::new();
        for line in lines.iter().flatten() {
            let text = line.to_string();
            if text.trim().is_empty() {
                continue;
            }
            for word in line.words() {
                let rect = word.bounding_rect();
                words.push(OcrWord {
                    text: word.to_string(),
                    bbox: BoundingBox {
                        left: rect.left(),
                        top: rect.top(),
                        width: rect.width().max(0) as u32,
                        height: rect.height().max(0) as u32,
                    },
                    confidence: None,
                });
            }
            text_lines.push(text);
        }

        info!(lines = text_lines.len(), words = words.len(), "Text recognised");
        Ok(OcrRecord {
            text: text_lines.join("\n"),
            words,
        })
    }
}
