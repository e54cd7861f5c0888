// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Photo-to-invoice driver: normalize at full quality, recognize, extract.

use std::path::Path;
use std::sync::Arc;

use blattwerk_core::error::Result;
use blattwerk_core::types::{InvoiceRecord, OcrRecord};
use blattwerk_core::{OptimizationLevel, PipelineConfig};
use blattwerk_document::image::processor::ImageProcessor;
use blattwerk_document::pipeline::DocumentPipeline;
use blattwerk_document::scan::ocr::OcrEngine;
use image::DynamicImage;
use tracing::{debug, info, instrument};

use crate::extract::Extractor;

/// Reads invoice fields from document photos.
///
/// Photos always go through the pipeline at [`OptimizationLevel::None`] so
/// the OCR engine sees a full-resolution, full-quality page regardless of the
/// configured export level.
pub struct InvoiceReader {
    pipeline: DocumentPipeline,
    engine: Arc<dyn OcrEngine>,
    language: String,
}

impl InvoiceReader {
    /// Reader using `config` for normalization and its `ocr_language`.
    pub fn new(config: PipelineConfig, engine: Arc<dyn OcrEngine>) -> Result<Self> {
        let language = config.ocr_language.clone();
        Ok(Self::with_pipeline(DocumentPipeline::new(config)?, engine, language))
    }

    pub fn with_pipeline(pipeline: DocumentPipeline, engine: Arc<dyn OcrEngine>, language: impl Into<String>) -> Self {
        Self {
            pipeline,
            engine,
            language: language.into(),
        }
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Normalize a decoded photo and run OCR on the result.
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn recognize(&self, image: DynamicImage, file_name: &str) -> Result<OcrRecord> {
        let document = self.pipeline.process_image(image, file_name, OptimizationLevel::None);
        debug!(
            width = document.image.width(),
            height = document.image.height(),
            method = ?document.detection.method,
            "Page normalized for OCR"
        );
        self.engine.recognize(&document.image, &self.language)
    }

    /// Recognized text of an image file.
    pub fn recognize_text(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let image = ImageProcessor::open(path)?.into_dynamic();
        Ok(self.recognize(image, &file_name(path))?.text)
    }

    /// Invoice fields from a decoded photo.
    pub fn read_image(&self, image: DynamicImage, file_name: &str) -> Result<InvoiceRecord> {
        let ocr = self.recognize(image, file_name)?;
        Ok(Extractor::extract(&ocr))
    }

    /// Invoice fields from an image file.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn read_path(&self, path: impl AsRef<Path>) -> Result<InvoiceRecord> {
        let path = path.as_ref();
        let image = ImageProcessor::open(path)?.into_dynamic();
        let record = self.read_image(image, &file_name(path))?;
        info!(
            invoice_number = record.invoice_number.as_deref().unwrap_or(""),
            line_items = record.line_items.len(),
            "Invoice read"
        );
        Ok(record)
    }

    /// Read a multi-page invoice, one image file per page.
    ///
    /// The first page is the base record; later pages only fill fields it is
    /// missing and append their line items. Any page error aborts the read.
    pub fn read_pages<P: AsRef<Path>>(&self, pages: &[P]) -> Result<InvoiceRecord> {
        info!(pages = pages.len(), "Reading multi-page invoice");
        let mut merged = InvoiceRecord::default();
        for page in pages {
            merged.merge_page(self.read_path(page)?);
        }
        Ok(merged)
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
