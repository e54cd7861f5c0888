// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Unified error types for Blattwerk.

use thiserror::Error;

/// Top-level error type for all Blattwerk operations.
#[derive(Debug, Error)]
pub enum BlattwerkError {
    // -- Input --
    #[error("unreadable input {source_name}: {reason}")]
    UnreadableInput { source_name: String, reason: String },

    // -- Processing (absorbed by the pipeline) --
    #[error("image processing failed: {0}")]
    ImageError(String),

    #[error("segmentation model failed: {0}")]
    Segmentation(String),

    #[error("no segmentation model available")]
    SegmentationUnavailable,

    // -- Collaborators --
    #[error("OCR failed: {0}")]
    OcrError(String),

    // -- Output --
    #[error("cannot write output {path}: {reason}")]
    OutputWrite { path: String, reason: String },

    #[error("export failed: {0}")]
    Export(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl BlattwerkError {
    /// Whether this error must be surfaced to the caller.
    ///
    /// Processing and segmentation failures are absorbed by the pipeline
    /// (the previous stage's image is kept); everything else is a hard error
    /// for the document being processed.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            BlattwerkError::ImageError(_)
                | BlattwerkError::Segmentation(_)
                | BlattwerkError::SegmentationUnavailable
        )
    }
}

/// Alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, BlattwerkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_errors_are_absorbed() {
        assert!(!BlattwerkError::ImageError("x".into()).is_fatal());
        assert!(!BlattwerkError::Segmentation("x".into()).is_fatal());
        assert!(!BlattwerkError::SegmentationUnavailable.is_fatal());
    }

    #[test]
    fn input_and_output_errors_are_fatal() {
        let unreadable = BlattwerkError::UnreadableInput {
            source_name: "a.jpg".into(),
            reason: "truncated".into(),
        };
        assert!(unreadable.is_fatal());
        assert!(unreadable.to_string().contains("a.jpg"));

        let write = BlattwerkError::OutputWrite {
            path: "/nope/out.jpg".into(),
            reason: "permission denied".into(),
        };
        assert!(write.is_fatal());
    }
}
