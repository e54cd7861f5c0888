// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Pipeline configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{BlattwerkError, Result};

/// Output size optimization level, 0 (best quality) to 3 (smallest output).
///
/// Serialized as its integer value so configuration files read `"optimization_level": 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum OptimizationLevel {
    /// Full resolution, colour, JPEG quality 100.
    None,
    /// 80% scale, colour.
    Light,
    /// 60% scale, grayscale.
    #[default]
    Medium,
    /// 40% scale, grayscale.
    Strong,
}

impl OptimizationLevel {
    pub fn as_u8(self) -> u8 {
        match self {
            OptimizationLevel::None => 0,
            OptimizationLevel::Light => 1,
            OptimizationLevel::Medium => 2,
            OptimizationLevel::Strong => 3,
        }
    }
}

impl TryFrom<u8> for OptimizationLevel {
    type Error = String;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        match value {
            0 => Ok(OptimizationLevel::None),
            1 => Ok(OptimizationLevel::Light),
            2 => Ok(OptimizationLevel::Medium),
            3 => Ok(OptimizationLevel::Strong),
            other => Err(format!("optimization level must be 0-3, got {other}")),
        }
    }
}

impl From<OptimizationLevel> for u8 {
    fn from(level: OptimizationLevel) -> Self {
        level.as_u8()
    }
}

impl std::fmt::Display for OptimizationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_u8())
    }
}

/// Settings for the document normalization pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Size optimization applied to the final raster.
    pub optimization_level: OptimizationLevel,
    /// Use the segmentation model for background removal when one is supplied.
    pub use_segmentation: bool,
    /// Working width for document detection; wider photos are downscaled.
    pub detection_width: u32,
    /// Working width handed to the segmentation model.
    pub segmentation_width: u32,
    /// Requested export resolution before the optimization level's cap.
    pub dpi: u32,
    /// Language code passed to the OCR engine.
    pub ocr_language: String,
    /// When set, intermediate stage images are written here.
    pub debug_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            optimization_level: OptimizationLevel::Medium,
            use_segmentation: true,
            detection_width: 2000,
            segmentation_width: 1500,
            dpi: 300,
            ocr_language: "est".to_string(),
            debug_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&data)
    }

    /// Persist the configuration as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path.as_ref(), json).map_err(|err| BlattwerkError::OutputWrite {
            path: path.as_ref().display().to_string(),
            reason: err.to_string(),
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.detection_width == 0 {
            return Err(BlattwerkError::Config("detection_width must be positive".into()));
        }
        if self.segmentation_width == 0 {
            return Err(BlattwerkError::Config("segmentation_width must be positive".into()));
        }
        if self.dpi == 0 {
            return Err(BlattwerkError::Config("dpi must be positive".into()));
        }
        Ok(())
    }

    /// Copy of this configuration with a different optimization level.
    pub fn with_level(&self, level: OptimizationLevel) -> Self {
        Self {
            optimization_level: level,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_values() {
        let config = PipelineConfig::default();
        assert_eq!(config.optimization_level, OptimizationLevel::Medium);
        assert_eq!(config.detection_width, 2000);
        assert_eq!(config.segmentation_width, 1500);
        assert_eq!(config.dpi, 300);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn level_serializes_as_integer() {
        let json = serde_json::to_string(&PipelineConfig::default()).unwrap();
        assert!(json.contains("\"optimization_level\":2"), "{json}");
    }

    #[test]
    fn partial_json_uses_defaults() {
        let config = PipelineConfig::from_json(r#"{"optimization_level": 3}"#).unwrap();
        assert_eq!(config.optimization_level, OptimizationLevel::Strong);
        assert_eq!(config.ocr_language, "est");
    }

    #[test]
    fn out_of_range_level_is_rejected() {
        assert!(PipelineConfig::from_json(r#"{"optimization_level": 4}"#).is_err());
        assert!(OptimizationLevel::try_from(9).is_err());
    }

    #[test]
    fn zero_width_is_rejected() {
        let err = PipelineConfig::from_json(r#"{"detection_width": 0}"#).unwrap_err();
        assert!(matches!(err, BlattwerkError::Config(_)));
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("blattwerk.json");
        let config = PipelineConfig {
            optimization_level: OptimizationLevel::Light,
            ocr_language: "eng".into(),
            ..PipelineConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(PipelineConfig::load(&path).unwrap(), config);
    }
}
