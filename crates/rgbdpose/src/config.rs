//! Pipeline configuration.
//!
//! Every field has a default, so a JSON file only needs the values it
//! changes:
//!
//! ```json
//! { "target": "drill", "sampler": { "num_points": 1000 } }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::estimator::EstimatorIo;
use crate::mask::MaskConfig;
use crate::normalize::RgbNormalization;
use crate::onnx::OnnxRuntimeConfig;
use crate::overlay::OverlayConfig;
use crate::refiner::RefinerIo;
use crate::sampler::SamplerConfig;
use crate::segment::SegmenterIo;
use crate::{PipelineError, Result};

/// Top-level configuration for [`crate::PosePipeline`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Object to estimate the pose of, matched by substring against the
    /// class names.
    pub target: String,
    /// Refinement iterations after the initial estimate.
    pub refine_iterations: usize,
    pub mask: MaskConfig,
    pub sampler: SamplerConfig,
    pub overlay: OverlayConfig,
    pub normalization: RgbNormalization,
    pub segmenter_io: SegmenterIo,
    pub estimator_io: EstimatorIo,
    pub refiner_io: RefinerIo,
    pub runtime: OnnxRuntimeConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            target: "mug".to_string(),
            refine_iterations: 4,
            mask: MaskConfig::default(),
            sampler: SamplerConfig::default(),
            overlay: OverlayConfig::default(),
            normalization: RgbNormalization::default(),
            segmenter_io: SegmenterIo::default(),
            estimator_io: EstimatorIo::default(),
            refiner_io: RefinerIo::default(),
            runtime: OnnxRuntimeConfig::default(),
        }
    }
}

impl PipelineConfig {
    /// Load and validate a JSON configuration file.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let cfg: Self = serde_json::from_str(&data)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        if self.target.trim().is_empty() {
            return Err(PipelineError::Config("target must not be empty".to_string()));
        }
        if self.sampler.num_points == 0 {
            return Err(PipelineError::Config("sampler.num_points must be > 0".to_string()));
        }
        if self.mask.border_step == 0 {
            return Err(PipelineError::Config("mask.border_step must be > 0".to_string()));
        }
        let clip = self.overlay.clipping_distance_m;
        if !clip.is_finite() || clip <= 0.0 {
            return Err(PipelineError::Config(format!(
                "overlay.clipping_distance_m must be finite and > 0, got {clip}"
            )));
        }
        if !self.overlay.depth_alpha.is_finite() || !self.overlay.mask_gain.is_finite() {
            return Err(PipelineError::Config(
                "overlay colormap scales must be finite".to_string(),
            ));
        }
        self.normalization.validate()
    }
}
