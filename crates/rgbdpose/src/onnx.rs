//! Shared ONNX Runtime plumbing for the three networks.

use std::path::Path;

use ndarray::{Array2, ArrayD};
use ort::session::builder::GraphOptimizationLevel;
use ort::session::{Session, SessionOutputs};

use crate::{PipelineError, Result};

/// Runtime options applied to every network session.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct OnnxRuntimeConfig {
    /// Intra-op thread count; `0` lets the runtime decide.
    pub intra_threads: usize,
    /// Enable all graph optimizations.
    pub optimize: bool,
}

impl Default for OnnxRuntimeConfig {
    fn default() -> Self {
        Self {
            intra_threads: 0,
            optimize: true,
        }
    }
}

/// Load a model file into a session.
pub(crate) fn load_session(path: &Path, cfg: &OnnxRuntimeConfig) -> Result<Session> {
    let level = if cfg.optimize {
        GraphOptimizationLevel::Level3
    } else {
        GraphOptimizationLevel::Disable
    };
    let mut builder = Session::builder()
        .map_err(PipelineError::inference)?
        .with_optimization_level(level)
        .map_err(PipelineError::inference)?;
    if cfg.intra_threads > 0 {
        builder = builder
            .with_intra_threads(cfg.intra_threads)
            .map_err(PipelineError::inference)?;
    }
    let session = builder.commit_from_file(path).map_err(|e| {
        PipelineError::Inference(format!("failed to load {}: {e}", path.display()))
    })?;
    tracing::info!(model = %path.display(), "loaded ONNX model");
    Ok(session)
}

/// Copy a named f32 output out of the session's borrowed buffers.
pub(crate) fn extract_f32(outputs: &SessionOutputs, name: &str) -> Result<ArrayD<f32>> {
    let value = outputs
        .get(name)
        .ok_or_else(|| PipelineError::ModelOutput(format!("missing output '{name}'")))?;
    let view = value
        .try_extract_array::<f32>()
        .map_err(|e| PipelineError::ModelOutput(format!("output '{name}': {e}")))?;
    Ok(view.to_owned())
}

/// Flatten an output into rows of `cols` values, e.g. `[1, N, 4]` → `[N, 4]`.
pub(crate) fn output_rows(name: &str, output: &ArrayD<f32>, cols: usize) -> Result<Array2<f32>> {
    let len = output.len();
    if cols == 0 || len == 0 || len % cols != 0 {
        return Err(PipelineError::ModelOutput(format!(
            "output '{name}' of shape {:?} cannot be read as rows of {cols}",
            output.shape()
        )));
    }
    let values: Vec<f32> = output.iter().copied().collect();
    Ok(Array2::from_shape_vec((len / cols, cols), values)?)
}
