//! Semantic segmentation: RGB frame → per-class score maps → label map.

use std::path::Path;

use image::{ImageBuffer, Luma, RgbImage};
use ndarray::{Array3, ArrayView2, Axis, Ix4};
use ort::session::Session;
use ort::value::Tensor;

use crate::normalize::RgbNormalization;
use crate::onnx::{extract_f32, load_session, OnnxRuntimeConfig};
use crate::{PipelineError, Result};

/// Per-pixel class index. Class 0 is background.
pub type LabelMap = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Class score maps `[C, H, W]` produced by a segmenter.
#[derive(Debug, Clone)]
pub struct SemanticScores {
    scores: Array3<f32>,
}

impl SemanticScores {
    pub fn new(scores: Array3<f32>) -> Result<Self> {
        let (c, h, w) = scores.dim();
        if c == 0 || h == 0 || w == 0 {
            return Err(PipelineError::ModelOutput(format!(
                "empty segmentation scores of shape [{c}, {h}, {w}]"
            )));
        }
        if c > u16::MAX as usize {
            return Err(PipelineError::ModelOutput(format!("{c} classes exceed label range")));
        }
        Ok(Self { scores })
    }

    pub fn num_classes(&self) -> usize {
        self.scores.dim().0
    }

    /// `(width, height)` of the score maps.
    pub fn dimensions(&self) -> (u32, u32) {
        let (_, h, w) = self.scores.dim();
        (w as u32, h as u32)
    }

    /// Score map of one class as `[H, W]`.
    pub fn class_scores(&self, class_id: usize) -> Option<ArrayView2<'_, f32>> {
        (class_id < self.num_classes()).then(|| self.scores.index_axis(Axis(0), class_id))
    }

    /// Argmax over classes for every pixel. Ties resolve to the lower index.
    pub fn label_map(&self) -> LabelMap {
        let (c, h, w) = self.scores.dim();
        let mut labels = LabelMap::new(w as u32, h as u32);
        for y in 0..h {
            for x in 0..w {
                let mut best = 0usize;
                let mut best_score = self.scores[[0, y, x]];
                for k in 1..c {
                    let s = self.scores[[k, y, x]];
                    if s > best_score {
                        best_score = s;
                        best = k;
                    }
                }
                labels.put_pixel(x as u32, y as u32, Luma([best as u16]));
            }
        }
        labels
    }
}

/// Maps an RGB frame to class scores.
pub trait Segmenter {
    fn segment(&mut self, rgb: &RgbImage) -> Result<SemanticScores>;
}

/// Tensor names of the segmentation graph.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct SegmenterIo {
    /// `[1, 3, H, W]` normalized RGB.
    pub input: String,
    /// `[1, C, H, W]` class scores.
    pub output: String,
}

impl Default for SegmenterIo {
    fn default() -> Self {
        Self {
            input: "rgb".to_string(),
            output: "semantic".to_string(),
        }
    }
}

/// Segmentation network running on ONNX Runtime.
pub struct OnnxSegmenter {
    session: Session,
    io: SegmenterIo,
    normalization: RgbNormalization,
}

impl OnnxSegmenter {
    pub fn load(
        model: &Path,
        io: SegmenterIo,
        normalization: RgbNormalization,
        runtime: &OnnxRuntimeConfig,
    ) -> Result<Self> {
        Ok(Self {
            session: load_session(model, runtime)?,
            io,
            normalization,
        })
    }
}

impl Segmenter for OnnxSegmenter {
    fn segment(&mut self, rgb: &RgbImage) -> Result<SemanticScores> {
        let input = self.normalization.tensor_chw(rgb).insert_axis(Axis(0));
        let tensor = Tensor::from_array(input).map_err(PipelineError::inference)?;
        let outputs = self
            .session
            .run(ort::inputs![self.io.input.as_str() => tensor])
            .map_err(PipelineError::inference)?;
        let scores = extract_f32(&outputs, &self.io.output)?.into_dimensionality::<Ix4>()?;
        if scores.dim().0 != 1 {
            return Err(PipelineError::ModelOutput(format!(
                "segmenter batch size {} (expected 1)",
                scores.dim().0
            )));
        }

        let scores = SemanticScores::new(scores.index_axis_move(Axis(0), 0))?;
        if scores.dimensions() != rgb.dimensions() {
            return Err(PipelineError::ModelOutput(format!(
                "segmentation size {:?} does not match frame size {:?}",
                scores.dimensions(),
                rgb.dimensions()
            )));
        }
        tracing::debug!(classes = scores.num_classes(), "segmentation done");
        Ok(scores)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_map_takes_argmax_with_low_index_ties() {
        let mut scores = Array3::<f32>::zeros((3, 2, 2));
        scores[[1, 0, 0]] = 2.0;
        scores[[2, 0, 1]] = 1.0;
        scores[[1, 0, 1]] = 0.5;
        scores[[1, 1, 1]] = 3.0;
        scores[[2, 1, 1]] = 3.0;
        let s = SemanticScores::new(scores).unwrap();

        let labels = s.label_map();
        assert_eq!(labels.get_pixel(0, 0)[0], 1);
        assert_eq!(labels.get_pixel(1, 0)[0], 2);
        assert_eq!(labels.get_pixel(0, 1)[0], 0);
        assert_eq!(labels.get_pixel(1, 1)[0], 1);
    }

    #[test]
    fn empty_scores_are_rejected() {
        assert!(SemanticScores::new(Array3::zeros((0, 4, 4))).is_err());
        assert!(SemanticScores::new(Array3::zeros((3, 0, 4))).is_err());
    }

    #[test]
    fn class_scores_checks_range() {
        let s = SemanticScores::new(Array3::zeros((2, 3, 4))).unwrap();
        assert_eq!(s.dimensions(), (4, 3));
        assert_eq!(s.class_scores(1).unwrap().dim(), (3, 4));
        assert!(s.class_scores(2).is_none());
    }
}
