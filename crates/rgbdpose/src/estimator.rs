//! Dense per-point pose estimation and best-hypothesis selection.
//!
//! The estimator network predicts, for every sampled point, a rotation, a
//! translation offset from that point and a confidence. The pose is taken
//! from the most confident point.

use std::path::Path;

use nalgebra::{Isometry3, Vector3};
use ndarray::{Array1, Array2, Array3, Axis, Ix3};
use ort::session::Session;
use ort::value::Tensor;
use serde::{Deserialize, Serialize};

use crate::geometry::{isometry, unit_quaternion_from_wxyz};
use crate::onnx::{extract_f32, load_session, output_rows, OnnxRuntimeConfig};
use crate::sampler::PointSample;
use crate::{PipelineError, Result};

/// Raw per-point network predictions.
#[derive(Debug, Clone)]
pub struct PoseHypotheses {
    /// `[N, 4]` quaternions `(w, x, y, z)`, not necessarily normalised.
    pub rotations: Array2<f32>,
    /// `[N, 3]` translation offsets from each cloud point.
    pub translations: Array2<f32>,
    /// `[N]` confidences.
    pub confidences: Array1<f32>,
    /// `[1, D, N]` fused features, consumed by the refiner.
    pub embedding: Array3<f32>,
}

/// Selected pose in the camera frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoseEstimate {
    pub pose: Isometry3<f64>,
    pub confidence: f32,
    /// Cloud point whose hypothesis won.
    pub point_index: usize,
}

/// Predicts per-point pose hypotheses for one object sample.
pub trait PoseEstimator {
    /// `object_index` is the zero-based object id (`class_id - 1`).
    fn estimate(&mut self, sample: &PointSample, object_index: usize) -> Result<PoseHypotheses>;
}

/// Pick the most confident hypothesis (first on ties).
pub fn select_best(hypotheses: &PoseHypotheses, cloud: &Array2<f32>) -> Result<PoseEstimate> {
    let n = cloud.nrows();
    if n == 0 || cloud.ncols() != 3 {
        return Err(PipelineError::ModelOutput(format!(
            "point cloud of shape {:?} has no points",
            cloud.dim()
        )));
    }
    if hypotheses.rotations.dim() != (n, 4)
        || hypotheses.translations.dim() != (n, 3)
        || hypotheses.confidences.len() != n
    {
        return Err(PipelineError::ModelOutput(format!(
            "hypotheses (r {:?}, t {:?}, c {}) do not match {n} points",
            hypotheses.rotations.dim(),
            hypotheses.translations.dim(),
            hypotheses.confidences.len()
        )));
    }

    let mut best = 0usize;
    for (i, &c) in hypotheses.confidences.iter().enumerate() {
        if c > hypotheses.confidences[best] {
            best = i;
        }
    }

    let r = hypotheses.rotations.row(best);
    let rotation = unit_quaternion_from_wxyz([r[0] as f64, r[1] as f64, r[2] as f64, r[3] as f64])
        .ok_or_else(|| {
            PipelineError::ModelOutput(format!("degenerate rotation at point {best}"))
        })?;
    let p = cloud.row(best);
    let dt = hypotheses.translations.row(best);
    let translation = Vector3::new(
        (p[0] + dt[0]) as f64,
        (p[1] + dt[1]) as f64,
        (p[2] + dt[2]) as f64,
    );

    Ok(PoseEstimate {
        pose: isometry(rotation, translation),
        confidence: hypotheses.confidences[best],
        point_index: best,
    })
}

/// Tensor names of the estimator graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EstimatorIo {
    pub img: String,
    pub points: String,
    pub choose: String,
    pub obj: String,
    pub pred_r: String,
    pub pred_t: String,
    pub pred_c: String,
    pub emb: String,
}

impl Default for EstimatorIo {
    fn default() -> Self {
        Self {
            img: "img".to_string(),
            points: "points".to_string(),
            choose: "choose".to_string(),
            obj: "obj".to_string(),
            pred_r: "pred_r".to_string(),
            pred_t: "pred_t".to_string(),
            pred_c: "pred_c".to_string(),
            emb: "emb".to_string(),
        }
    }
}

/// Pose estimator network running on ONNX Runtime.
pub struct OnnxPoseEstimator {
    session: Session,
    io: EstimatorIo,
}

impl OnnxPoseEstimator {
    pub fn load(model: &Path, io: EstimatorIo, runtime: &OnnxRuntimeConfig) -> Result<Self> {
        Ok(Self {
            session: load_session(model, runtime)?,
            io,
        })
    }
}

impl PoseEstimator for OnnxPoseEstimator {
    fn estimate(&mut self, sample: &PointSample, object_index: usize) -> Result<PoseHypotheses> {
        let n = sample.len();
        let img = Tensor::from_array(sample.rgb_crop.clone().insert_axis(Axis(0)))
            .map_err(PipelineError::inference)?;
        let points = Tensor::from_array(sample.cloud.clone().insert_axis(Axis(0)))
            .map_err(PipelineError::inference)?;
        let choose = Tensor::from_array(Array3::from_shape_vec((1, 1, n), sample.choose.clone())?)
            .map_err(PipelineError::inference)?;
        let obj = Tensor::from_array(Array2::from_elem((1, 1), object_index as i64))
            .map_err(PipelineError::inference)?;

        let outputs = self
            .session
            .run(ort::inputs![
                self.io.img.as_str() => img,
                self.io.points.as_str() => points,
                self.io.choose.as_str() => choose,
                self.io.obj.as_str() => obj
            ])
            .map_err(PipelineError::inference)?;

        let rotations = output_rows(&self.io.pred_r, &extract_f32(&outputs, &self.io.pred_r)?, 4)?;
        let translations =
            output_rows(&self.io.pred_t, &extract_f32(&outputs, &self.io.pred_t)?, 3)?;
        let confidences = Array1::from_iter(extract_f32(&outputs, &self.io.pred_c)?.iter().copied());
        let embedding = extract_f32(&outputs, &self.io.emb)?.into_dimensionality::<Ix3>()?;
        if embedding.dim().2 != n {
            return Err(PipelineError::ModelOutput(format!(
                "embedding {:?} does not cover {n} points",
                embedding.dim()
            )));
        }

        tracing::debug!(points = n, object_index, "pose hypotheses predicted");
        Ok(PoseHypotheses {
            rotations,
            translations,
            confidences,
            embedding,
        })
    }
}
