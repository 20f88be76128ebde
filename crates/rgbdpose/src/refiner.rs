//! Iterative pose refinement.

use std::path::Path;

use nalgebra::{Isometry3, Vector3};
use ndarray::{Array2, Array3, Axis};
use ort::session::Session;
use ort::value::Tensor;
use serde::{Deserialize, Serialize};

use crate::geometry::{isometry, to_object_frame, unit_quaternion_from_wxyz};
use crate::onnx::{extract_f32, load_session, output_rows, OnnxRuntimeConfig};
use crate::{PipelineError, Result};

/// Predicts a pose correction from the cloud expressed in the current
/// object frame.
pub trait PoseRefiner {
    /// `cloud_in_object` is `[N, 3]`; `embedding` is the estimator's
    /// `[1, D, N]` feature tensor.
    fn refine_step(
        &mut self,
        cloud_in_object: &Array2<f32>,
        embedding: &Array3<f32>,
        object_index: usize,
    ) -> Result<Isometry3<f64>>;
}

/// Run `iterations` refinement steps starting at `initial`.
///
/// Each step composes the predicted correction on the right:
/// `pose = pose * correction`.
pub fn iterative_refine<R: PoseRefiner + ?Sized>(
    refiner: &mut R,
    cloud: &Array2<f32>,
    embedding: &Array3<f32>,
    object_index: usize,
    iterations: usize,
    initial: Isometry3<f64>,
) -> Result<Isometry3<f64>> {
    let points: Vec<[f64; 3]> = cloud
        .rows()
        .into_iter()
        .map(|r| [r[0] as f64, r[1] as f64, r[2] as f64])
        .collect();

    let mut pose = initial;
    for iteration in 0..iterations {
        let local = to_object_frame(&pose, &points);
        let mut local_cloud = Array2::<f32>::zeros((local.len(), 3));
        for (mut row, p) in local_cloud.rows_mut().into_iter().zip(&local) {
            row[0] = p[0] as f32;
            row[1] = p[1] as f32;
            row[2] = p[2] as f32;
        }

        let correction = refiner.refine_step(&local_cloud, embedding, object_index)?;
        pose *= correction;
        tracing::trace!(
            iteration,
            dt = correction.translation.vector.norm(),
            dr = correction.rotation.angle(),
            "refinement step"
        );
    }
    Ok(pose)
}

/// Tensor names of the refiner graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefinerIo {
    pub points: String,
    pub emb: String,
    pub obj: String,
    pub pred_r: String,
    pub pred_t: String,
}

impl Default for RefinerIo {
    fn default() -> Self {
        Self {
            points: "points".to_string(),
            emb: "emb".to_string(),
            obj: "obj".to_string(),
            pred_r: "pred_r".to_string(),
            pred_t: "pred_t".to_string(),
        }
    }
}

/// Pose refiner network running on ONNX Runtime.
pub struct OnnxPoseRefiner {
    session: Session,
    io: RefinerIo,
}

impl OnnxPoseRefiner {
    pub fn load(model: &Path, io: RefinerIo, runtime: &OnnxRuntimeConfig) -> Result<Self> {
        Ok(Self {
            session: load_session(model, runtime)?,
            io,
        })
    }
}

impl PoseRefiner for OnnxPoseRefiner {
    fn refine_step(
        &mut self,
        cloud_in_object: &Array2<f32>,
        embedding: &Array3<f32>,
        object_index: usize,
    ) -> Result<Isometry3<f64>> {
        let points = Tensor::from_array(cloud_in_object.clone().insert_axis(Axis(0)))
            .map_err(PipelineError::inference)?;
        let emb = Tensor::from_array(embedding.clone()).map_err(PipelineError::inference)?;
        let obj = Tensor::from_array(Array2::from_elem((1, 1), object_index as i64))
            .map_err(PipelineError::inference)?;

        let outputs = self
            .session
            .run(ort::inputs![
                self.io.points.as_str() => points,
                self.io.emb.as_str() => emb,
                self.io.obj.as_str() => obj
            ])
            .map_err(PipelineError::inference)?;

        let r = output_rows(&self.io.pred_r, &extract_f32(&outputs, &self.io.pred_r)?, 4)?;
        let t = output_rows(&self.io.pred_t, &extract_f32(&outputs, &self.io.pred_t)?, 3)?;
        if r.nrows() != 1 || t.nrows() != 1 {
            return Err(PipelineError::ModelOutput(format!(
                "refiner returned {} rotations and {} translations",
                r.nrows(),
                t.nrows()
            )));
        }

        let q = r.row(0);
        let rotation =
            unit_quaternion_from_wxyz([q[0] as f64, q[1] as f64, q[2] as f64, q[3] as f64])
                .ok_or_else(|| {
                    PipelineError::ModelOutput("degenerate refiner rotation".to_string())
                })?;
        let translation = Vector3::new(t[[0, 0]] as f64, t[[0, 1]] as f64, t[[0, 2]] as f64);
        Ok(isometry(rotation, translation))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::ScriptedRefiner;
    use approx::assert_relative_eq;
    use nalgebra::UnitQuaternion;

    fn cloud() -> Array2<f32> {
        ndarray::array![[0.0f32, 0.0, 1.0], [0.1, 0.0, 1.0], [0.0, 0.1, 1.0]]
    }

    #[test]
    fn zero_iterations_keep_initial_pose() {
        let initial = isometry(
            UnitQuaternion::from_euler_angles(0.1, 0.2, 0.3),
            Vector3::new(0.0, 0.0, 1.0),
        );
        let mut refiner = ScriptedRefiner::new(Vec::new());
        let pose =
            iterative_refine(&mut refiner, &cloud(), &Array3::zeros((1, 4, 3)), 0, 0, initial)
                .unwrap();
        assert_eq!(pose, initial);
        assert!(refiner.seen_clouds.is_empty());
    }

    #[test]
    fn corrections_compose_on_the_right() {
        let initial = isometry(UnitQuaternion::identity(), Vector3::new(0.0, 0.0, 1.0));
        let step_a = isometry(
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 0.5),
            Vector3::new(0.01, 0.0, 0.0),
        );
        let step_b = isometry(UnitQuaternion::identity(), Vector3::new(0.0, 0.02, 0.0));
        let mut refiner = ScriptedRefiner::new(vec![step_a, step_b]);

        let pose =
            iterative_refine(&mut refiner, &cloud(), &Array3::zeros((1, 4, 3)), 2, 2, initial)
                .unwrap();
        let expected = initial * step_a * step_b;
        assert_relative_eq!(pose.to_homogeneous(), expected.to_homogeneous(), epsilon = 1e-12);
        assert_eq!(refiner.seen_objects, vec![2, 2]);
    }

    #[test]
    fn cloud_is_expressed_in_current_object_frame() {
        let initial = isometry(UnitQuaternion::identity(), Vector3::new(0.0, 0.0, 1.0));
        let step = isometry(
            UnitQuaternion::from_axis_angle(&Vector3::z_axis(), std::f64::consts::FRAC_PI_2),
            Vector3::zeros(),
        );
        let mut refiner = ScriptedRefiner::new(vec![step, step]);
        iterative_refine(&mut refiner, &cloud(), &Array3::zeros((1, 4, 3)), 0, 2, initial)
            .unwrap();

        // First step: only the translation is undone.
        let first = &refiner.seen_clouds[0];
        assert_relative_eq!(first[[1, 0]], 0.1, epsilon = 1e-6);
        assert_relative_eq!(first[[1, 2]], 0.0, epsilon = 1e-6);
        // Second step: R^T of a +90° yaw maps +x to -y.
        let second = &refiner.seen_clouds[1];
        assert_relative_eq!(second[[1, 0]], 0.0, epsilon = 1e-6);
        assert_relative_eq!(second[[1, 1]], -0.1, epsilon = 1e-6);
    }

    #[test]
    fn refiner_errors_propagate() {
        let mut refiner = ScriptedRefiner::new(Vec::new());
        let res = iterative_refine(
            &mut refiner,
            &cloud(),
            &Array3::zeros((1, 4, 3)),
            0,
            1,
            Isometry3::identity(),
        );
        assert!(res.is_err());
    }
}
