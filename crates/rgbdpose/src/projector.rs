//! Object model point clouds and their projection into the color image.

use std::path::Path;

use rand::Rng;

use crate::camera::CameraIntrinsics;
use crate::{PipelineError, Result};

/// Axis-aligned bounds of a point set.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds3 {
    pub min: [f64; 3],
    pub max: [f64; 3],
}

/// Reference point cloud of an object model, in the object frame (meters).
#[derive(Debug, Clone, PartialEq)]
pub struct ModelCloud {
    points: Vec<[f64; 3]>,
}

impl ModelCloud {
    pub fn new(points: Vec<[f64; 3]>) -> Result<Self> {
        if points.is_empty() {
            return Err(PipelineError::Config("model cloud has no points".to_string()));
        }
        if points.iter().flatten().any(|v| !v.is_finite()) {
            return Err(PipelineError::Config(
                "model cloud contains non-finite coordinates".to_string(),
            ));
        }
        Ok(Self { points })
    }

    /// Parse a whitespace-separated `.xyz` file, one `x y z` per line.
    ///
    /// Extra columns (normals, colors) are ignored.
    pub fn from_xyz_file(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        let mut points = Vec::new();
        for (line_no, line) in data.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut coords = [0.0f64; 3];
            let mut fields = line.split_whitespace();
            for c in &mut coords {
                let field = fields.next().ok_or_else(|| {
                    PipelineError::Config(format!(
                        "{}:{}: expected three coordinates",
                        path.display(),
                        line_no + 1
                    ))
                })?;
                *c = field.parse().map_err(|e| {
                    PipelineError::Config(format!(
                        "{}:{}: bad coordinate '{field}': {e}",
                        path.display(),
                        line_no + 1
                    ))
                })?;
            }
            points.push(coords);
        }
        let cloud = Self::new(points)?;
        tracing::info!(points = cloud.len(), path = %path.display(), "loaded model cloud");
        Ok(cloud)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    /// `n` distinct points drawn at random; all points when the cloud is smaller.
    pub fn sample<R: Rng + ?Sized>(&self, n: usize, rng: &mut R) -> Vec<[f64; 3]> {
        if n >= self.points.len() {
            return self.points.clone();
        }
        rand::seq::index::sample(rng, self.points.len(), n)
            .into_iter()
            .map(|i| self.points[i])
            .collect()
    }

    pub fn bounds(&self) -> Bounds3 {
        let mut min = [f64::INFINITY; 3];
        let mut max = [f64::NEG_INFINITY; 3];
        for p in &self.points {
            for k in 0..3 {
                min[k] = min[k].min(p[k]);
                max[k] = max[k].max(p[k]);
            }
        }
        Bounds3 { min, max }
    }
}

/// Pixel coordinates of camera-frame points; points with `z <= 0` are dropped.
pub fn project_points(intrinsics: &CameraIntrinsics, points: &[[f64; 3]]) -> Vec<[f64; 2]> {
    points.iter().filter_map(|&p| intrinsics.project(p)).collect()
}

/// The eight corners of `bounds`, indexed by bits `(x, y, z)` of the index.
pub fn box_corners(bounds: &Bounds3) -> [[f64; 3]; 8] {
    let mut corners = [[0.0; 3]; 8];
    for (i, corner) in corners.iter_mut().enumerate() {
        for k in 0..3 {
            corner[k] = if i & (1 << k) != 0 {
                bounds.max[k]
            } else {
                bounds.min[k]
            };
        }
    }
    corners
}

/// Corner index pairs of the twelve box edges.
pub const BOX_EDGES: [(usize, usize); 12] = [
    (0, 1),
    (2, 3),
    (4, 5),
    (6, 7),
    (0, 2),
    (1, 3),
    (4, 6),
    (5, 7),
    (0, 4),
    (1, 5),
    (2, 6),
    (3, 7),
];

/// Projected 2-D segments of the box edges; edges with a corner behind the
/// camera are omitted.
pub fn project_box_edges(
    intrinsics: &CameraIntrinsics,
    corners_camera: &[[f64; 3]; 8],
) -> Vec<([f64; 2], [f64; 2])> {
    let projected: Vec<Option<[f64; 2]>> =
        corners_camera.iter().map(|&c| intrinsics.project(c)).collect();
    BOX_EDGES
        .iter()
        .filter_map(|&(a, b)| Some((projected[a]?, projected[b]?)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::synthetic_stream_info;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn xyz_file_is_parsed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("points.xyz");
        std::fs::write(&path, "0.0 0.0 0.0\n\n0.01 -0.02 0.03 0.5 0.5 0.5\n# comment\n1e-2 0 0\n")
            .unwrap();
        let cloud = ModelCloud::from_xyz_file(&path).unwrap();
        assert_eq!(cloud.len(), 3);
        assert_eq!(cloud.points()[1], [0.01, -0.02, 0.03]);
        let b = cloud.bounds();
        assert_eq!(b.min, [0.0, -0.02, 0.0]);
        assert_eq!(b.max, [0.01, 0.0, 0.03]);
    }

    #[test]
    fn malformed_xyz_reports_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.xyz");
        std::fs::write(&path, "0 0 0\n0 0\n").unwrap();
        let err = ModelCloud::from_xyz_file(&path).unwrap_err().to_string();
        assert!(err.contains(":2:"), "{err}");
    }

    #[test]
    fn sample_draws_distinct_points() {
        let points: Vec<[f64; 3]> = (0..100).map(|i| [i as f64, 0.0, 0.0]).collect();
        let cloud = ModelCloud::new(points).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let mut s: Vec<i64> = cloud.sample(20, &mut rng).iter().map(|p| p[0] as i64).collect();
        s.sort_unstable();
        s.dedup();
        assert_eq!(s.len(), 20);
        assert_eq!(cloud.sample(500, &mut rng).len(), 100);
    }

    #[test]
    fn projection_matches_pinhole_model() {
        let k = synthetic_stream_info(640, 480).color_intrinsics;
        let px = project_points(&k, &[[0.1, -0.05, 0.5], [0.0, 0.0, -1.0], [0.0, 0.0, 1.0]]);
        assert_eq!(px.len(), 2);
        assert_relative_eq!(px[0][0], k.fx * 0.2 + k.cx, epsilon = 1e-9);
        assert_relative_eq!(px[0][1], k.fy * -0.1 + k.cy, epsilon = 1e-9);
        assert_relative_eq!(px[1][0], k.cx, epsilon = 1e-9);
    }

    #[test]
    fn box_edges_connect_corners_differing_in_one_axis() {
        let corners = box_corners(&Bounds3 {
            min: [-1.0, -2.0, -3.0],
            max: [1.0, 2.0, 3.0],
        });
        assert_eq!(corners[0], [-1.0, -2.0, -3.0]);
        assert_eq!(corners[7], [1.0, 2.0, 3.0]);
        for (a, b) in BOX_EDGES {
            assert_eq!((a ^ b).count_ones(), 1);
        }
    }
}
