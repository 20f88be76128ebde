//! Point sampling: masked depth pixels inside a crop → fixed-size camera-frame
//! point cloud plus the matching pixel indices and normalized RGB crop.

use ndarray::{Array2, Array3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::camera::RgbdFrame;
use crate::mask::{CropWindow, ObjectDetection};
use crate::normalize::RgbNormalization;

/// Point sampler parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplerConfig {
    /// Points per sample; the pose networks are built for this count.
    pub num_points: usize,
    /// Ignore mask pixels without a depth reading.
    pub skip_invalid_depth: bool,
    /// Seed for subsampling; `None` seeds from the OS.
    pub seed: Option<u64>,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            num_points: 500,
            skip_invalid_depth: true,
            seed: None,
        }
    }
}

/// Network-ready sample for one object.
#[derive(Debug, Clone)]
pub struct PointSample {
    /// Camera-frame points in meters, `[N, 3]`.
    pub cloud: Array2<f32>,
    /// Row-major pixel index of each point inside `crop`.
    pub choose: Vec<i64>,
    /// Normalized RGB crop, `[3, h, w]`.
    pub rgb_crop: Array3<f32>,
    pub crop: CropWindow,
}

impl PointSample {
    pub fn len(&self) -> usize {
        self.choose.len()
    }

    pub fn is_empty(&self) -> bool {
        self.choose.is_empty()
    }

    /// Cloud rows as `f64` triples.
    pub fn points(&self) -> Vec<[f64; 3]> {
        self.cloud
            .rows()
            .into_iter()
            .map(|r| [r[0] as f64, r[1] as f64, r[2] as f64])
            .collect()
    }
}

/// Build the point sample for `detection`.
///
/// Returns `None` when no usable pixel lies inside the crop.
pub fn sample_points<R: Rng + ?Sized>(
    frame: &RgbdFrame,
    detection: &ObjectDetection,
    normalization: &RgbNormalization,
    cfg: &SamplerConfig,
    rng: &mut R,
) -> Option<PointSample> {
    let crop = detection.crop;
    if crop.is_empty() || cfg.num_points == 0 {
        return None;
    }
    let crop_w = crop.width() as usize;

    let mut candidates: Vec<(u32, u32, i64)> = Vec::new();
    for v in crop.row_min..crop.row_max {
        for u in crop.col_min..crop.col_max {
            let Some(m) = detection.mask.get_pixel_checked(u, v) else {
                continue;
            };
            if m[0] == 0 {
                continue;
            }
            let d = frame.depth.get_pixel_checked(u, v).map_or(0, |p| p[0]);
            if cfg.skip_invalid_depth && d == 0 {
                continue;
            }
            let local = (v - crop.row_min) as usize * crop_w + (u - crop.col_min) as usize;
            candidates.push((u, v, local as i64));
        }
    }
    if candidates.is_empty() {
        tracing::debug!(class_id = detection.class_id, "no valid depth under mask");
        return None;
    }

    let selected = select_indices(candidates.len(), cfg.num_points, rng);

    let k = frame.intrinsics;
    let mut cloud = Array2::<f32>::zeros((selected.len(), 3));
    let mut choose = Vec::with_capacity(selected.len());
    for (row, &idx) in selected.iter().enumerate() {
        let (u, v, local) = candidates[idx];
        let raw = frame.depth.get_pixel_checked(u, v).map_or(0, |p| p[0]);
        let z = raw as f64 * frame.depth_scale;
        let x = (u as f64 - k.cx) * z / k.fx;
        let y = (v as f64 - k.cy) * z / k.fy;
        cloud[[row, 0]] = x as f32;
        cloud[[row, 1]] = y as f32;
        cloud[[row, 2]] = z as f32;
        choose.push(local);
    }

    Some(PointSample {
        cloud,
        choose,
        rgb_crop: normalization.crop_chw(&frame.color, crop),
        crop,
    })
}

/// Exactly `n` indices into `0..len`: an ordered random subset when
/// `len > n`, otherwise `0..len` repeated cyclically.
fn select_indices<R: Rng + ?Sized>(len: usize, n: usize, rng: &mut R) -> Vec<usize> {
    if len > n {
        let mut picked = rand::seq::index::sample(rng, len, n).into_vec();
        picked.sort_unstable();
        picked
    } else {
        (0..n).map(|i| i % len).collect()
    }
}
