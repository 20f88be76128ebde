//! Depth-to-color registration.
//!
//! Every valid depth pixel is lifted to 3-D with the depth intrinsics, moved
//! into the color camera with the depth→color extrinsic and splatted over the
//! color pixels covered by its footprint. Overlapping splats keep the nearest
//! depth.

use image::Luma;
use nalgebra::{Isometry3, Point3};

use super::{CameraIntrinsics, DepthImage};

/// Reprojects depth images into the color camera.
#[derive(Debug, Clone)]
pub struct DepthAligner {
    depth: CameraIntrinsics,
    color: CameraIntrinsics,
    depth_to_color: Isometry3<f64>,
}

impl DepthAligner {
    pub fn new(
        depth: CameraIntrinsics,
        color: CameraIntrinsics,
        depth_to_color: Isometry3<f64>,
    ) -> Self {
        Self {
            depth,
            color,
            depth_to_color,
        }
    }

    /// Align a raw depth image to the color stream.
    ///
    /// Raw units are preserved; the output has the color stream's size and
    /// zero where no depth sample lands.
    pub fn align(&self, depth: &DepthImage, depth_scale: f64) -> DepthImage {
        let mut aligned = DepthImage::new(self.color.width, self.color.height);
        if depth_scale <= 0.0 || !depth_scale.is_finite() {
            return aligned;
        }

        for (x, y, px) in depth.enumerate_pixels() {
            let raw = px[0];
            if raw == 0 {
                continue;
            }
            let z = raw as f64 * depth_scale;

            let Some(top_left) = self.splat_corner([x as f64 - 0.5, y as f64 - 0.5], z) else {
                continue;
            };
            let Some(bottom_right) = self.splat_corner([x as f64 + 0.5, y as f64 + 0.5], z) else {
                continue;
            };
            let Some(center_z) = self.color_depth([x as f64, y as f64], z) else {
                continue;
            };

            let x0 = top_left[0].min(bottom_right[0]).round().max(0.0);
            let y0 = top_left[1].min(bottom_right[1]).round().max(0.0);
            let x1 = top_left[0]
                .max(bottom_right[0])
                .round()
                .min(self.color.width as f64 - 1.0);
            let y1 = top_left[1]
                .max(bottom_right[1])
                .round()
                .min(self.color.height as f64 - 1.0);
            if x0 > x1 || y0 > y1 {
                continue;
            }

            let out = (center_z / depth_scale).round();
            if !(1.0..=u16::MAX as f64).contains(&out) {
                continue;
            }
            let out = out as u16;

            for cy in y0 as u32..=y1 as u32 {
                for cx in x0 as u32..=x1 as u32 {
                    let cur = aligned.get_pixel(cx, cy)[0];
                    if cur == 0 || out < cur {
                        aligned.put_pixel(cx, cy, Luma([out]));
                    }
                }
            }
        }

        aligned
    }

    fn to_color_point(&self, depth_pixel: [f64; 2], z: f64) -> Option<Point3<f64>> {
        let p = self.depth.back_project(depth_pixel, z)?;
        Some(self.depth_to_color * Point3::new(p[0], p[1], p[2]))
    }

    fn splat_corner(&self, depth_pixel: [f64; 2], z: f64) -> Option<[f64; 2]> {
        let q = self.to_color_point(depth_pixel, z)?;
        self.color.project([q.x, q.y, q.z])
    }

    fn color_depth(&self, depth_pixel: [f64; 2], z: f64) -> Option<f64> {
        let q = self.to_color_point(depth_pixel, z)?;
        (q.z > 0.0).then_some(q.z)
    }
}
