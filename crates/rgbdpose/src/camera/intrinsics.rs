//! Pinhole intrinsics and the back-projection/projection pair used by the
//! sampler and the overlay.

use serde::{Deserialize, Serialize};

/// Pinhole camera intrinsics of one stream.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct CameraIntrinsics {
    /// Focal length in x (pixels).
    pub fx: f64,
    /// Focal length in y (pixels).
    pub fy: f64,
    /// Principal point x (pixels).
    pub cx: f64,
    /// Principal point y (pixels).
    pub cy: f64,
    /// Stream width in pixels.
    pub width: u32,
    /// Stream height in pixels.
    pub height: u32,
}

impl CameraIntrinsics {
    /// Returns `true` when all parameters are finite and focal lengths are non-zero.
    pub fn is_valid(self) -> bool {
        self.fx.is_finite()
            && self.fy.is_finite()
            && self.cx.is_finite()
            && self.cy.is_finite()
            && self.fx.abs() > 1e-12
            && self.fy.abs() > 1e-12
            && self.width > 0
            && self.height > 0
    }

    /// Back-project pixel `(u, v)` at metric depth `z` into the camera frame.
    pub fn back_project(self, pixel_uv: [f64; 2], z: f64) -> Option<[f64; 3]> {
        if !self.is_valid() || !z.is_finite() {
            return None;
        }
        let x = (pixel_uv[0] - self.cx) * z / self.fx;
        let y = (pixel_uv[1] - self.cy) * z / self.fy;
        Some([x, y, z])
    }

    /// Project a camera-frame point to pixel coordinates.
    ///
    /// Points on or behind the image plane (`z <= 0`) have no projection.
    pub fn project(self, point: [f64; 3]) -> Option<[f64; 2]> {
        let z = point[2];
        if !self.is_valid() || !z.is_finite() || z <= 0.0 {
            return None;
        }
        let u = self.fx * point[0] / z + self.cx;
        let v = self.fy * point[1] / z + self.cy;
        if u.is_finite() && v.is_finite() {
            Some([u, v])
        } else {
            None
        }
    }

    /// Returns `true` when the pixel lies inside the stream bounds.
    pub fn contains(self, pixel_uv: [f64; 2]) -> bool {
        pixel_uv[0] >= 0.0
            && pixel_uv[1] >= 0.0
            && pixel_uv[0] < self.width as f64
            && pixel_uv[1] < self.height as f64
    }
}
