use image::{ImageBuffer, Luma, RgbImage};
use serde::{Deserialize, Serialize};

use super::CameraIntrinsics;
use crate::geometry::RigidTransform;

/// Raw 16-bit depth image. Multiply by the stream depth scale for meters.
pub type DepthImage = ImageBuffer<Luma<u16>, Vec<u16>>;

/// Static description of a color+depth stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StreamInfo {
    /// Intrinsics of the color stream (the working frame of the pipeline).
    pub color_intrinsics: CameraIntrinsics,
    /// Intrinsics of the depth stream; required when depth is not aligned.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_intrinsics: Option<CameraIntrinsics>,
    /// Transform taking depth-camera points into the color camera frame.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub depth_to_color: Option<RigidTransform>,
    /// Meters per raw depth unit.
    pub depth_scale: f64,
    /// Depth frames are already registered to the color stream.
    #[serde(default)]
    pub depth_aligned: bool,
}

/// Frame pair as delivered by a source, before alignment.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub index: u64,
    pub color: RgbImage,
    pub depth: DepthImage,
}

/// Color frame with depth registered to it, ready for the pipeline.
#[derive(Debug, Clone)]
pub struct RgbdFrame {
    /// Monotonic frame counter from the source.
    pub index: u64,
    /// Color image in RGB channel order.
    pub color: RgbImage,
    /// Depth aligned to `color`, same resolution.
    pub depth: DepthImage,
    /// Intrinsics of the color stream.
    pub intrinsics: CameraIntrinsics,
    /// Meters per raw depth unit.
    pub depth_scale: f64,
}

impl RgbdFrame {
    /// Metric depth at pixel `(x, y)`; `None` for missing depth.
    pub fn depth_m(&self, x: u32, y: u32) -> Option<f64> {
        let raw = self.depth.get_pixel_checked(x, y)?[0];
        (raw > 0).then(|| raw as f64 * self.depth_scale)
    }
}
