//! RGB → normalized CHW tensor conversion shared by the segmenter and the
//! pose estimator crops.

use image::RgbImage;
use ndarray::Array3;

use crate::mask::CropWindow;
use crate::{PipelineError, Result};

/// Per-channel normalization `(v * scale - mean) / std` in RGB order.
///
/// The networks were trained on raw 0..255 channel values normalized with
/// ImageNet statistics, hence `scale = 1.0` by default.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RgbNormalization {
    pub mean: [f32; 3],
    pub std: [f32; 3],
    pub scale: f32,
}

impl Default for RgbNormalization {
    fn default() -> Self {
        Self {
            mean: [0.485, 0.456, 0.406],
            std: [0.229, 0.224, 0.225],
            scale: 1.0,
        }
    }
}

impl RgbNormalization {
    pub fn validate(&self) -> Result<()> {
        if self.std.iter().any(|s| !s.is_finite() || s.abs() < 1e-12) {
            return Err(PipelineError::Config(
                "normalization std must be finite and non-zero".to_string(),
            ));
        }
        if !self.scale.is_finite() || !self.mean.iter().all(|m| m.is_finite()) {
            return Err(PipelineError::Config(
                "normalization mean/scale must be finite".to_string(),
            ));
        }
        Ok(())
    }

    /// Whole image as a `[3, H, W]` tensor.
    pub fn tensor_chw(&self, rgb: &RgbImage) -> Array3<f32> {
        let (w, h) = rgb.dimensions();
        self.crop_chw(
            rgb,
            CropWindow {
                row_min: 0,
                row_max: h,
                col_min: 0,
                col_max: w,
            },
        )
    }

    /// Crop window as a `[3, rows, cols]` tensor.
    ///
    /// The window must lie inside the image.
    pub fn crop_chw(&self, rgb: &RgbImage, crop: CropWindow) -> Array3<f32> {
        let rows = crop.height() as usize;
        let cols = crop.width() as usize;
        let mut out = Array3::<f32>::zeros((3, rows, cols));
        for r in 0..rows {
            for c in 0..cols {
                let px = rgb.get_pixel(crop.col_min + c as u32, crop.row_min + r as u32);
                for ch in 0..3 {
                    out[[ch, r, c]] =
                        (px[ch] as f32 * self.scale - self.mean[ch]) / self.std[ch];
                }
            }
        }
        out
    }
}
