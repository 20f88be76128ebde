//! Live depth camera through OpenCV's OpenNI2 capture backend.
//!
//! The device registers depth to color in hardware, so frames come out
//! aligned. Depth maps are in millimeters.

use image::RgbImage;
use opencv::core::Mat;
use opencv::prelude::*;
use opencv::videoio;

use super::{CameraIntrinsics, DepthImage, FrameSource, RawFrame, StreamInfo};
use crate::{PipelineError, Result};

const OPENNI_DEPTH_SCALE: f64 = 0.001;

/// OpenNI2 device opened through `cv::VideoCapture`.
pub struct OpenNiSource {
    capture: videoio::VideoCapture,
    info: StreamInfo,
    next_index: u64,
}

impl OpenNiSource {
    /// Open device `device_index` with depth registered to color.
    pub fn open(device_index: i32) -> Result<Self> {
        let mut capture = videoio::VideoCapture::new(device_index, videoio::CAP_OPENNI2)?;
        if !capture.is_opened()? {
            return Err(PipelineError::Camera(format!(
                "cannot open OpenNI2 device {device_index}"
            )));
        }
        capture.set(videoio::CAP_PROP_OPENNI_REGISTRATION, 1.0)?;

        let width = capture.get(videoio::CAP_OPENNI_IMAGE_GENERATOR + videoio::CAP_PROP_FRAME_WIDTH)?;
        let height =
            capture.get(videoio::CAP_OPENNI_IMAGE_GENERATOR + videoio::CAP_PROP_FRAME_HEIGHT)?;
        let focal = capture.get(videoio::CAP_OPENNI_DEPTH_GENERATOR_FOCAL_LENGTH)?;
        if width <= 0.0 || height <= 0.0 || focal <= 0.0 {
            return Err(PipelineError::Camera(format!(
                "device reported invalid stream geometry {width}x{height}, f={focal}"
            )));
        }

        let intrinsics = CameraIntrinsics {
            fx: focal,
            fy: focal,
            cx: width / 2.0,
            cy: height / 2.0,
            width: width as u32,
            height: height as u32,
        };
        tracing::info!(?intrinsics, "OpenNI2 device {} opened", device_index);

        Ok(Self {
            capture,
            info: StreamInfo {
                color_intrinsics: intrinsics,
                depth_intrinsics: None,
                depth_to_color: None,
                depth_scale: OPENNI_DEPTH_SCALE,
                depth_aligned: true,
            },
            next_index: 0,
        })
    }
}

impl FrameSource for OpenNiSource {
    fn stream_info(&self) -> &StreamInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        if !self.capture.grab()? {
            return Ok(None);
        }

        let mut depth_mat = Mat::default();
        let mut bgr_mat = Mat::default();
        if !self
            .capture
            .retrieve(&mut depth_mat, videoio::CAP_OPENNI_DEPTH_MAP)?
            || !self
                .capture
                .retrieve(&mut bgr_mat, videoio::CAP_OPENNI_BGR_IMAGE)?
        {
            return Err(PipelineError::Camera("device returned an empty frame".to_string()));
        }

        let color = bgr_mat_to_rgb(&bgr_mat)?;
        let depth = depth_mat_to_image(&depth_mat)?;
        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(RawFrame {
            index,
            color,
            depth,
        }))
    }

    fn stop(&mut self) {
        if let Err(err) = self.capture.release() {
            tracing::warn!("failed to release OpenNI2 device: {err}");
        }
    }
}

fn bgr_mat_to_rgb(mat: &Mat) -> Result<RgbImage> {
    let (w, h) = (mat.cols() as u32, mat.rows() as u32);
    let owned;
    let mat = if mat.is_continuous() {
        mat
    } else {
        owned = mat.try_clone()?;
        &owned
    };
    let bytes = mat.data_bytes()?;
    let mut rgb = Vec::with_capacity(bytes.len());
    for px in bytes.chunks_exact(3) {
        rgb.extend_from_slice(&[px[2], px[1], px[0]]);
    }
    RgbImage::from_raw(w, h, rgb)
        .ok_or_else(|| PipelineError::Camera("color buffer size mismatch".to_string()))
}

fn depth_mat_to_image(mat: &Mat) -> Result<DepthImage> {
    let (w, h) = (mat.cols() as u32, mat.rows() as u32);
    let owned;
    let mat = if mat.is_continuous() {
        mat
    } else {
        owned = mat.try_clone()?;
        &owned
    };
    let data = mat.data_typed::<u16>()?.to_vec();
    DepthImage::from_raw(w, h, data)
        .ok_or_else(|| PipelineError::Camera("depth buffer size mismatch".to_string()))
}
