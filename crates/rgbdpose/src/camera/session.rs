use nalgebra::Isometry3;

use super::{CameraIntrinsics, DepthAligner, FrameSource, RawFrame, RgbdFrame, StreamInfo};
use crate::{PipelineError, Result};

/// An open color+depth stream delivering depth registered to color.
///
/// The session owns its source and stops it exactly once, either through
/// [`CameraSession::stop`] or when dropped.
pub struct CameraSession {
    source: Box<dyn FrameSource>,
    info: StreamInfo,
    aligner: Option<DepthAligner>,
    stopped: bool,
    frames_skipped: u64,
}

impl CameraSession {
    /// Start a session on `source`, preparing depth alignment if the stream
    /// is not registered already.
    pub fn open(source: Box<dyn FrameSource>) -> Result<Self> {
        let info = source.stream_info().clone();
        validate_stream_info(&info)?;

        let aligner = if info.depth_aligned {
            None
        } else {
            let depth_k = info.depth_intrinsics.ok_or_else(|| {
                PipelineError::Config(
                    "depth_intrinsics are required when depth is not aligned to color".to_string(),
                )
            })?;
            let extrinsic = match &info.depth_to_color {
                Some(t) => t.to_isometry().ok_or_else(|| {
                    PipelineError::Config("depth_to_color rotation is degenerate".to_string())
                })?,
                None => Isometry3::identity(),
            };
            Some(DepthAligner::new(depth_k, info.color_intrinsics, extrinsic))
        };

        tracing::info!(
            width = info.color_intrinsics.width,
            height = info.color_intrinsics.height,
            depth_scale = info.depth_scale,
            software_align = aligner.is_some(),
            "camera session started"
        );

        Ok(Self {
            source,
            info,
            aligner,
            stopped: false,
            frames_skipped: 0,
        })
    }

    /// Intrinsics of the color stream (the frame all outputs live in).
    pub fn intrinsics(&self) -> CameraIntrinsics {
        self.info.color_intrinsics
    }

    /// Meters per raw depth unit.
    pub fn depth_scale(&self) -> f64 {
        self.info.depth_scale
    }

    /// Number of frame pairs dropped by validation so far.
    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }

    /// Next registered frame, or `None` when the stream has ended.
    ///
    /// Frame pairs that fail validation are skipped with a warning.
    pub fn next_frame(&mut self) -> Result<Option<RgbdFrame>> {
        if self.stopped {
            return Ok(None);
        }
        loop {
            let Some(raw) = self.source.next_frame()? else {
                return Ok(None);
            };
            match self.register(raw) {
                Some(frame) => return Ok(Some(frame)),
                None => self.frames_skipped += 1,
            }
        }
    }

    /// Stop the underlying source. Further reads return `None`.
    pub fn stop(&mut self) {
        if !self.stopped {
            self.source.stop();
            self.stopped = true;
            tracing::info!(skipped = self.frames_skipped, "camera session stopped");
        }
    }

    fn register(&self, raw: RawFrame) -> Option<RgbdFrame> {
        let k = self.info.color_intrinsics;
        if raw.color.dimensions() != (k.width, k.height) {
            tracing::warn!(
                frame = raw.index,
                got = ?raw.color.dimensions(),
                expected = ?(k.width, k.height),
                "skipping frame: color size does not match stream intrinsics"
            );
            return None;
        }

        let depth = match &self.aligner {
            Some(aligner) => aligner.align(&raw.depth, self.info.depth_scale),
            None => raw.depth,
        };
        if depth.dimensions() != raw.color.dimensions() {
            tracing::warn!(
                frame = raw.index,
                got = ?depth.dimensions(),
                "skipping frame: depth is not registered to color"
            );
            return None;
        }

        Some(RgbdFrame {
            index: raw.index,
            color: raw.color,
            depth,
            intrinsics: k,
            depth_scale: self.info.depth_scale,
        })
    }
}

impl Drop for CameraSession {
    fn drop(&mut self) {
        self.stop();
    }
}

fn validate_stream_info(info: &StreamInfo) -> Result<()> {
    if !info.color_intrinsics.is_valid() {
        return Err(PipelineError::Config(
            "color intrinsics must have finite non-zero focal lengths and a non-empty size"
                .to_string(),
        ));
    }
    if let Some(k) = info.depth_intrinsics {
        if !k.is_valid() {
            return Err(PipelineError::Config("depth intrinsics are invalid".to_string()));
        }
    }
    if !info.depth_scale.is_finite() || info.depth_scale <= 0.0 {
        return Err(PipelineError::Config(
            "depth_scale must be finite and > 0".to_string(),
        ));
    }
    Ok(())
}
