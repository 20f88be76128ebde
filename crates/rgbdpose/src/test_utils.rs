//! Shared fixtures for unit tests: synthetic frames, an in-memory frame
//! source and scripted stand-ins for the three networks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use image::{GrayImage, Luma, Rgb, RgbImage};
use nalgebra::Isometry3;
use ndarray::{Array1, Array2, Array3};

use crate::camera::{
    CameraIntrinsics, DepthImage, FrameSource, RawFrame, RgbdFrame, StreamInfo,
};
use crate::estimator::{PoseEstimator, PoseHypotheses};
use crate::mask::{mask_to_bbox, snap_crop, ObjectDetection};
use crate::refiner::PoseRefiner;
use crate::sampler::PointSample;
use crate::segment::{SemanticScores, Segmenter};
use crate::{PipelineError, Result};

/// Aligned stream with a centered principal point and `fx = fy = width`.
pub(crate) fn synthetic_stream_info(w: u32, h: u32) -> StreamInfo {
    StreamInfo {
        color_intrinsics: CameraIntrinsics {
            fx: w as f64,
            fy: w as f64,
            cx: (w as f64 - 1.0) / 2.0,
            cy: (h as f64 - 1.0) / 2.0,
            width: w,
            height: h,
        },
        depth_intrinsics: None,
        depth_to_color: None,
        depth_scale: 0.001,
        depth_aligned: true,
    }
}

/// Color gradient plus constant raw depth.
pub(crate) fn synthetic_frame(w: u32, h: u32, depth_value: u16) -> (RgbImage, DepthImage) {
    let color = RgbImage::from_fn(w, h, |x, y| {
        Rgb([(x * 255 / w.max(1)) as u8, (y * 255 / h.max(1)) as u8, 128])
    });
    let depth = DepthImage::from_pixel(w, h, Luma([depth_value]));
    (color, depth)
}

pub(crate) fn synthetic_rgbd(w: u32, h: u32, depth_value: u16) -> RgbdFrame {
    let (color, depth) = synthetic_frame(w, h, depth_value);
    let info = synthetic_stream_info(w, h);
    RgbdFrame {
        index: 0,
        color,
        depth,
        intrinsics: info.color_intrinsics,
        depth_scale: info.depth_scale,
    }
}

pub(crate) fn fill_rect(img: &mut GrayImage, x: u32, y: u32, w: u32, h: u32, value: u8) {
    for yy in y..(y + h).min(img.height()) {
        for xx in x..(x + w).min(img.width()) {
            img.put_pixel(xx, yy, Luma([value]));
        }
    }
}

/// Detection whose mask is one filled rectangle, cropped with a 40 px step.
pub(crate) fn detection_from_rect(
    img_w: u32,
    img_h: u32,
    class_id: usize,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
) -> ObjectDetection {
    let mut mask = GrayImage::new(img_w, img_h);
    fill_rect(&mut mask, x, y, w, h, 255);
    let bbox = mask_to_bbox(&mask).expect("non-empty rect");
    ObjectDetection {
        class_id,
        name: format!("object_{class_id}"),
        bbox,
        crop: snap_crop(bbox, (img_w, img_h), 40),
        pixel_count: w * h,
        mask,
    }
}

/// Score maps where background scores 0.5 everywhere and each
/// `(class, x, y, w, h)` rectangle scores 1.0 for its class.
pub(crate) fn detection_scores(
    num_classes: usize,
    w: u32,
    h: u32,
    rects: &[(usize, u32, u32, u32, u32)],
) -> SemanticScores {
    let mut scores = Array3::<f32>::zeros((num_classes, h as usize, w as usize));
    scores.index_axis_mut(ndarray::Axis(0), 0).fill(0.5);
    for &(class, x, y, rw, rh) in rects {
        for yy in y..(y + rh).min(h) {
            for xx in x..(x + rw).min(w) {
                scores[[class, yy as usize, xx as usize]] = 1.0;
            }
        }
    }
    SemanticScores::new(scores).expect("valid scores")
}

/// In-memory frame source.
pub(crate) struct VecSource {
    info: StreamInfo,
    frames: VecDeque<(RgbImage, DepthImage)>,
    next_index: u64,
    stops: Option<Arc<AtomicUsize>>,
}

impl VecSource {
    pub(crate) fn new(info: StreamInfo, frames: Vec<(RgbImage, DepthImage)>) -> Self {
        Self {
            info,
            frames: frames.into(),
            next_index: 0,
            stops: None,
        }
    }

    /// Count calls to [`FrameSource::stop`] in `counter`.
    pub(crate) fn with_stop_counter(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.stops = Some(counter);
        self
    }
}

impl FrameSource for VecSource {
    fn stream_info(&self) -> &StreamInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let Some((color, depth)) = self.frames.pop_front() else {
            return Ok(None);
        };
        let index = self.next_index;
        self.next_index += 1;
        Ok(Some(RawFrame {
            index,
            color,
            depth,
        }))
    }

    fn stop(&mut self) {
        if let Some(stops) = &self.stops {
            stops.fetch_add(1, Ordering::SeqCst);
        }
    }
}

/// Returns the same scores for every frame.
pub(crate) struct StaticSegmenter {
    scores: SemanticScores,
}

impl StaticSegmenter {
    pub(crate) fn new(scores: SemanticScores) -> Self {
        Self { scores }
    }
}

impl Segmenter for StaticSegmenter {
    fn segment(&mut self, _rgb: &RgbImage) -> Result<SemanticScores> {
        Ok(self.scores.clone())
    }
}

/// Identity rotation and a fixed translation offset for every point.
pub(crate) struct FixedEstimator {
    offset: [f32; 3],
    confidence: f32,
}

impl FixedEstimator {
    pub(crate) fn new(offset: [f32; 3], confidence: f32) -> Self {
        Self { offset, confidence }
    }
}

impl PoseEstimator for FixedEstimator {
    fn estimate(&mut self, sample: &PointSample, _object_index: usize) -> Result<PoseHypotheses> {
        let n = sample.len();
        let mut rotations = Array2::<f32>::zeros((n, 4));
        rotations.column_mut(0).fill(1.0);
        let mut translations = Array2::<f32>::zeros((n, 3));
        for mut row in translations.rows_mut() {
            row.assign(&ndarray::aview1(&self.offset));
        }
        Ok(PoseHypotheses {
            rotations,
            translations,
            confidences: Array1::from_elem(n, self.confidence),
            embedding: Array3::zeros((1, 4, n)),
        })
    }
}

/// Replays a fixed list of corrections and records what it was given.
pub(crate) struct ScriptedRefiner {
    steps: VecDeque<Isometry3<f64>>,
    pub(crate) seen_clouds: Vec<Array2<f32>>,
    pub(crate) seen_objects: Vec<usize>,
}

impl ScriptedRefiner {
    pub(crate) fn new(steps: Vec<Isometry3<f64>>) -> Self {
        Self {
            steps: steps.into(),
            seen_clouds: Vec::new(),
            seen_objects: Vec::new(),
        }
    }
}

impl PoseRefiner for ScriptedRefiner {
    fn refine_step(
        &mut self,
        cloud_in_object: &Array2<f32>,
        _embedding: &Array3<f32>,
        object_index: usize,
    ) -> Result<Isometry3<f64>> {
        self.seen_clouds.push(cloud_in_object.clone());
        self.seen_objects.push(object_index);
        self.steps
            .pop_front()
            .ok_or_else(|| PipelineError::Inference("refiner script exhausted".to_string()))
    }
}
