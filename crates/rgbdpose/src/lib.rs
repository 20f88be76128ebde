//! rgbdpose — real-time 6-DoF object pose estimation on RGB-D streams.
//!
//! Every frame from a color+depth camera goes through these stages:
//!
//! 1. **Camera** – frame sources, depth-to-color registration, intrinsics.
//! 2. **Segment** – per-pixel class scores → label map.
//! 3. **Mask** – per-object masks, speckle removal, snapped network crops.
//! 4. **Sample** – fixed-size back-projected point cloud under the mask.
//! 5. **Estimate** – per-point pose hypotheses, most confident one wins.
//! 6. **Refine** – iterative residual corrections of the pose.
//! 7. **Project** – object model points transformed and projected back.
//! 8. **Display** – overlay, depth and mask colormaps side by side.
//!
//! # Public API
//! - [`PosePipeline`] runs stages 2–7 on one [`RgbdFrame`]
//! - [`CameraSession`] wraps any [`FrameSource`]
//! - [`run_display_loop`] ties both to a [`FrameSink`]
//! - [`PipelineConfig`] for tuning; [`ObjectCatalog`] for class names
//!
//! The three networks sit behind the [`Segmenter`], [`PoseEstimator`] and
//! [`PoseRefiner`] traits; ONNX Runtime implementations are provided.

pub mod camera;
mod catalog;
mod config;
mod display;
mod error;
pub mod estimator;
pub mod geometry;
pub mod mask;
mod normalize;
mod onnx;
pub mod overlay;
mod pipeline;
pub mod projector;
pub mod refiner;
pub mod sampler;
pub mod segment;

#[cfg(test)]
pub(crate) mod test_utils;

pub use camera::{
    CameraIntrinsics, CameraSession, DepthImage, FrameSource, RgbdFrame, SequenceSource,
    SequenceWriter, StreamInfo,
};
#[cfg(feature = "opencv")]
pub use camera::OpenNiSource;
pub use catalog::ObjectCatalog;
pub use config::PipelineConfig;
#[cfg(feature = "opencv")]
pub use display::HighGuiSink;
pub use display::{
    run_display_loop, DisplayAction, FrameSink, ImageDirSink, LoopOptions, LoopSummary, NullSink,
};
pub use error::{PipelineError, Result};
pub use estimator::{OnnxPoseEstimator, PoseEstimate, PoseEstimator};
pub use mask::{CropWindow, MaskConfig, ObjectDetection};
pub use normalize::RgbNormalization;
pub use onnx::OnnxRuntimeConfig;
pub use overlay::OverlayConfig;
pub use pipeline::{
    DetectionRecord, FrameOutput, FrameRecord, ModelPaths, PosePipeline, PoseRecord,
};
pub use projector::ModelCloud;
pub use refiner::{OnnxPoseRefiner, PoseRefiner};
pub use sampler::{PointSample, SamplerConfig};
pub use segment::{LabelMap, OnnxSegmenter, Segmenter, SemanticScores};
