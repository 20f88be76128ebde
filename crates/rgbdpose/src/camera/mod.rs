//! Camera session: color+depth frame sources, depth-to-color alignment and
//! stream intrinsics.
//!
//! Sources deliver raw frame pairs ([`RawFrame`]); [`CameraSession`] turns
//! them into registered [`RgbdFrame`]s for the pipeline.

mod align;
mod frame;
mod intrinsics;
#[cfg(feature = "opencv")]
mod openni;
mod sequence;
mod session;

pub use align::DepthAligner;
pub use frame::{DepthImage, RawFrame, RgbdFrame, StreamInfo};
pub use intrinsics::CameraIntrinsics;
#[cfg(feature = "opencv")]
pub use openni::OpenNiSource;
pub use sequence::{SequenceSource, SequenceWriter};
pub use session::CameraSession;

use crate::Result;

/// A stream of color+depth frame pairs.
///
/// Implement this trait to plug in another device or file format.
pub trait FrameSource {
    /// Static stream description (intrinsics, depth scale, registration).
    fn stream_info(&self) -> &StreamInfo;

    /// Block until the next frame pair is available.
    ///
    /// Returns `Ok(None)` once the stream has ended.
    fn next_frame(&mut self) -> Result<Option<RawFrame>>;

    /// Release the device. Called once by the owning session.
    fn stop(&mut self) {}
}
