//! Frame loop: read → process → show, until the stream ends or the viewer
//! quits.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use image::RgbImage;
use serde::Serialize;

use crate::camera::CameraSession;
use crate::pipeline::PosePipeline;
use crate::Result;

/// What the loop should do after showing a frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayAction {
    Continue,
    Quit,
}

/// Destination for rendered display frames.
pub trait FrameSink {
    fn show(&mut self, frame: &RgbImage) -> Result<DisplayAction>;
}

/// Writes every frame as `NNNNNN.png` into a directory. Never quits.
pub struct ImageDirSink {
    dir: PathBuf,
    next_index: u64,
}

impl ImageDirSink {
    pub fn create(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            next_index: 0,
        })
    }
}

impl FrameSink for ImageDirSink {
    fn show(&mut self, frame: &RgbImage) -> Result<DisplayAction> {
        let path = self.dir.join(format!("{:06}.png", self.next_index));
        frame.save(&path)?;
        self.next_index += 1;
        Ok(DisplayAction::Continue)
    }
}

/// Accepts frames and drops them.
#[derive(Debug, Default)]
pub struct NullSink;

impl FrameSink for NullSink {
    fn show(&mut self, _frame: &RgbImage) -> Result<DisplayAction> {
        Ok(DisplayAction::Continue)
    }
}

#[cfg(feature = "opencv")]
pub use highgui::HighGuiSink;

#[cfg(feature = "opencv")]
mod highgui {
    use image::RgbImage;
    use opencv::core::{Mat, Scalar, CV_8UC3};
    use opencv::highgui;
    use opencv::prelude::*;

    use super::{DisplayAction, FrameSink};
    use crate::Result;

    const KEY_ESC: i32 = 27;

    /// On-screen window; `q` or ESC quits.
    pub struct HighGuiSink {
        window: String,
    }

    impl HighGuiSink {
        pub fn open(window: &str) -> Result<Self> {
            highgui::named_window(window, highgui::WINDOW_AUTOSIZE)?;
            Ok(Self {
                window: window.to_string(),
            })
        }
    }

    impl FrameSink for HighGuiSink {
        fn show(&mut self, frame: &RgbImage) -> Result<DisplayAction> {
            let (w, h) = frame.dimensions();
            let mut mat =
                Mat::new_rows_cols_with_default(h as i32, w as i32, CV_8UC3, Scalar::all(0.0))?;
            let bgr = mat.data_bytes_mut()?;
            for (dst, src) in bgr.chunks_exact_mut(3).zip(frame.pixels()) {
                dst[0] = src[2];
                dst[1] = src[1];
                dst[2] = src[0];
            }
            highgui::imshow(&self.window, &mat)?;

            let key = highgui::wait_key(1)?;
            if key == KEY_ESC || (key & 0xFF) == 'q' as i32 {
                Ok(DisplayAction::Quit)
            } else {
                Ok(DisplayAction::Continue)
            }
        }
    }

    impl Drop for HighGuiSink {
        fn drop(&mut self) {
            if let Err(err) = highgui::destroy_window(&self.window) {
                tracing::warn!("failed to close window: {err}");
            }
        }
    }
}

/// Loop limits and outputs.
#[derive(Debug, Clone, Default)]
pub struct LoopOptions {
    /// Stop after this many frames.
    pub max_frames: Option<u64>,
    /// Append one JSON line per frame record to this file.
    pub records: Option<PathBuf>,
}

/// Frame counts of a finished loop.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LoopSummary {
    pub frames: u64,
    pub frames_with_pose: u64,
    pub frames_failed: u64,
}

/// Drive `pipeline` with frames from `session` and show the results.
///
/// Frames that fail to process are logged and skipped; source and sink
/// errors end the loop. The session is stopped on every exit path.
pub fn run_display_loop(
    session: &mut CameraSession,
    pipeline: &mut PosePipeline,
    sink: &mut dyn FrameSink,
    opts: &LoopOptions,
) -> Result<LoopSummary> {
    let result = drive(session, pipeline, sink, opts);
    session.stop();
    if let Ok(summary) = &result {
        tracing::info!(
            frames = summary.frames,
            with_pose = summary.frames_with_pose,
            failed = summary.frames_failed,
            skipped = session.frames_skipped(),
            "display loop finished"
        );
    }
    result
}

fn drive(
    session: &mut CameraSession,
    pipeline: &mut PosePipeline,
    sink: &mut dyn FrameSink,
    opts: &LoopOptions,
) -> Result<LoopSummary> {
    let mut records = match &opts.records {
        Some(path) => Some(BufWriter::new(File::create(path)?)),
        None => None,
    };
    let mut summary = LoopSummary::default();

    while opts.max_frames.map_or(true, |max| summary.frames < max) {
        let Some(frame) = session.next_frame()? else {
            tracing::info!("stream ended");
            break;
        };
        summary.frames += 1;

        let output = match pipeline.process(&frame) {
            Ok(output) => output,
            Err(err) => {
                summary.frames_failed += 1;
                tracing::warn!(frame = frame.index, "frame skipped: {err}");
                continue;
            }
        };
        if output.record.pose.is_some() {
            summary.frames_with_pose += 1;
        }
        if let Some(w) = records.as_mut() {
            serde_json::to_writer(&mut *w, &output.record)?;
            w.write_all(b"\n")?;
        }

        if sink.show(&output.display)? == DisplayAction::Quit {
            tracing::info!("viewer requested quit");
            break;
        }
    }

    if let Some(mut w) = records {
        w.flush()?;
    }
    Ok(summary)
}
