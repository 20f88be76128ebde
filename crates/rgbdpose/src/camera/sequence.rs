//! Recorded RGB-D sequences on disk.
//!
//! Layout:
//!
//! ```text
//! <root>/camera.json        StreamInfo
//! <root>/color/000000.png   8-bit RGB
//! <root>/depth/000000.png   16-bit raw depth
//! ```

use std::path::{Path, PathBuf};

use image::DynamicImage;

use super::{DepthImage, FrameSource, RawFrame, StreamInfo};
use crate::{PipelineError, Result};

const STREAM_INFO_FILE: &str = "camera.json";
const COLOR_DIR: &str = "color";
const DEPTH_DIR: &str = "depth";

/// Replays a recorded sequence in file-name order.
pub struct SequenceSource {
    root: PathBuf,
    info: StreamInfo,
    color_paths: Vec<PathBuf>,
    cursor: usize,
}

impl SequenceSource {
    /// Open a sequence directory.
    pub fn open(root: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(root.join(STREAM_INFO_FILE))?;
        let info: StreamInfo = serde_json::from_str(&data)?;

        let mut color_paths: Vec<PathBuf> = std::fs::read_dir(root.join(COLOR_DIR))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case("png"))
            })
            .collect();
        color_paths.sort();

        tracing::info!(
            root = %root.display(),
            frames = color_paths.len(),
            "opened recorded sequence"
        );

        Ok(Self {
            root: root.to_path_buf(),
            info,
            color_paths,
            cursor: 0,
        })
    }

    /// Number of frames in the sequence.
    pub fn len(&self) -> usize {
        self.color_paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.color_paths.is_empty()
    }
}

impl FrameSource for SequenceSource {
    fn stream_info(&self) -> &StreamInfo {
        &self.info
    }

    fn next_frame(&mut self) -> Result<Option<RawFrame>> {
        let Some(color_path) = self.color_paths.get(self.cursor) else {
            return Ok(None);
        };
        let index = self.cursor as u64;
        self.cursor += 1;

        let file_name = color_path
            .file_name()
            .ok_or_else(|| PipelineError::Camera(format!("bad frame path {}", color_path.display())))?;
        let depth_path = self.root.join(DEPTH_DIR).join(file_name);
        if !depth_path.exists() {
            return Err(PipelineError::Camera(format!(
                "missing depth frame {}",
                depth_path.display()
            )));
        }

        let color = image::open(color_path)?.to_rgb8();
        let depth = match image::open(&depth_path)? {
            DynamicImage::ImageLuma16(d) => d,
            other => {
                return Err(PipelineError::Camera(format!(
                    "depth frame {} must be 16-bit single channel, got {:?}",
                    depth_path.display(),
                    other.color()
                )))
            }
        };

        Ok(Some(RawFrame {
            index,
            color,
            depth,
        }))
    }
}

/// Writes frames in the layout read by [`SequenceSource`].
pub struct SequenceWriter {
    root: PathBuf,
    next_index: u64,
}

impl SequenceWriter {
    /// Create the directory layout and write the stream description.
    pub fn create(root: &Path, info: &StreamInfo) -> Result<Self> {
        std::fs::create_dir_all(root.join(COLOR_DIR))?;
        std::fs::create_dir_all(root.join(DEPTH_DIR))?;
        let json = serde_json::to_string_pretty(info)?;
        std::fs::write(root.join(STREAM_INFO_FILE), json)?;
        Ok(Self {
            root: root.to_path_buf(),
            next_index: 0,
        })
    }

    /// Append one frame pair.
    pub fn write(&mut self, color: &image::RgbImage, depth: &DepthImage) -> Result<()> {
        let name = format!("{:06}.png", self.next_index);
        color.save(self.root.join(COLOR_DIR).join(&name))?;
        depth.save(self.root.join(DEPTH_DIR).join(&name))?;
        self.next_index += 1;
        Ok(())
    }

    /// Number of frames written so far.
    pub fn frames_written(&self) -> u64 {
        self.next_index
    }
}
