//! Directory of still frames treated as a video.

use deepcheck_core::{VideoError, VideoSource};
use image::RgbImage;
use std::path::{Path, PathBuf};

const FRAME_EXTENSIONS: [&str; 5] = ["png", "jpg", "jpeg", "bmp", "webp"];

/// Frames are the directory's image files ordered by file name, so
/// zero-padded names (`frame_0001.png`, ...) sort into playback order.
/// Each frame is decoded lazily on request.
pub struct FrameSequence {
    frames: Vec<PathBuf>,
}

impl FrameSequence {
    pub fn open(dir: &Path) -> Result<Self, VideoError> {
        let entries = std::fs::read_dir(dir).map_err(|e| VideoError::Unreadable(format!("{}: {e}", dir.display())))?;

        let mut frames: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && has_frame_extension(path))
            .collect();
        frames.sort();

        tracing::debug!(dir = %dir.display(), frames = frames.len(), "opened frame sequence");
        Ok(Self { frames })
    }
}

fn has_frame_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| FRAME_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

impl VideoSource for FrameSequence {
    fn frame_count(&mut self) -> Result<usize, VideoError> {
        Ok(self.frames.len())
    }

    fn decode_frame(&mut self, index: usize) -> Result<RgbImage, VideoError> {
        let path = self.frames.get(index).ok_or_else(|| VideoError::Frame {
            index,
            reason: format!("out of range ({} frames)", self.frames.len()),
        })?;

        image::open(path)
            .map(|img| img.to_rgb8())
            .map_err(|e| VideoError::Frame {
                index,
                reason: format!("{}: {e}", path.display()),
            })
    }
}
