//! deepcheck-media — Video frame sources for the detection pipeline.
//!
//! Provides [`VideoSource`] implementations for container files decoded
//! by ffmpeg, animated GIFs and directories of still frames, plus
//! [`open_video`] to pick one by path.

pub mod container;
pub mod gif;
pub mod sequence;

use deepcheck_core::{VideoError, VideoSource};
use std::path::Path;

pub use container::ContainerVideo;
pub use gif::GifVideo;
pub use sequence::FrameSequence;

/// Open `path` as a video: a directory is a frame sequence, a `.gif` file
/// is an animated GIF and a known container extension goes through ffmpeg.
/// Anything else is unsupported.
pub fn open_video(path: &Path) -> Result<Box<dyn VideoSource>, VideoError> {
    if !path.exists() {
        return Err(VideoError::NotFound(path.display().to_string()));
    }

    if path.is_dir() {
        return Ok(Box::new(FrameSequence::open(path)?));
    }

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "gif" => Ok(Box::new(GifVideo::open(path)?)),
        ext if container::CONTAINER_EXTENSIONS.contains(&ext) => Ok(Box::new(ContainerVideo::open(path)?)),
        _ => Err(VideoError::Unsupported(format!(
            "{} (supported: {}, animated .gif, directory of frames)",
            path.display(),
            container::CONTAINER_EXTENSIONS.join(", ")
        ))),
    }
}
