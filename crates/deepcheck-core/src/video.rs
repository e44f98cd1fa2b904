//! Video frame access capability.

use image::RgbImage;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VideoError {
    #[error("video not found: {0}")]
    NotFound(String),
    #[error("unsupported video format: {0}")]
    Unsupported(String),
    #[error("unreadable video: {0}")]
    Unreadable(String),
    #[error("frame {index} could not be decoded: {reason}")]
    Frame { index: usize, reason: String },
}

/// Random access to decoded video frames.
///
/// `frame_count` may be an estimate from container metadata; a frame that
/// fails to decode is reported per index and skipped by the pipeline.
pub trait VideoSource {
    fn frame_count(&mut self) -> Result<usize, VideoError>;

    fn decode_frame(&mut self, index: usize) -> Result<RgbImage, VideoError>;
}
