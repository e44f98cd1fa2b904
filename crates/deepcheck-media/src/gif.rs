//! Animated GIF video source.

use deepcheck_core::{VideoError, VideoSource};
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, DynamicImage, RgbImage};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Animated GIF, decoded eagerly at open.
///
/// GIF frames are deltas over their predecessors, so random access means
/// compositing from the start anyway. A decode error ends the stream; the
/// failing position is kept so the pipeline sees it as one bad frame.
pub struct GifVideo {
    frames: Vec<Result<RgbImage, String>>,
}

impl GifVideo {
    pub fn open(path: &Path) -> Result<Self, VideoError> {
        let file = File::open(path).map_err(|e| VideoError::Unreadable(format!("{}: {e}", path.display())))?;
        let decoder = GifDecoder::new(BufReader::new(file))
            .map_err(|e| VideoError::Unreadable(format!("{}: {e}", path.display())))?;

        let mut frames = Vec::new();
        for frame in decoder.into_frames() {
            match frame {
                Ok(frame) => frames.push(Ok(DynamicImage::ImageRgba8(frame.into_buffer()).to_rgb8())),
                Err(e) => {
                    tracing::debug!(path = %path.display(), index = frames.len(), error = %e, "GIF stream truncated");
                    frames.push(Err(e.to_string()));
                    break;
                }
            }
        }

        tracing::debug!(path = %path.display(), frames = frames.len(), "opened GIF video");
        Ok(Self { frames })
    }
}

impl VideoSource for GifVideo {
    fn frame_count(&mut self) -> Result<usize, VideoError> {
        Ok(self.frames.len())
    }

    fn decode_frame(&mut self, index: usize) -> Result<RgbImage, VideoError> {
        match self.frames.get(index) {
            Some(Ok(frame)) => Ok(frame.clone()),
            Some(Err(reason)) => Err(VideoError::Frame {
                index,
                reason: reason.clone(),
            }),
            None => Err(VideoError::Frame {
                index,
                reason: format!("out of range ({} frames)", self.frames.len()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::codecs::gif::GifEncoder;
    use image::{Frame, Rgba, RgbaImage};

    fn write_gif(path: &Path, colors: &[[u8; 4]]) {
        let file = File::create(path).unwrap();
        let mut encoder = GifEncoder::new(file);
        let frames = colors
            .iter()
            .map(|&c| Frame::new(RgbaImage::from_pixel(8, 6, Rgba(c))));
        encoder.encode_frames(frames).unwrap();
    }

    #[test]
    fn test_open_counts_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.gif");
        write_gif(&path, &[[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255]]);

        let mut video = GifVideo::open(&path).unwrap();
        assert_eq!(video.frame_count().unwrap(), 3);

        let frame = video.decode_frame(1).unwrap();
        assert_eq!(frame.dimensions(), (8, 6));
        let px = frame.get_pixel(4, 3);
        assert!(px[1] > 200 && px[0] < 50, "expected green, got {px:?}");
    }

    #[test]
    fn test_out_of_range_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one.gif");
        write_gif(&path, &[[10, 20, 30, 255]]);

        let mut video = GifVideo::open(&path).unwrap();
        assert!(matches!(video.decode_frame(5), Err(VideoError::Frame { index: 5, .. })));
    }

    #[test]
    fn test_garbage_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.gif");
        std::fs::write(&path, b"this is not a gif").unwrap();

        assert!(matches!(GifVideo::open(&path), Err(VideoError::Unreadable(_))));
    }
}
