//! Container video (mp4, mov, webm, ...) decoded through ffprobe/ffmpeg.

use deepcheck_core::{VideoError, VideoSource};
use image::RgbImage;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

const FFPROBE: &str = "ffprobe";
const FFMPEG: &str = "ffmpeg";

/// Extensions routed to [`ContainerVideo`] by `open_video`.
pub const CONTAINER_EXTENSIONS: [&str; 10] = ["mp4", "m4v", "mov", "avi", "mkv", "webm", "mpg", "mpeg", "wmv", "flv"];

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: u32,
    height: u32,
    /// Exact frame count from `-count_packets`; ffprobe emits it as a string.
    nb_read_packets: Option<String>,
    /// Container metadata; absent or "N/A" for some formats.
    nb_frames: Option<String>,
}

/// First video stream of a container file. The stream is probed once on
/// open; each frame is then seeked and decoded by ffmpeg on request.
pub struct ContainerVideo {
    path: PathBuf,
    width: u32,
    height: u32,
    frames: usize,
}

impl ContainerVideo {
    pub fn open(path: &Path) -> Result<Self, VideoError> {
        let output = Command::new(FFPROBE)
            .args(["-v", "error"])
            .args(["-select_streams", "v:0"])
            .arg("-count_packets")
            .args(["-show_entries", "stream=width,height,nb_read_packets,nb_frames"])
            .args(["-of", "json"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .map_err(|e| VideoError::Unreadable(format!("{FFPROBE} not available: {e}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::Unreadable(format!("{}: {}", path.display(), stderr.trim())));
        }

        let (width, height, frames) = parse_probe(&output.stdout)
            .map_err(|reason| VideoError::Unreadable(format!("{}: {reason}", path.display())))?;

        tracing::debug!(path = %path.display(), width, height, frames, "opened container video");
        Ok(Self {
            path: path.to_path_buf(),
            width,
            height,
            frames,
        })
    }
}

/// Extract (width, height, frame count) of the first video stream.
fn parse_probe(stdout: &[u8]) -> Result<(u32, u32, usize), String> {
    let probe: ProbeOutput = serde_json::from_slice(stdout).map_err(|e| format!("bad ffprobe output: {e}"))?;
    let stream = probe.streams.into_iter().next().ok_or("no video stream")?;
    if stream.width == 0 || stream.height == 0 {
        return Err(format!("invalid frame size {}x{}", stream.width, stream.height));
    }

    let frames = [stream.nb_read_packets, stream.nb_frames]
        .into_iter()
        .flatten()
        .find_map(|n| n.trim().parse::<usize>().ok())
        .unwrap_or(0);

    Ok((stream.width, stream.height, frames))
}

/// Wrap raw rgb24 bytes from ffmpeg as a frame of the probed size.
fn frame_from_rgb24(index: usize, width: u32, height: u32, raw: Vec<u8>) -> Result<RgbImage, VideoError> {
    let got = raw.len();
    RgbImage::from_raw(width, height, raw).ok_or_else(|| VideoError::Frame {
        index,
        reason: format!("expected {width}x{height} rgb24 frame, got {got} bytes"),
    })
}

impl VideoSource for ContainerVideo {
    fn frame_count(&mut self) -> Result<usize, VideoError> {
        Ok(self.frames)
    }

    fn decode_frame(&mut self, index: usize) -> Result<RgbImage, VideoError> {
        let select = format!("select=eq(n\\,{index})");
        let output = Command::new(FFMPEG)
            .args(["-hide_banner", "-loglevel", "error", "-nostdin"])
            .arg("-i")
            .arg(&self.path)
            .args(["-an", "-sn"])
            .args(["-vf", &select])
            .args(["-frames:v", "1"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24", "-"])
            .stdin(Stdio::null())
            .output()
            .map_err(|e| VideoError::Frame {
                index,
                reason: format!("{FFMPEG} not available: {e}"),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(VideoError::Frame {
                index,
                reason: stderr.trim().to_string(),
            });
        }

        frame_from_rgb24(index, self.width, self.height, output.stdout)
    }
}
