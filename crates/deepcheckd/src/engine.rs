use deepcheck_core::{shared_detector, DetectError, DetectionReport, DetectorConfig, ErrorKind};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Detect(#[from] DetectError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Detect(e) => e.kind(),
            EngineError::Spawn(_) | EngineError::ChannelClosed => ErrorKind::Processing,
        }
    }
}

/// Messages sent from D-Bus handlers to the engine thread.
enum EngineRequest {
    DetectImage {
        bytes: Vec<u8>,
        reply: oneshot::Sender<Result<DetectionReport, EngineError>>,
    },
    DetectVideo {
        path: PathBuf,
        max_frames: usize,
        reply: oneshot::Sender<Result<DetectionReport, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Classify encoded image bytes.
    pub async fn detect_image(&self, bytes: Vec<u8>) -> Result<DetectionReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::DetectImage { bytes, reply: reply_tx })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }

    /// Sample and classify the video at `path`.
    pub async fn detect_video(&self, path: PathBuf, max_frames: usize) -> Result<DetectionReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::DetectVideo {
                path,
                max_frames,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Requests are served one at a time. The shared detector is built on the
/// first request, so a missing model surfaces as a processing error on
/// that request rather than at startup.
pub fn spawn_engine(config: DetectorConfig) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("deepcheck-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::DetectImage { bytes, reply } => {
                        let result = run_image(&config, &bytes);
                        let _ = reply.send(result.map_err(EngineError::from));
                    }
                    EngineRequest::DetectVideo {
                        path,
                        max_frames,
                        reply,
                    } => {
                        let result = run_video(&config, &path, max_frames);
                        let _ = reply.send(result.map_err(EngineError::from));
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

fn run_image(config: &DetectorConfig, bytes: &[u8]) -> Result<DetectionReport, DetectError> {
    // Reject undecodable uploads before paying for model construction.
    image::guess_format(bytes)?;
    shared_detector(config)?.detect_image(bytes)
}

fn run_video(config: &DetectorConfig, path: &Path, max_frames: usize) -> Result<DetectionReport, DetectError> {
    let mut source = deepcheck_media::open_video(path)?;
    shared_detector(config)?.detect_video(source.as_mut(), max_frames)
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepcheck_core::VideoError;

    fn missing_models() -> DetectorConfig {
        DetectorConfig {
            model_dir: PathBuf::from("/nonexistent/deepcheck-models"),
            ..DetectorConfig::default()
        }
    }

    #[tokio::test]
    async fn test_garbage_image_is_input_error() {
        let engine = spawn_engine(missing_models()).unwrap();
        let err = engine.detect_image(b"not an image".to_vec()).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Input);
    }

    #[tokio::test]
    async fn test_missing_video_is_input_error() {
        let engine = spawn_engine(missing_models()).unwrap();
        let err = engine
            .detect_video(PathBuf::from("/nonexistent/clip.gif"), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Detect(DetectError::Video(VideoError::NotFound(_)))));
        assert_eq!(err.kind(), ErrorKind::Input);
    }

    #[tokio::test]
    async fn test_missing_model_is_processing_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("face.png");
        image::RgbImage::new(8, 8).save(&path).unwrap();
        let bytes = std::fs::read(&path).unwrap();

        let engine = spawn_engine(missing_models()).unwrap();
        let err = engine.detect_image(bytes).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Processing);
    }
}
