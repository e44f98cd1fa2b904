use crate::config::Config;
use crate::engine::{EngineError, EngineHandle};
use crate::store::{sha256_file, sha256_hex, FileType, HistoryStore, ScanRecord};
use deepcheck_core::{DetectionReport, Device, ErrorKind};
use std::path::{Path, PathBuf};
use zbus::interface;

pub const BUS_NAME: &str = "org.deepcheck.Detector1";
pub const OBJECT_PATH: &str = "/org/deepcheck/Detector1";

const DEFAULT_HISTORY_LIMIT: u32 = 10;

/// D-Bus interface for the deepcheck detection daemon.
///
/// Bus name: org.deepcheck.Detector1
/// Object path: /org/deepcheck/Detector1
pub struct DetectorService {
    engine: EngineHandle,
    store: HistoryStore,
    max_frames: usize,
    device: Device,
    model_dir: PathBuf,
    face_detection: bool,
}

impl DetectorService {
    pub fn new(engine: EngineHandle, store: HistoryStore, config: &Config) -> Self {
        Self {
            engine,
            store,
            max_frames: config.max_frames,
            device: config.device,
            model_dir: config.model_dir.clone(),
            face_detection: config.face_detection,
        }
    }

    /// Persist a finished scan. History is best-effort: a write failure is
    /// logged and the verdict is still returned.
    async fn remember(&self, record: ScanRecord) -> Option<ScanRecord> {
        match self.store.record(record.clone()).await {
            Ok(()) => Some(record),
            Err(e) => {
                tracing::warn!(error = %e, file = %record.filename, "failed to record scan history");
                None
            }
        }
    }
}

#[interface(name = "org.deepcheck.Detector1")]
impl DetectorService {
    /// Classify the image file at `path`. Returns the verdict as JSON.
    async fn detect_image(&self, path: &str) -> zbus::fdo::Result<String> {
        tracing::info!(path, "detect_image requested");
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| zbus::fdo::Error::InvalidArgs(format!("cannot read {path}: {e}")))?;

        let report = self.engine.detect_image(bytes.clone()).await.map_err(to_fdo)?;

        let record = ScanRecord::new(&file_name(path), FileType::Image, &report, Some(sha256_hex(&bytes)));
        let stored = self.remember(record).await;
        Ok(detection_json(&report, stored.as_ref()))
    }

    /// Classify the video at `path`, sampling up to `max_frames` frames
    /// (0 means the configured default). Returns the verdict as JSON.
    async fn detect_video(&self, path: &str, max_frames: u32) -> zbus::fdo::Result<String> {
        let max_frames = if max_frames == 0 { self.max_frames } else { max_frames as usize };
        tracing::info!(path, max_frames, "detect_video requested");

        let report = self
            .engine
            .detect_video(PathBuf::from(path), max_frames)
            .await
            .map_err(to_fdo)?;

        let digest = if Path::new(path).is_file() {
            let file = PathBuf::from(path);
            match tokio::task::spawn_blocking(move || sha256_file(&file)).await {
                Ok(Ok(digest)) => Some(digest),
                Ok(Err(e)) => {
                    tracing::warn!(path, error = %e, "cannot hash video");
                    None
                }
                Err(e) => {
                    tracing::warn!(path, error = %e, "hashing task failed");
                    None
                }
            }
        } else {
            None
        };
        let record = ScanRecord::new(&file_name(path), FileType::Video, &report, digest);
        let stored = self.remember(record).await;
        Ok(detection_json(&report, stored.as_ref()))
    }

    /// Return the most recent scans as a JSON array, newest first.
    async fn history(&self, limit: u32) -> zbus::fdo::Result<String> {
        let limit = if limit == 0 { DEFAULT_HISTORY_LIMIT } else { limit };
        let records = self
            .store
            .recent(limit as usize)
            .await
            .map_err(|e| zbus::fdo::Error::Failed(e.to_string()))?;
        serde_json::to_string(&records).map_err(|e| zbus::fdo::Error::Failed(e.to_string()))
    }

    /// Return daemon status information.
    async fn status(&self) -> zbus::fdo::Result<String> {
        Ok(serde_json::json!({
            "status": "healthy",
            "version": env!("CARGO_PKG_VERSION"),
            "device": self.device.to_string(),
            "model_dir": self.model_dir.display().to_string(),
            "face_detection": self.face_detection,
            "max_frames": self.max_frames,
            "models_loaded": deepcheck_core::shared::is_initialized(),
        })
        .to_string())
    }
}

/// Input problems become `InvalidArgs`, everything else `Failed`.
fn to_fdo(err: EngineError) -> zbus::fdo::Error {
    tracing::warn!(error = %err, kind = ?err.kind(), "detection failed");
    match err.kind() {
        ErrorKind::Input => zbus::fdo::Error::InvalidArgs(err.to_string()),
        ErrorKind::Processing => zbus::fdo::Error::Failed(format!("processing error: {err}")),
    }
}

fn detection_json(report: &DetectionReport, record: Option<&ScanRecord>) -> String {
    serde_json::json!({
        "label": report.label,
        "confidence": report.confidence,
        "reasoning": report.reasoning,
        "scan_id": record.map(|r| r.id.as_str()),
        "timestamp": record.map(|r| r.timestamp.as_str()),
    })
    .to_string()
}

fn file_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use deepcheck_core::{DetectError, Label, SampleError};

    #[test]
    fn test_input_errors_map_to_invalid_args() {
        let err = EngineError::Detect(DetectError::Sample(SampleError::NoFrames));
        assert!(matches!(to_fdo(err), zbus::fdo::Error::InvalidArgs(_)));
    }

    #[test]
    fn test_processing_errors_map_to_failed() {
        assert!(matches!(to_fdo(EngineError::ChannelClosed), zbus::fdo::Error::Failed(_)));
    }

    #[test]
    fn test_detection_json_shape() {
        let report = DetectionReport {
            label: Label::Fake,
            confidence: 72.0,
            reasoning: "Analyzed 10 frames from video.".into(),
        };
        let value: serde_json::Value = serde_json::from_str(&detection_json(&report, None)).unwrap();
        assert_eq!(value["label"], "FAKE");
        assert_eq!(value["confidence"], 72.0);
        assert_eq!(value["reasoning"], "Analyzed 10 frames from video.");
        assert!(value["scan_id"].is_null());
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("/tmp/uploads/a.gif"), "a.gif");
        assert_eq!(file_name("frames/"), "frames");
    }
}
