//! deepcheck-core — Deepfake inference aggregation pipeline.
//!
//! Locates faces with SCRFD, classifies each face region as real or fake
//! with an EfficientNet-B4 head, and reduces region and frame predictions
//! into image and video verdicts. Both models run via ONNX Runtime.

pub mod classifier;
pub mod locator;
pub mod pipeline;
pub mod reducer;
pub mod region;
pub mod sampler;
pub mod session;
pub mod shared;
pub mod types;
pub mod video;

use std::path::PathBuf;

pub use classifier::{Classifier, ClassifierError, OnnxClassifier};
pub use locator::{FaceLocator, LocatorError, ScrfdLocator};
pub use pipeline::{DetectError, Detector, DetectorConfig, ErrorKind};
pub use sampler::{SampleError, DEFAULT_MAX_FRAMES};
pub use session::{Device, SessionOptions};
pub use shared::shared_detector;
pub use types::{BoundingBox, ClassProbabilities, DetectionReport, FrameSample, Label, RegionPrediction, Verdict};
pub use video::{VideoError, VideoSource};

/// SCRFD face detection model file name inside the model directory.
pub const LOCATOR_MODEL_FILE: &str = "det_10g.onnx";

/// Real/fake classifier model file name inside the model directory.
pub const CLASSIFIER_MODEL_FILE: &str = "efficientnet_b4_deepfake.onnx";

/// Default model directory: `$XDG_DATA_HOME/deepcheck/models`, falling back
/// to `~/.local/share/deepcheck/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("deepcheck/models")
}
