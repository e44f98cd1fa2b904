//! Detection entry points: image bytes or a video source in, report out.

use crate::classifier::{classify_region, Classifier, ClassifierError, OnnxClassifier};
use crate::locator::{FaceLocator, LocatorError, ScrfdLocator};
use crate::reducer::{reduce_frames, reduce_regions, ReduceError};
use crate::region::extract_regions;
use crate::sampler::{sample_frame_indices, SampleError};
use crate::session::SessionOptions;
use crate::types::{DetectionReport, FrameSample, Verdict};
use crate::video::{VideoError, VideoSource};
use image::RgbImage;
use std::path::PathBuf;
use thiserror::Error;

/// Which side is at fault when detection fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The submitted file is unusable; the caller can fix it.
    Input,
    /// The service failed while processing a valid file.
    Processing,
}

#[derive(Error, Debug)]
pub enum DetectError {
    #[error("unreadable image: {0}")]
    InvalidImage(#[from] image::ImageError),
    #[error("image has zero width or height")]
    EmptyImage,
    #[error(transparent)]
    Video(#[from] VideoError),
    #[error("cannot sample video: {0}")]
    Sample(#[from] SampleError),
    #[error("none of the {sampled} sampled frames could be decoded")]
    NoDecodableFrames { sampled: usize },
    #[error("face locator: {0}")]
    Locator(#[from] LocatorError),
    #[error("classifier: {0}")]
    Classifier(#[from] ClassifierError),
    #[error("reduction: {0}")]
    Reduce(#[from] ReduceError),
}

impl DetectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            DetectError::InvalidImage(_)
            | DetectError::EmptyImage
            | DetectError::Video(_)
            | DetectError::Sample(_)
            | DetectError::NoDecodableFrames { .. } => ErrorKind::Input,
            DetectError::Locator(_) | DetectError::Classifier(_) | DetectError::Reduce(_) => {
                ErrorKind::Processing
            }
        }
    }
}

/// Where and how to load the detector's models.
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    pub model_dir: PathBuf,
    pub session: SessionOptions,
    /// When false no locator is loaded and images are classified whole.
    pub face_detection: bool,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            model_dir: crate::default_model_dir(),
            session: SessionOptions::default(),
            face_detection: true,
        }
    }
}

impl DetectorConfig {
    pub fn locator_model_path(&self) -> String {
        self.model_dir
            .join(crate::LOCATOR_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }

    pub fn classifier_model_path(&self) -> String {
        self.model_dir
            .join(crate::CLASSIFIER_MODEL_FILE)
            .to_string_lossy()
            .into_owned()
    }
}

/// Face locator plus classifier, wired into the image and video pipelines.
pub struct Detector {
    locator: Option<Box<dyn FaceLocator>>,
    classifier: Box<dyn Classifier>,
}

impl Detector {
    pub fn new(classifier: Box<dyn Classifier>, locator: Option<Box<dyn FaceLocator>>) -> Self {
        Self { locator, classifier }
    }

    /// Load both ONNX models described by `config`.
    pub fn load(config: &DetectorConfig) -> Result<Self, DetectError> {
        let classifier = OnnxClassifier::load(&config.classifier_model_path(), &config.session)?;
        let locator: Option<Box<dyn FaceLocator>> = if config.face_detection {
            Some(Box::new(ScrfdLocator::load(&config.locator_model_path(), &config.session)?))
        } else {
            tracing::info!("face detection disabled; classifying whole images");
            None
        };
        Ok(Self::new(Box::new(classifier), locator))
    }

    /// Classify encoded image bytes.
    pub fn detect_image(&self, bytes: &[u8]) -> Result<DetectionReport, DetectError> {
        let image = image::load_from_memory(bytes)?.to_rgb8();
        let verdict = self.image_verdict(&image)?;
        tracing::info!(
            width = image.width(),
            height = image.height(),
            label = %verdict.label,
            confidence = verdict.confidence,
            "image analyzed"
        );
        Ok(verdict.into_report())
    }

    /// Sample up to `max_frames` frames from `source` and classify the video.
    ///
    /// Frames that fail to decode are skipped; at least one must succeed.
    pub fn detect_video(
        &self,
        source: &mut dyn VideoSource,
        max_frames: usize,
    ) -> Result<DetectionReport, DetectError> {
        let total = source.frame_count()?;
        let indices = sample_frame_indices(total, max_frames)?;

        let mut samples = Vec::with_capacity(indices.len());
        for &frame_index in &indices {
            let frame = match source.decode_frame(frame_index) {
                Ok(frame) => frame,
                Err(e) => {
                    tracing::debug!(frame = frame_index, error = %e, "skipping undecodable frame");
                    continue;
                }
            };
            if frame.width() == 0 || frame.height() == 0 {
                tracing::debug!(frame = frame_index, "skipping empty frame");
                continue;
            }
            let verdict = self.image_verdict(&frame)?;
            tracing::debug!(
                frame = frame_index,
                label = %verdict.label,
                confidence = verdict.confidence,
                "frame analyzed"
            );
            samples.push(FrameSample { frame_index, verdict });
        }

        if samples.is_empty() {
            return Err(DetectError::NoDecodableFrames { sampled: indices.len() });
        }

        let verdict = reduce_frames(&samples)?;
        tracing::info!(
            total_frames = total,
            sampled = indices.len(),
            analyzed = samples.len(),
            label = %verdict.label,
            confidence = verdict.confidence,
            "video analyzed"
        );
        Ok(verdict.into_report())
    }

    /// Extract regions, classify each, reduce to one verdict on the [0, 1] scale.
    pub fn image_verdict(&self, image: &RgbImage) -> Result<Verdict, DetectError> {
        if image.width() == 0 || image.height() == 0 {
            return Err(DetectError::EmptyImage);
        }

        let regions = extract_regions(image, self.locator.as_deref());
        let predictions = regions
            .iter()
            .map(|region| classify_region(region, self.classifier.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(reduce_regions(&predictions)?)
    }
}
