//! Region classification via an EfficientNet-B4 real/fake head on ONNX Runtime.
//!
//! The model contract is fixed: 224×224 RGB input, bilinear resize, values
//! scaled to [0, 1] and normalized with ImageNet channel statistics, NCHW
//! layout. Output is two logits ordered [real, fake].

use crate::region::Region;
use crate::session::{build_session, SessionOptions};
use crate::types::{ClassProbabilities, RegionPrediction};
use image::imageops::{self, FilterType};
use ndarray::{Array4, ArrayView4};
use ort::session::Session;
use ort::value::TensorRef;
use std::path::Path;
use std::sync::Mutex;
use thiserror::Error;

pub const CLASSIFIER_INPUT_SIZE: usize = 224;
const IMAGENET_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const IMAGENET_STD: [f32; 3] = [0.229, 0.224, 0.225];
const CLASSIFIER_NUM_CLASSES: usize = 2;

#[derive(Error, Debug)]
pub enum ClassifierError {
    #[error("model file not found: {0} — export the EfficientNet-B4 real/fake head to ONNX and place it in the model dir")]
    ModelNotFound(String),
    #[error("inference failed: {0}")]
    InferenceFailed(String),
    #[error("region is empty ({width}x{height})")]
    EmptyRegion { width: u32, height: u32 },
    #[error("classifier returned invalid probabilities: real={real}, fake={fake}")]
    InvalidOutput { real: f32, fake: f32 },
    #[error("session lock poisoned")]
    Poisoned,
    #[error("ort: {0}")]
    Ort(#[from] ort::Error),
}

/// Opaque two-class classification capability.
///
/// Receives a preprocessed 1×3×224×224 tensor and returns the class
/// distribution.
pub trait Classifier: Send + Sync {
    fn classify(&self, input: ArrayView4<'_, f32>) -> Result<ClassProbabilities, ClassifierError>;
}

/// EfficientNet-B4 classifier backed by an ONNX session.
pub struct OnnxClassifier {
    session: Mutex<Session>,
}

impl OnnxClassifier {
    /// Load the classifier ONNX model from the given path.
    pub fn load(model_path: &str, options: &SessionOptions) -> Result<Self, ClassifierError> {
        if !Path::new(model_path).exists() {
            return Err(ClassifierError::ModelNotFound(model_path.to_string()));
        }

        let session = build_session(model_path, options)?;

        tracing::info!(
            path = model_path,
            device = %options.device,
            inputs = ?session.inputs().iter().map(|i| (i.name(), i.dtype())).collect::<Vec<_>>(),
            outputs = ?session.outputs().iter().map(|o| o.name()).collect::<Vec<_>>(),
            "loaded EfficientNet classifier"
        );

        Ok(Self {
            session: Mutex::new(session),
        })
    }
}

impl Classifier for OnnxClassifier {
    fn classify(&self, input: ArrayView4<'_, f32>) -> Result<ClassProbabilities, ClassifierError> {
        let mut session = self.session.lock().map_err(|_| ClassifierError::Poisoned)?;
        let outputs = session.run(ort::inputs![TensorRef::from_array_view(input)?])?;

        let (_, logits) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| ClassifierError::InferenceFailed(format!("logit extraction: {e}")))?;

        if logits.len() != CLASSIFIER_NUM_CLASSES {
            return Err(ClassifierError::InferenceFailed(format!(
                "expected {CLASSIFIER_NUM_CLASSES} logits, got {}",
                logits.len()
            )));
        }

        Ok(softmax2(logits[0], logits[1]))
    }
}

/// Normalize `region` and classify it. Errors propagate unchanged.
pub fn classify_region(region: &Region<'_>, classifier: &dyn Classifier) -> Result<RegionPrediction, ClassifierError> {
    if region.width() == 0 || region.height() == 0 {
        return Err(ClassifierError::EmptyRegion {
            width: region.width(),
            height: region.height(),
        });
    }

    let input = preprocess(region);
    let probs = classifier.classify(input.view())?;

    let valid = |p: f32| p.is_finite() && (0.0..=1.0).contains(&p);
    if !valid(probs.real) || !valid(probs.fake) {
        return Err(ClassifierError::InvalidOutput {
            real: probs.real,
            fake: probs.fake,
        });
    }

    let prediction = RegionPrediction::from_probabilities(probs);
    tracing::debug!(
        x1 = region.x1,
        y1 = region.y1,
        x2 = region.x2,
        y2 = region.y2,
        class = %prediction.class,
        confidence = prediction.confidence,
        "region classified"
    );
    Ok(prediction)
}

/// Resize a region to 224×224 and normalize into a NCHW float tensor.
pub fn preprocess(region: &Region<'_>) -> Array4<f32> {
    let size = CLASSIFIER_INPUT_SIZE as u32;
    let resized = imageops::resize(&region.crop(), size, size, FilterType::Triangle);

    let mut tensor = Array4::<f32>::zeros((1, 3, CLASSIFIER_INPUT_SIZE, CLASSIFIER_INPUT_SIZE));
    for (x, y, pixel) in resized.enumerate_pixels() {
        for c in 0..3 {
            let value = pixel[c] as f32 / 255.0;
            tensor[[0, c, y as usize, x as usize]] = (value - IMAGENET_MEAN[c]) / IMAGENET_STD[c];
        }
    }
    tensor
}

fn softmax2(real_logit: f32, fake_logit: f32) -> ClassProbabilities {
    let max = real_logit.max(fake_logit);
    let real = (real_logit - max).exp();
    let fake = (fake_logit - max).exp();
    let sum = real + fake;
    ClassProbabilities {
        real: real / sum,
        fake: fake / sum,
    }
}
