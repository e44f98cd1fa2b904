use serde::{Deserialize, Serialize};
use std::fmt;

/// Bounding box for a located face, in source image pixels.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
}

/// Binary authenticity class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Label {
    Real,
    Fake,
}

impl Label {
    /// Numeric code used by majority reduction: REAL=0, FAKE=1.
    pub fn code(self) -> u8 {
        match self {
            Label::Real => 0,
            Label::Fake => 1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Label::Real => "REAL",
            Label::Fake => "FAKE",
        }
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Two-class probability distribution returned by a classifier.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassProbabilities {
    pub real: f32,
    pub fake: f32,
}

/// Classification of a single region.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegionPrediction {
    pub class: Label,
    /// Probability of `class`, in [0, 1].
    pub confidence: f32,
}

impl RegionPrediction {
    /// Argmax over the two classes. Equal scores resolve to REAL.
    pub fn from_probabilities(probs: ClassProbabilities) -> Self {
        if probs.fake > probs.real {
            Self { class: Label::Fake, confidence: probs.fake }
        } else {
            Self { class: Label::Real, confidence: probs.real }
        }
    }
}

/// Aggregated decision for an image or a video, on the [0, 1] scale.
///
/// `confidence` is the probability mass of `label`, never of the opposite class.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub label: Label,
    pub confidence: f32,
    pub rationale: String,
}

impl Verdict {
    /// Convert to the outward-facing report: percentage scale, two decimals.
    pub fn into_report(self) -> DetectionReport {
        DetectionReport {
            label: self.label,
            confidence: round2(f64::from(self.confidence) * 100.0),
            reasoning: self.rationale,
        }
    }
}

/// Verdict for one sampled video frame.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameSample {
    pub frame_index: usize,
    pub verdict: Verdict,
}

/// Result returned to callers of the detection entry points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionReport {
    pub label: Label,
    /// Confidence in `label`, 0–100 with two decimals.
    pub confidence: f64,
    pub reasoning: String,
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_argmax_fake() {
        let p = RegionPrediction::from_probabilities(ClassProbabilities { real: 0.2, fake: 0.8 });
        assert_eq!(p.class, Label::Fake);
        assert!((p.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_argmax_tie_is_real() {
        let p = RegionPrediction::from_probabilities(ClassProbabilities { real: 0.5, fake: 0.5 });
        assert_eq!(p.class, Label::Real);
        assert!((p.confidence - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_report_scales_and_rounds() {
        let verdict = Verdict {
            label: Label::Fake,
            confidence: 0.123456,
            rationale: "x".into(),
        };
        let report = verdict.into_report();
        assert_eq!(report.label, Label::Fake);
        assert!((report.confidence - 12.35).abs() < 1e-4, "got {}", report.confidence);
        assert_eq!(report.reasoning, "x");
    }

    #[test]
    fn test_report_serializes_two_decimals() {
        let verdict = Verdict {
            label: Label::Real,
            confidence: 0.123456,
            rationale: "x".into(),
        };
        let json = serde_json::to_string(&verdict.into_report()).unwrap();
        assert!(json.contains("\"confidence\":12.35,"), "got {json}");
    }

    #[test]
    fn test_label_serializes_uppercase() {
        let json = serde_json::to_string(&Label::Fake).unwrap();
        assert_eq!(json, "\"FAKE\"");
        assert_eq!(Label::Real.to_string(), "REAL");
    }
}
