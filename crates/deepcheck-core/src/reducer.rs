//! Verdict reduction: region predictions → image verdict, frame verdicts → video verdict.
//!
//! Both reducers work on the [0, 1] scale. Percentage scaling happens in
//! [`Verdict::into_report`].

use crate::types::{FrameSample, Label, RegionPrediction, Verdict};
use thiserror::Error;

pub const IMAGE_RATIONALE: &str = "AI-based EfficientNet-B4 classification result.";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ReduceError {
    #[error("nothing to reduce: {0} list is empty")]
    Empty(&'static str),
}

/// Combine per-region predictions into one image verdict.
///
/// The label is FAKE only when the mean class code (REAL=0, FAKE=1) is
/// strictly above 0.5. Confidence is the mean region confidence when FAKE,
/// and its complement when REAL.
pub fn reduce_regions(predictions: &[RegionPrediction]) -> Result<Verdict, ReduceError> {
    if predictions.is_empty() {
        return Err(ReduceError::Empty("region prediction"));
    }

    let n = predictions.len() as f32;
    let avg_code = predictions.iter().map(|p| p.class.code() as f32).sum::<f32>() / n;
    let avg_confidence = predictions.iter().map(|p| p.confidence).sum::<f32>() / n;

    let (label, confidence) = if avg_code > 0.5 {
        (Label::Fake, avg_confidence)
    } else {
        (Label::Real, 1.0 - avg_confidence)
    };

    Ok(Verdict {
        label,
        confidence,
        rationale: IMAGE_RATIONALE.to_string(),
    })
}

/// Combine per-frame verdicts into one video verdict.
///
/// Strict majority vote on labels; half or fewer FAKE frames yields REAL.
/// Confidence is the plain mean of every frame's confidence, whatever each
/// frame's label.
pub fn reduce_frames(frames: &[FrameSample]) -> Result<Verdict, ReduceError> {
    if frames.is_empty() {
        return Err(ReduceError::Empty("frame sample"));
    }

    let total = frames.len();
    let fake_count = frames.iter().filter(|f| f.verdict.label == Label::Fake).count();
    let confidence = frames.iter().map(|f| f.verdict.confidence).sum::<f32>() / total as f32;

    let label = if fake_count * 2 > total { Label::Fake } else { Label::Real };

    Ok(Verdict {
        label,
        confidence,
        rationale: format!("Analyzed {total} frames from video."),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pred(class: Label, confidence: f32) -> RegionPrediction {
        RegionPrediction { class, confidence }
    }

    fn frame(frame_index: usize, label: Label, confidence: f32) -> FrameSample {
        FrameSample {
            frame_index,
            verdict: Verdict {
                label,
                confidence,
                rationale: IMAGE_RATIONALE.to_string(),
            },
        }
    }

    #[test]
    fn test_all_real_reports_complement() {
        for c in [0.5f32, 0.75, 0.99] {
            let preds = vec![pred(Label::Real, c); 3];
            let v = reduce_regions(&preds).unwrap();
            assert_eq!(v.label, Label::Real);
            assert!((v.confidence - (1.0 - c)).abs() < 1e-6);
            assert_eq!(v.rationale, IMAGE_RATIONALE);
        }
    }

    #[test]
    fn test_all_fake_reports_mean() {
        for c in [0.5f32, 0.8, 0.97] {
            let preds = vec![pred(Label::Fake, c); 4];
            let v = reduce_regions(&preds).unwrap();
            assert_eq!(v.label, Label::Fake);
            assert!((v.confidence - c).abs() < 1e-6);
        }
    }

    #[test]
    fn test_region_tie_resolves_real() {
        let preds = [pred(Label::Real, 0.9), pred(Label::Fake, 0.9)];
        let v = reduce_regions(&preds).unwrap();
        assert_eq!(v.label, Label::Real);
        assert!((v.confidence - 0.1).abs() < 1e-6);
        assert!((v.into_report().confidence - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_region_majority_fake_mixes_confidences() {
        let preds = [pred(Label::Fake, 0.9), pred(Label::Fake, 0.7), pred(Label::Real, 0.8)];
        let v = reduce_regions(&preds).unwrap();
        assert_eq!(v.label, Label::Fake);
        assert!((v.confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_region_order_independent() {
        let a = [pred(Label::Fake, 0.6), pred(Label::Real, 0.9), pred(Label::Fake, 0.7)];
        let b = [a[2], a[0], a[1]];
        assert_eq!(reduce_regions(&a).unwrap().label, reduce_regions(&b).unwrap().label);
        assert!((reduce_regions(&a).unwrap().confidence - reduce_regions(&b).unwrap().confidence).abs() < 1e-6);
    }

    #[test]
    fn test_reduce_regions_empty() {
        assert_eq!(reduce_regions(&[]), Err(ReduceError::Empty("region prediction")));
    }

    #[test]
    fn test_video_majority_fake() {
        let mut frames: Vec<FrameSample> = (0..6).map(|i| frame(i, Label::Fake, 0.8)).collect();
        frames.extend((6..10).map(|i| frame(i, Label::Real, 0.6)));

        let v = reduce_frames(&frames).unwrap();
        assert_eq!(v.label, Label::Fake);
        assert!((v.confidence - 0.72).abs() < 1e-6);
        assert_eq!(v.rationale, "Analyzed 10 frames from video.");
        assert!((v.into_report().confidence - 72.0).abs() < 1e-4);
    }

    #[test]
    fn test_video_half_fake_is_real() {
        let frames = vec![
            frame(0, Label::Fake, 0.9),
            frame(1, Label::Real, 0.2),
            frame(2, Label::Fake, 0.9),
            frame(3, Label::Real, 0.2),
        ];
        let v = reduce_frames(&frames).unwrap();
        assert_eq!(v.label, Label::Real);
        // Mean across both labels, not conditioned on the winner.
        assert!((v.confidence - 0.55).abs() < 1e-6);
    }

    #[test]
    fn test_video_single_frame() {
        let v = reduce_frames(&[frame(0, Label::Fake, 0.66)]).unwrap();
        assert_eq!(v.label, Label::Fake);
        assert!((v.confidence - 0.66).abs() < 1e-6);
        assert_eq!(v.rationale, "Analyzed 1 frames from video.");
    }

    #[test]
    fn test_reduce_frames_empty() {
        assert_eq!(reduce_frames(&[]), Err(ReduceError::Empty("frame sample")));
    }
}
