//! Process-wide detector instance.
//!
//! The detector is built once, on first use, and then shared read-only by
//! every caller. Concurrent first calls race on a one-time cell: exactly one
//! constructs, the rest wait and receive the same instance. A failed
//! construction leaves the cell empty so a later call can try again.

use crate::pipeline::{DetectError, Detector, DetectorConfig};
use once_cell::sync::OnceCell;

static DETECTOR: OnceCell<Detector> = OnceCell::new();

/// Return the shared detector, loading it from `config` on first use.
///
/// `config` is only read by the call that performs construction; later
/// calls get the existing instance regardless of what they pass.
pub fn shared_detector(config: &DetectorConfig) -> Result<&'static Detector, DetectError> {
    DETECTOR.get_or_try_init(|| {
        tracing::info!(
            model_dir = %config.model_dir.display(),
            device = %config.session.device,
            face_detection = config.face_detection,
            "initializing shared detector"
        );
        Detector::load(config)
    })
}

/// Whether the shared detector has been constructed.
pub fn is_initialized() -> bool {
    DETECTOR.get().is_some()
}
