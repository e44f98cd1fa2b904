//! Deterministic frame sampling for video analysis.

use thiserror::Error;

/// Number of frames sampled from a video when the caller does not say.
pub const DEFAULT_MAX_FRAMES: usize = 10;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SampleError {
    #[error("video reports no frames")]
    NoFrames,
    #[error("target frame count must be at least 1")]
    ZeroTarget,
}

/// Pick which frame indices to decode.
///
/// Short videos are taken whole. Longer ones get `target` indices spread
/// evenly over `[0, total - 1]`, each rounded to the nearest frame. Rounding
/// may produce repeated indices; they are kept.
pub fn sample_frame_indices(total: usize, target: usize) -> Result<Vec<usize>, SampleError> {
    if total == 0 {
        return Err(SampleError::NoFrames);
    }
    if target == 0 {
        return Err(SampleError::ZeroTarget);
    }
    if total <= target {
        return Ok((0..total).collect());
    }
    if target == 1 {
        return Ok(vec![0]);
    }

    let last = (total - 1) as f64;
    let step = last / (target - 1) as f64;
    Ok((0..target)
        .map(|i| {
            // Pin the endpoint so float error can never step past the last frame.
            if i == target - 1 {
                total - 1
            } else {
                ((i as f64 * step).round() as usize).min(total - 1)
            }
        })
        .collect())
}
