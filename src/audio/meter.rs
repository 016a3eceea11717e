//! Loudness metering for the visualizer side channel

use super::capture::AudioFrame;

/// Loudness scalar in [0.0, 1.0]
pub type VolumeSample = f32;

/// Measure the loudness of one frame
///
/// Root-mean-square amplitude clamped to [0.0, 1.0]. Pure and
/// deterministic; an empty frame measures 0.
pub fn measure(frame: &AudioFrame) -> VolumeSample {
    rms(&frame.samples)
}

/// RMS over raw mono f32 samples
pub fn rms(samples: &[f32]) -> VolumeSample {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt().clamp(0.0, 1.0)
}
