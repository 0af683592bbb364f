//! Top-decile loudness statistic.
//!
//! Loudness of a window is the mean of its highest 10% of sample values. The
//! cut index is fraction based (`floor(n * 0.9)`), so short windows average
//! nearly all of their samples.

use super::audio_source::Sample;

/// Relative loudness of one capture window.
pub type LoudnessValue = f64;

/// Share of the highest samples averaged by [`estimate`].
pub const DEFAULT_TOP_FRACTION: f64 = 0.1;

/// Mean of the highest 10% of `samples`, or 0 for an empty window.
pub fn estimate(samples: &[Sample]) -> LoudnessValue {
    estimate_top_fraction(samples, DEFAULT_TOP_FRACTION)
}

/// Mean of the highest `top_fraction` of `samples`.
///
/// The slice starts at `floor(n * (1 - top_fraction))`, clamped so it always
/// holds at least one sample.
pub fn estimate_top_fraction(samples: &[Sample], top_fraction: f64) -> LoudnessValue {
    if samples.is_empty() {
        return 0.0;
    }

    let mut sorted = samples.to_vec();
    sorted.sort_unstable();

    let n = sorted.len();
    let start = top_start_index(n, top_fraction);
    let top = &sorted[start..];

    let sum: f64 = top.iter().map(|&s| f64::from(s)).sum();
    sum / top.len() as f64
}

fn top_start_index(n: usize, top_fraction: f64) -> usize {
    let keep = (1.0 - top_fraction).clamp(0.0, 1.0);
    ((n as f64 * keep) as usize).min(n - 1)
}
