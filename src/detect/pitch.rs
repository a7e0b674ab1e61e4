//! Stage 5: Pitch estimation
//!
//! Autocorrelation-difference search over the sustained part of a note.
//! `r(lag)` is the summed absolute difference between the signal and itself
//! shifted by `lag`. It rises to a maximum around half the period and falls
//! to a minimum at the period. Lags are stepped geometrically (evenly in
//! pitch), and both extrema must hold for `latch_count` samples of lag
//! before they are accepted, which keeps harmonics and transient wiggles
//! from ending the search early.

use crate::audio::SampleSource;
use crate::config::{seconds_to_samples, PitchConfig};
use crate::error::Result as SplitResult;
use serde::{Deserialize, Serialize};

/// Detected fundamental of a note
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PitchEstimate {
    /// Fundamental in Hz; 0.0 when undetermined
    pub frequency_hz: f32,
    /// `false` for best guesses and undetermined pitch
    pub confident: bool,
}

impl PitchEstimate {
    pub fn indeterminate() -> Self {
        Self {
            frequency_hz: 0.0,
            confident: false,
        }
    }

    pub fn is_determined(&self) -> bool {
        self.frequency_hz > 0.0
    }
}

/// Estimate the pitch of the note starting at `onset`.
///
/// The analysis buffer skips the attack (`attack_skip_s`) and spans up to
/// `analysis_window_s` or the end of the stream.
pub fn estimate_pitch<S: SampleSource + ?Sized>(
    source: &mut S,
    onset: usize,
    config: &PitchConfig,
) -> SplitResult<PitchEstimate> {
    let sr = source.sample_rate();
    let total = source.total_frame_count();
    let start = onset + seconds_to_samples(config.attack_skip_s, sr);

    if start >= total {
        log::warn!(
            "can't find pitch: analysis start {} is past the end of the stream ({})",
            start,
            total
        );
        return Ok(PitchEstimate::indeterminate());
    }

    let end = total
        .saturating_sub(1)
        .min(start + seconds_to_samples(config.analysis_window_s, sr));
    let samples = source.read_reference_range(start, end)?;

    Ok(estimate_from_samples(&samples, sr, config))
}

/// Pitch of a buffer of reference-channel samples
pub fn estimate_from_samples(samples: &[f32], sr: u32, config: &PitchConfig) -> PitchEstimate {
    let length = samples.len() / 2;
    let lag_bound = ((sr as f32 / config.min_freq_hz) as usize)
        .min(samples.len().saturating_sub(length + 1));
    let latch = config.latch_count;

    let mut lag = config.initial_lag.max(1);
    let mut evaluated: Vec<usize> = Vec::new();

    // Phase 1: first sustained maximum
    let mut max_r = 0.0f64;
    let mut max_at: Option<usize> = None;
    let mut latched = false;
    while lag < lag_bound {
        let r = difference_at(samples, lag, length);
        evaluated.push(lag);
        if r > max_r {
            max_r = r;
            max_at = Some(lag);
        }
        if let Some(at) = max_at {
            if lag - at >= latch {
                latched = true;
                break;
            }
        }
        lag = next_lag(lag, sr, config.autocorrelation_step);
    }

    if !latched {
        log::warn!(
            "can't find pitch (1): max at {:?}, lag {}, bound {}, latch {}",
            max_at,
            lag,
            lag_bound,
            latch
        );
        return PitchEstimate::indeterminate();
    }

    // Phase 2: next sustained minimum, well below the maximum
    let limit = max_r / config.max_ratio_divisor as f64;
    let mut min_r = f64::MAX;
    let mut min_at: Option<usize> = None;
    let mut confident = false;
    while lag < lag_bound {
        let r = difference_at(samples, lag, length);
        if evaluated.last() != Some(&lag) {
            evaluated.push(lag);
        }
        if r < min_r {
            min_r = r;
            min_at = Some(lag);
        }
        if let Some(at) = min_at {
            if lag - at >= latch && min_r < limit {
                confident = true;
                break;
            }
        }
        lag = next_lag(lag, sr, config.autocorrelation_step);
    }

    let period = match min_at {
        Some(at) => at,
        None => {
            log::warn!("can't find pitch (2): no lag left after the maximum at {:?}", max_at);
            return PitchEstimate::indeterminate();
        }
    };

    if !confident {
        log::warn!(
            "can't find pitch (2), returning best guess: max {:.1} at {:?}, min {:.1} at {}, limit {:.1}, lag {}",
            max_r,
            max_at,
            min_r,
            period,
            limit,
            lag
        );
    }

    let period = if config.refine_period {
        refine_period(samples, length, &evaluated, period, lag_bound)
    } else {
        period as f64
    };

    let frequency_hz = (sr as f64 / period) as f32;
    if frequency_hz > config.max_freq_hz {
        log::warn!(
            "pitch {:.1} Hz above {:.1} Hz, keeping it as a guess",
            frequency_hz,
            config.max_freq_hz
        );
        return PitchEstimate {
            frequency_hz,
            confident: false,
        };
    }

    log::debug!(
        "pitch {:.2} Hz (period {:.2} samples, confident {})",
        frequency_hz,
        period,
        confident
    );
    PitchEstimate {
        frequency_hz,
        confident,
    }
}

/// `r(lag)`: sum of `|s[t] - s[t + lag]|` for `t` in `1..length`
pub fn difference_at(samples: &[f32], lag: usize, length: usize) -> f64 {
    samples[1..length]
        .iter()
        .zip(&samples[1 + lag..length + lag])
        .map(|(&a, &b)| (a as f64 - b as f64).abs())
        .sum()
}

/// Next lag one pitch step (1/`steps_per_octave` octave) lower, at least one sample on
pub fn next_lag(lag: usize, sr: u32, steps_per_octave: f32) -> usize {
    let rate = sr as f64;
    let steps = steps_per_octave as f64;
    let position = steps * (rate / lag as f64).log2();
    let stepped = (rate / 2f64.powf((position - 1.0) / steps)) as usize;
    stepped.max(lag + 1)
}

/// Scan every integer lag between the coarse neighbours of `coarse`, then
/// interpolate a parabola through the best one and its neighbours.
fn refine_period(
    samples: &[f32],
    length: usize,
    evaluated: &[usize],
    coarse: usize,
    lag_bound: usize,
) -> f64 {
    let position = evaluated.iter().position(|&lag| lag == coarse);
    let (lo, hi) = match position {
        Some(i) => {
            let lo = if i > 0 { evaluated[i - 1] } else { coarse };
            let hi = evaluated.get(i + 1).copied().unwrap_or(coarse + (coarse - lo));
            (lo.max(1), hi.min(lag_bound.saturating_sub(1)))
        }
        None => (coarse, coarse),
    };

    let mut best = coarse;
    let mut best_r = difference_at(samples, coarse, length);
    for lag in lo..=hi {
        let r = difference_at(samples, lag, length);
        if r < best_r {
            best = lag;
            best_r = r;
        }
    }

    if best < 2 || best + 1 >= lag_bound {
        return best as f64;
    }

    let below = difference_at(samples, best - 1, length);
    let above = difference_at(samples, best + 1, length);
    let curvature = below - 2.0 * best_r + above;
    if curvature <= 0.0 {
        return best as f64;
    }
    let offset = (0.5 * (below - above) / curvature).clamp(-0.5, 0.5);
    best as f64 + offset
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sr: u32, seconds: f32) -> Vec<f32> {
        (0..(seconds * sr as f32) as usize)
            .map(|i| 0.5 * (2.0 * PI * freq * i as f32 / sr as f32).sin())
            .collect()
    }

    #[test]
    fn test_next_lag_is_geometric() {
        // one sample at a time while a semitone is less than a sample
        assert_eq!(next_lag(4, 48000, 12.0), 5);
        assert_eq!(next_lag(16, 48000, 12.0), 17);
        // 100 * 2^(1/12) = 105.9
        assert_eq!(next_lag(100, 48000, 12.0), 105);
        assert_eq!(next_lag(1000, 48000, 12.0), 1059);
    }

    #[test]
    fn test_difference_function() {
        let samples = vec![0.0, 1.0, 0.0, 1.0, 0.0, 1.0, 0.0, 1.0];
        // period 2: identical
        assert_eq!(difference_at(&samples, 2, 4), 0.0);
        // half period: every pair differs by 1, t = 1..4
        assert_eq!(difference_at(&samples, 1, 4), 3.0);
    }

    #[test]
    fn test_sine_pitch_within_one_percent() {
        let config = PitchConfig::default();
        for &freq in &[110.0f32, 440.0, 659.25] {
            let samples = sine(freq, 48000, 1.0);
            let estimate = estimate_from_samples(&samples, 48000, &config);
            assert!(estimate.confident, "{} Hz should be confident", freq);
            let error = (estimate.frequency_hz - freq).abs() / freq;
            assert!(error < 0.01, "{} Hz estimated as {}", freq, estimate.frequency_hz);
        }
    }

    #[test]
    fn test_coarse_search_only() {
        let config = PitchConfig {
            refine_period: false,
            ..PitchConfig::default()
        };
        let estimate = estimate_from_samples(&sine(440.0, 48000, 1.0), 48000, &config);
        assert!(estimate.confident);
        // coarse lags only land within a semitone step
        assert!((estimate.frequency_hz - 440.0).abs() / 440.0 < 0.06);
    }

    #[test]
    fn test_silence_is_indeterminate() {
        let config = PitchConfig::default();
        let estimate = estimate_from_samples(&vec![0.0; 48000], 48000, &config);
        assert_eq!(estimate, PitchEstimate::indeterminate());
    }

    #[test]
    fn test_too_short_buffer_is_indeterminate() {
        let config = PitchConfig::default();
        let estimate = estimate_from_samples(&sine(440.0, 48000, 0.001), 48000, &config);
        assert!(!estimate.is_determined());
    }
}
