//! Stage 3: Noise floor measurement

use crate::audio::SampleSource;
use crate::error::{Result as SplitResult, SplitError};
use crate::level::RmsBuffer;

/// Probes shorter than `sample_rate / MIN_PROBE_DIVISOR` are too short to mean anything.
pub const MIN_PROBE_DIVISOR: u32 = 200;

/// RMS level in dBFS of `duration` samples starting at `start`.
///
/// Returns `None` when the probe is too short to be measured; the caller
/// falls back to the last known noise level.
pub fn measure_noise<S: SampleSource + ?Sized>(
    source: &mut S,
    start: usize,
    duration: usize,
) -> SplitResult<Option<f32>> {
    if duration < (source.sample_rate() / MIN_PROBE_DIVISOR) as usize || duration == 0 {
        return Ok(None);
    }

    let total = source.total_frame_count();
    let mut buf = RmsBuffer::new(duration);
    source.seek(start.min(total))?;
    for frame in start..start + duration {
        match source.read_reference()? {
            Some(sample) => buf.add_sample(sample),
            None => return Err(SplitError::StreamReadError { frame, total }),
        }
    }

    Ok(Some(buf.rms_db()))
}

/// Probe region ahead of `onset`: starts up to `lookback` samples earlier
/// (never before 0) and spans half of that gap, at most `max_probe` samples.
pub fn noise_probe(onset: usize, lookback: usize, max_probe: usize) -> (usize, usize) {
    let start = onset.saturating_sub(lookback);
    let duration = max_probe.min((onset - start) / 2);
    (start, duration)
}
