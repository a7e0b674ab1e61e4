//! Stage 1: Trigger location

use crate::audio::SampleSource;
use crate::error::Result as SplitResult;
use crate::level::{db2v, v2db};

/// Scan forward from `start` for the first sample whose magnitude strictly
/// exceeds `trigger_db`.
///
/// Returns `None` when the stream ends first, which means the take has no
/// more notes.
pub fn find_trigger<S: SampleSource + ?Sized>(
    source: &mut S,
    start: usize,
    trigger_db: f32,
) -> SplitResult<Option<usize>> {
    if start >= source.total_frame_count() {
        return Ok(None);
    }

    let threshold = db2v(trigger_db);
    source.seek(start)?;

    let mut index = start;
    while let Some(sample) = source.read_reference()? {
        if sample.abs() > threshold {
            log::debug!(
                "trigger at {} ({:.1} dB > {:.1} dB)",
                index,
                v2db(sample),
                trigger_db
            );
            return Ok(Some(index));
        }
        index += 1;
    }

    Ok(None)
}

/// Peak level of the reference channel in dBFS.
///
/// Scans from the start of the stream and stops once `hold_s` seconds pass
/// without a new peak, which is enough for single-note files whose loudest
/// point sits in the attack.
pub fn find_peak<S: SampleSource + ?Sized>(source: &mut S, hold_s: f32) -> SplitResult<f32> {
    let hold = (hold_s.max(0.0) * source.sample_rate() as f32) as usize;
    source.seek(0)?;

    let mut peak = 0.0f32;
    let mut peak_index = 0usize;
    let mut index = 0usize;
    while let Some(sample) = source.read_reference()? {
        let magnitude = sample.abs();
        if magnitude > peak {
            peak = magnitude;
            peak_index = index;
        }
        if index > peak_index + hold {
            break;
        }
        index += 1;
    }

    Ok(v2db(peak))
}
