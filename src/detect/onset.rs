//! Stage 2: Onset refinement
//!
//! The trigger already sits inside the attack transient, so trimming there
//! would clip the note. These searches walk backward from the trigger into
//! the preceding quiet to find where the note really begins.

use crate::audio::SampleSource;
use crate::error::{Result as SplitResult, SplitError};
use crate::level::{db2v, v2db};

/// Walk backward from `trigger` toward `floor` and return the first sample
/// that is both quiet and locally flat.
///
/// A sample qualifies when its magnitude and its difference to the following
/// sample are both below `db2v(noise_db) * multiplier`. The multiplier gives
/// headroom for DC offset and hum.
///
/// When nothing qualifies the note has no usable silence in front of it,
/// which is a `SplitError::OnsetNotFound`. The one exception is a search
/// floor at the very start of the stream: there is no earlier audio to keep,
/// so the onset is frame 0.
pub fn find_onset<S: SampleSource + ?Sized>(
    source: &mut S,
    trigger: usize,
    floor: usize,
    noise_db: f32,
    multiplier: f32,
) -> SplitResult<usize> {
    let threshold = db2v(noise_db) * multiplier;
    let floor = floor.min(trigger);

    // floor..=trigger so the sample right behind the trigger has a successor
    let window = source.read_reference_range(floor, trigger + 1)?;

    if let Some(&last) = window.last() {
        let mut next = last;
        for (offset, &sample) in window.iter().enumerate().rev().skip(1) {
            if sample.abs() < threshold && (sample - next).abs() < threshold {
                let onset = floor + offset;
                log::debug!(
                    "onset at {} ({} samples before trigger, threshold {:.1} dB)",
                    onset,
                    trigger - onset,
                    v2db(threshold)
                );
                return Ok(onset);
            }
            next = sample;
        }
    }

    if floor == 0 {
        log::warn!(
            "no quiet point before trigger {}; note starts with the stream",
            trigger
        );
        return Ok(0);
    }

    Err(SplitError::OnsetNotFound {
        trigger,
        floor,
        threshold_db: v2db(threshold),
    })
}

/// Walk backward from `trigger` to the `count`th positive-slope zero
/// crossing (a sample at or below zero followed by one above it).
///
/// If fewer than `count` crossings exist the earliest one found is used.
pub fn find_nth_zero_crossing<S: SampleSource + ?Sized>(
    source: &mut S,
    trigger: usize,
    floor: usize,
    count: usize,
) -> SplitResult<usize> {
    let floor = floor.min(trigger);
    let window = source.read_reference_range(floor, trigger + 1)?;

    let mut remaining = count.max(1);
    let mut best = None;

    if let Some(&last) = window.last() {
        let mut next = last;
        for (offset, &sample) in window.iter().enumerate().rev().skip(1) {
            if next > 0.0 && sample <= 0.0 {
                best = Some(floor + offset);
                remaining -= 1;
                if remaining == 0 {
                    break;
                }
            }
            next = sample;
        }
    }

    best.ok_or(SplitError::ZeroCrossingNotFound { trigger, floor })
}
