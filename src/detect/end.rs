//! Stage 4: End-of-note location

use crate::audio::SampleSource;
use crate::config::{seconds_to_samples, DetectionConfig};
use crate::error::Result as SplitResult;
use crate::level::RmsBuffer;

/// Where a note stops sounding and where its sample file should stop
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEnd {
    /// Acoustic end: first RMS check below the noise threshold
    pub end: usize,
    /// Write boundary. `end + dwell` normally; pinned earlier than `end`
    /// when the note outlasts the maximum duration.
    pub limit: usize,
    /// Loudest sample over the whole scan, in dBFS
    pub peak_db: f32,
    /// The stream ran out before the note decayed
    pub truncated: bool,
    /// `limit` was pinned by the maximum duration
    pub limit_pinned: bool,
}

/// Scan forward from `start` with a sliding RMS window until the level
/// drops below `noise_threshold_db`.
///
/// The RMS is checked every `sample_rate / calcs_per_sec` samples and the
/// threshold is never taken below `end_threshold_floor_db`. If the note runs
/// past `max_duration_s`, the write boundary is pinned at the most recent
/// zero crossing in the window while the scan carries on to the acoustic
/// end. Running out of stream is not an error; the note is just truncated.
pub fn find_end<S: SampleSource + ?Sized>(
    source: &mut S,
    start: usize,
    noise_threshold_db: f32,
    dwell_s: f32,
    max_duration_s: f32,
    config: &DetectionConfig,
) -> SplitResult<NoteEnd> {
    let sr = source.sample_rate();
    let total = source.total_frame_count();
    let interval = config.calc_interval(sr);
    let threshold_db = noise_threshold_db.max(config.end_threshold_floor_db);
    let dwell = seconds_to_samples(dwell_s, sr);
    let max_len = seconds_to_samples(max_duration_s, sr);

    let mut buf = RmsBuffer::new(config.rms_window(sr));
    let mut limit: Option<usize> = None;
    let mut n = 0usize;

    source.seek(start.min(total))?;
    loop {
        let sample = match source.read_reference()? {
            Some(sample) => sample,
            None => {
                let last = if n == 0 { start.min(total) } else { start + n - 1 };
                log::warn!(
                    "sample file ends before silence (note from {} truncated at {})",
                    start,
                    last
                );
                return Ok(NoteEnd {
                    end: last,
                    limit: limit.unwrap_or(last),
                    peak_db: buf.peak_db(),
                    truncated: true,
                    limit_pinned: limit.is_some(),
                });
            }
        };
        buf.add_sample(sample);

        if (n + 1) % interval == 0 {
            let rms_db = buf.rms_db();
            if rms_db < threshold_db {
                let end = start + n;
                let pinned = limit.is_some();
                let limit = limit.unwrap_or_else(|| (end + dwell).min(total.saturating_sub(1)));
                log::debug!(
                    "end at {} (rms {:.1} dB < {:.1} dB), limit {}",
                    end,
                    rms_db,
                    threshold_db,
                    limit
                );
                return Ok(NoteEnd {
                    end,
                    limit,
                    peak_db: buf.peak_db(),
                    truncated: false,
                    limit_pinned: pinned,
                });
            }
        }

        if limit.is_none() && n > max_len {
            let pinned = start + buf.last_sign_change_position().unwrap_or(n);
            log::info!(
                "note from {} exceeds {:.1} s, sample limited at {}",
                start,
                max_duration_s,
                pinned
            );
            limit = Some(pinned);
        }

        n += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::Take;

    fn tone(len: usize, total: usize) -> Vec<f32> {
        let mut samples: Vec<f32> = (0..len).map(|i| 0.5 * (i as f32 * 0.05).sin()).collect();
        samples.resize(total, 0.0);
        samples
    }

    #[test]
    fn test_end_after_decay_with_dwell() {
        let sr = 8000;
        let config = DetectionConfig::default();
        let mut take = Take::from_samples(tone(8000, 24000), sr);
        let end = find_end(&mut take, 0, -58.0, 0.1, 10.0, &config).unwrap();

        // checks every 1600 samples, window 320
        assert_eq!(end.end, 9599);
        assert_eq!(end.limit, 9599 + 800);
        assert!(!end.truncated && !end.limit_pinned);
        assert!((end.peak_db - crate::level::v2db(0.5)).abs() < 0.1);
    }

    #[test]
    fn test_threshold_clamped_to_floor() {
        let sr = 8000;
        let config = DetectionConfig::default();
        // constant -70 dB hum never gets below a -90 dB threshold, but does below -60
        let mut take = Take::from_samples(vec![0.000316f32; 8000], sr);
        let end = find_end(&mut take, 0, -90.0, 0.0, 10.0, &config).unwrap();
        assert_eq!(end.end, 1599);
        assert!(!end.truncated);
    }

    #[test]
    fn test_truncated_by_end_of_stream() {
        let sr = 8000;
        let config = DetectionConfig::default();
        let mut take = Take::from_samples(tone(5000, 5000), sr);
        let end = find_end(&mut take, 100, -58.0, 0.1, 10.0, &config).unwrap();
        assert!(end.truncated);
        assert_eq!(end.end, 4999);
        assert_eq!(end.limit, 4999);
    }

    #[test]
    fn test_limit_pinned_when_too_long() {
        let sr = 8000;
        let config = DetectionConfig::default();
        let mut take = Take::from_samples(tone(24000, 32000), sr);
        let end = find_end(&mut take, 0, -58.0, 0.1, 1.0, &config).unwrap();
        assert!(end.limit_pinned);
        assert!(end.limit < end.end);
        // pinned within one window of the maximum duration
        assert!(end.limit <= 8001 && end.limit + 320 >= 8000);
        assert!(end.end >= 24000);
    }
}
