//! Single-note lead trimming
//!
//! For files that already hold one note: drop the latency before the first
//! transient, keeping a short linear fade-in so the cut does not click.
//! Levels are taken relative to the file's own peak.

use crate::audio::{SampleSource, Take};
use crate::config::{seconds_to_samples, Config};
use crate::detect::{find_onset, find_peak, find_trigger};
use crate::error::Result as SplitResult;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Where a file gets cut
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrimPoint {
    pub peak_db: f32,
    pub trigger: usize,
    pub onset: usize,
    /// First frame kept; the fade-in runs from here to `onset`
    pub fade_start: usize,
    pub trimmed_ms: f32,
}

/// Locate the trim point of a single-note take. `None` if nothing rises
/// above the trigger level.
pub fn find_trim_point(take: &mut Take, config: &Config) -> SplitResult<Option<TrimPoint>> {
    let trim = &config.trim;
    let sr = take.sample_rate();

    let peak_db = find_peak(take, trim.peak_hold_s)?;
    let Some(trigger) = find_trigger(take, 0, peak_db + trim.trigger_db)? else {
        return Ok(None);
    };

    let window = seconds_to_samples(config.detection.onset_window_s, sr);
    let onset = find_onset(
        take,
        trigger,
        trigger.saturating_sub(window),
        peak_db + trim.noise_db,
        config.detection.noise_multiplier,
    )?;
    let fade_start = onset.saturating_sub(seconds_to_samples(trim.fade_in_s, sr));

    let point = TrimPoint {
        peak_db,
        trigger,
        onset,
        fade_start,
        trimmed_ms: fade_start as f32 * 1000.0 / sr as f32,
    };
    log::debug!("trim point {:?}", point);
    Ok(Some(point))
}

/// New take starting at `fade_start`, ramped linearly up to full level at `onset`
pub fn apply_trim(take: &Take, point: &TrimPoint) -> Take {
    let channels = take.spec().channels.max(1) as usize;
    let mut samples = take.frames(point.fade_start, take.n_frames()).to_vec();

    let span = point.onset.saturating_sub(point.fade_start);
    for (k, frame) in samples.chunks_mut(channels).take(span).enumerate() {
        let gain = (k + 1) as f32 / span as f32;
        for sample in frame {
            *sample *= gain;
        }
    }

    Take::from_parts(samples, take.spec())
}

/// Trim `input` into `output`. Nothing is written in a dry run.
pub fn trim_file<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
    config: &Config,
) -> SplitResult<Option<TrimPoint>> {
    let mut take = Take::load(&input)?;
    crate::audio::validate_take(&take)?;
    let Some(point) = find_trim_point(&mut take, config)? else {
        log::warn!("{}: nothing above the trigger level, not trimmed", input.as_ref().display());
        return Ok(None);
    };

    log::info!(
        "{}: trimming {:.0} msec",
        input.as_ref().display(),
        point.trimmed_ms
    );
    if !config.export.dry_run {
        let trimmed = apply_trim(&take, &point);
        trimmed.write_range(output, 0, trimmed.n_frames())?;
    }
    Ok(Some(point))
}

/// Totals over a batch of trimmed files
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrimStats {
    pub files: usize,
    pub total_ms: f32,
    pub max_ms: f32,
}

impl TrimStats {
    pub fn record(&mut self, point: &TrimPoint) {
        self.files += 1;
        self.total_ms += point.trimmed_ms;
        self.max_ms = self.max_ms.max(point.trimmed_ms);
    }

    pub fn average_ms(&self) -> f32 {
        if self.files == 0 {
            0.0
        } else {
            self.total_ms / self.files as f32
        }
    }
}
