//! Segmentation driver
//!
//! Walks a take note by note: trigger, onset, noise floor, end, pitch. Each
//! note moves the scanner through `ScanPhase`, and the adaptive noise level
//! and counters live in an explicit `SegmentationState` owned by one take.

use crate::audio::SampleSource;
use crate::config::{seconds_to_samples, Config, OnsetRule};
use crate::detect::{
    estimate_pitch, find_end, find_nth_zero_crossing, find_onset, find_trigger, measure_noise,
    noise_probe, NoteEnd, PitchEstimate,
};
use crate::error::Result as SplitResult;
use crate::sink::SegmentSink;
use serde::{Deserialize, Serialize};

/// One detected note, ready for the sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoteSegment {
    /// 1-based position among the emitted notes of the take
    pub index: usize,
    pub trigger: usize,
    /// Refined acoustic onset
    pub onset: usize,
    /// First frame written (onset minus lead time)
    pub start: usize,
    /// Acoustic end
    pub end: usize,
    /// Last frame written
    pub limit: usize,
    /// 0.0 when undetermined
    pub frequency_hz: f32,
    pub confident: bool,
    pub peak_db: f32,
    pub noise_db: f32,
    /// The take ended before the note decayed
    pub truncated: bool,
}

impl NoteSegment {
    pub fn pitch(&self) -> PitchEstimate {
        PitchEstimate {
            frequency_hz: self.frequency_hz,
            confident: self.confident,
        }
    }

    pub fn signal_to_noise_db(&self) -> f32 {
        self.peak_db - self.noise_db
    }

    /// Frames written to the sample file
    pub fn sample_frames(&self) -> usize {
        self.limit.saturating_sub(self.start) + 1
    }

    /// Onset to acoustic end, in frames
    pub fn note_frames(&self) -> usize {
        self.end.saturating_sub(self.onset)
    }
}

/// Where the scanner is within the current note
#[derive(Debug, Clone, PartialEq)]
pub enum ScanPhase {
    Scanning,
    Triggered {
        trigger: usize,
    },
    NoiseMeasured {
        trigger: usize,
        onset: usize,
        noise_db: f32,
    },
    Ended {
        trigger: usize,
        onset: usize,
        noise_db: f32,
        end: NoteEnd,
    },
    Emitted,
    Done,
}

/// Mutable per-take state. Create a fresh one for every take.
#[derive(Debug, Clone)]
pub struct SegmentationState {
    pub phase: ScanPhase,
    /// Next trigger search starts here
    pub position: usize,
    /// Acoustic end of the previous note; floor for the next onset search
    pub previous_end: usize,
    /// Last measured noise level (or the configured default)
    pub noise_default_db: f32,
    /// Noise level used for each note, in order
    pub noise_history: Vec<f32>,
    pub triggers: usize,
    pub emitted: usize,
    pub skipped: usize,
}

impl SegmentationState {
    pub fn new(config: &Config) -> Self {
        Self {
            phase: ScanPhase::Scanning,
            position: 0,
            previous_end: 0,
            noise_default_db: config.detection.default_noise_db,
            noise_history: Vec::new(),
            triggers: 0,
            emitted: 0,
            skipped: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.phase == ScanPhase::Done
    }
}

/// Counts reported after a take has been segmented
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TakeSummary {
    pub triggers: usize,
    pub emitted: usize,
    pub skipped: usize,
    pub final_noise_db: f32,
}

/// Steps one take through its notes
pub struct Segmenter<'a> {
    config: &'a Config,
    state: SegmentationState,
}

impl<'a> Segmenter<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            state: SegmentationState::new(config),
        }
    }

    /// Resume from an existing state
    pub fn with_state(config: &'a Config, state: SegmentationState) -> Self {
        Self { config, state }
    }

    pub fn state(&self) -> &SegmentationState {
        &self.state
    }

    pub fn into_state(self) -> SegmentationState {
        self.state
    }

    pub fn summary(&self) -> TakeSummary {
        TakeSummary {
            triggers: self.state.triggers,
            emitted: self.state.emitted,
            skipped: self.state.skipped,
            final_noise_db: self.state.noise_default_db,
        }
    }

    /// Advance to the next emitted note. `Ok(None)` once the take is exhausted.
    ///
    /// An error leaves the scanner in `ScanPhase::Done`: the rest of the take
    /// is abandoned.
    pub fn next_segment<S: SampleSource + ?Sized>(
        &mut self,
        source: &mut S,
    ) -> SplitResult<Option<NoteSegment>> {
        let detection = &self.config.detection;

        loop {
            let phase = std::mem::replace(&mut self.state.phase, ScanPhase::Done);
            self.state.phase = match phase {
                ScanPhase::Scanning | ScanPhase::Emitted => {
                    match find_trigger(source, self.state.position, detection.trigger_db)? {
                        Some(trigger) => {
                            self.state.triggers += 1;
                            ScanPhase::Triggered { trigger }
                        }
                        None => {
                            log::debug!("no trigger after {}, take complete", self.state.position);
                            ScanPhase::Done
                        }
                    }
                }
                ScanPhase::Triggered { trigger } => {
                    let onset = self.locate_onset(source, trigger)?;
                    let noise_db = self.noise_level(source, onset)?;
                    ScanPhase::NoiseMeasured {
                        trigger,
                        onset,
                        noise_db,
                    }
                }
                ScanPhase::NoiseMeasured {
                    trigger,
                    onset,
                    noise_db,
                } => {
                    let end = find_end(
                        source,
                        onset,
                        noise_db + detection.noise_delta_db,
                        detection.dwell_time_s,
                        detection.max_duration_s,
                        detection,
                    )?;
                    self.state.previous_end = end.end;
                    // a note cut off by the end of the take is the last one
                    self.state.position = if end.truncated {
                        source.total_frame_count()
                    } else {
                        end.end.max(trigger + 1)
                    };
                    ScanPhase::Ended {
                        trigger,
                        onset,
                        noise_db,
                        end,
                    }
                }
                ScanPhase::Ended {
                    trigger,
                    onset,
                    noise_db,
                    end,
                } => {
                    let sr = source.sample_rate();
                    let min_frames = seconds_to_samples(detection.min_duration_s, sr);
                    let note_frames = end.end.saturating_sub(onset);
                    if note_frames < min_frames {
                        self.state.skipped += 1;
                        log::warn!(
                            "skipping, too short: note at {} lasts {:.3} s (minimum {:.3} s)",
                            onset,
                            note_frames as f32 / sr as f32,
                            detection.min_duration_s
                        );
                        ScanPhase::Scanning
                    } else {
                        let segment = self.emit(source, trigger, onset, noise_db, end)?;
                        self.state.phase = ScanPhase::Emitted;
                        return Ok(Some(segment));
                    }
                }
                ScanPhase::Done => {
                    self.state.phase = ScanPhase::Done;
                    return Ok(None);
                }
            };
        }
    }

    /// Feed every note of the take to `sink`
    pub fn run<S, K>(&mut self, source: &mut S, sink: &mut K) -> SplitResult<TakeSummary>
    where
        S: SampleSource + ?Sized,
        K: SegmentSink<S> + ?Sized,
    {
        while let Some(segment) = self.next_segment(source)? {
            sink.accept(source, &segment)?;
        }
        let summary = self.summary();
        log::info!(
            "{} notes emitted, {} skipped ({} triggers)",
            summary.emitted,
            summary.skipped,
            summary.triggers
        );
        Ok(summary)
    }

    fn locate_onset<S: SampleSource + ?Sized>(
        &self,
        source: &mut S,
        trigger: usize,
    ) -> SplitResult<usize> {
        let detection = &self.config.detection;
        let window = seconds_to_samples(detection.onset_window_s, source.sample_rate());
        let floor = self.state.previous_end.max(trigger.saturating_sub(window));

        let onset = match detection.onset_rule {
            OnsetRule::Flat => find_onset(
                source,
                trigger,
                floor,
                self.state.noise_default_db,
                detection.noise_multiplier,
            )?,
            OnsetRule::ZeroCrossing => {
                find_nth_zero_crossing(source, trigger, floor, detection.lead_zero_crossings)?
            }
        };
        log::debug!("trigger {} onset {} (floor {})", trigger, onset, floor);
        Ok(onset)
    }

    fn noise_level<S: SampleSource + ?Sized>(
        &mut self,
        source: &mut S,
        onset: usize,
    ) -> SplitResult<f32> {
        let detection = &self.config.detection;
        if !detection.measure_noise {
            self.state.noise_history.push(self.state.noise_default_db);
            return Ok(self.state.noise_default_db);
        }

        let sr = source.sample_rate();
        let (probe_start, probe_len) = noise_probe(
            onset,
            seconds_to_samples(detection.noise_lookback_s, sr),
            seconds_to_samples(detection.noise_probe_s, sr),
        );

        let noise_db = match measure_noise(source, probe_start, probe_len)? {
            Some(level) => {
                self.state.noise_default_db = level;
                level
            }
            None => {
                log::warn!(
                    "can't measure noise, using {:.2} dB (probe {} frames at {})",
                    self.state.noise_default_db,
                    probe_len,
                    probe_start
                );
                self.state.noise_default_db
            }
        };
        self.state.noise_history.push(noise_db);
        Ok(noise_db)
    }

    fn emit<S: SampleSource + ?Sized>(
        &mut self,
        source: &mut S,
        trigger: usize,
        onset: usize,
        noise_db: f32,
        end: NoteEnd,
    ) -> SplitResult<NoteSegment> {
        let lead = seconds_to_samples(self.config.detection.lead_time_s, source.sample_rate());
        let start = onset.saturating_sub(lead);

        let pitch = if self.config.pitch.enabled {
            estimate_pitch(source, onset, &self.config.pitch)?
        } else {
            PitchEstimate::indeterminate()
        };

        self.state.emitted += 1;
        let segment = NoteSegment {
            index: self.state.emitted,
            trigger,
            onset,
            start,
            end: end.end,
            limit: end.limit,
            frequency_hz: pitch.frequency_hz,
            confident: pitch.confident,
            peak_db: end.peak_db,
            noise_db,
            truncated: end.truncated,
        };
        log::info!(
            "note {}: {}..{} (end {}), {:.2} Hz{}, peak {:.1} dB, noise {:.1} dB",
            segment.index,
            segment.start,
            segment.limit,
            segment.end,
            segment.frequency_hz,
            if segment.confident { "" } else { " (guess)" },
            segment.peak_db,
            segment.noise_db
        );
        Ok(segment)
    }
}

/// Segment a whole take into a vector
pub fn segment_take<S: SampleSource + ?Sized>(
    source: &mut S,
    config: &Config,
) -> SplitResult<Vec<NoteSegment>> {
    let mut segmenter = Segmenter::new(config);
    let mut segments = Vec::new();
    segmenter.run(source, &mut segments)?;
    Ok(segments)
}
