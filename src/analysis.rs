//! Per-take JSON report and batch bookkeeping

use crate::audio::Take;
use crate::error::Result as SplitResult;
use crate::midi::midi_note_for_freq;
use crate::segment::{NoteSegment, TakeSummary};
use crate::sink::WrittenSample;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything found in one take
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TakeReport {
    pub version: String,
    pub input: String,
    pub audio_info: AudioInfo,
    pub summary: TakeSummary,
    pub segments: Vec<SegmentReport>,
    /// Noise level used for each note, in detection order
    pub noise_trajectory_db: Vec<f32>,
}

/// Audio information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioInfo {
    pub duration_seconds: f32,
    pub sample_rate: u32,
    pub channels: u16,
    pub bits_per_sample: u16,
    pub total_frames: usize,
}

/// One emitted note
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentReport {
    pub index: usize,
    /// Sample file written for the note (absent when nothing was written)
    pub file: Option<String>,
    pub trigger: usize,
    pub onset: usize,
    pub start: usize,
    pub end: usize,
    pub limit: usize,
    pub start_sec: f32,
    pub end_sec: f32,
    pub sample_duration_sec: f32,
    pub frequency_hz: f32,
    pub midi_note: Option<u8>,
    pub note_name: Option<String>,
    pub cents: Option<i32>,
    pub confident: bool,
    pub peak_db: f32,
    pub noise_db: f32,
    pub sn_ratio_db: f32,
    pub truncated: bool,
}

impl SegmentReport {
    pub fn new(segment: &NoteSegment, sample_rate: u32, file: Option<&Path>) -> Self {
        let sr = sample_rate as f32;
        let pitch = midi_note_for_freq(segment.frequency_hz);
        Self {
            index: segment.index,
            file: file.map(|p| p.display().to_string()),
            trigger: segment.trigger,
            onset: segment.onset,
            start: segment.start,
            end: segment.end,
            limit: segment.limit,
            start_sec: segment.start as f32 / sr,
            end_sec: segment.end as f32 / sr,
            sample_duration_sec: segment.limit.saturating_sub(segment.start) as f32 / sr,
            frequency_hz: segment.frequency_hz,
            midi_note: pitch.as_ref().map(|p| p.note),
            note_name: pitch.as_ref().map(|p| p.name.clone()),
            cents: pitch.as_ref().map(|p| p.cents),
            confident: segment.confident,
            peak_db: segment.peak_db,
            noise_db: segment.noise_db,
            sn_ratio_db: segment.signal_to_noise_db(),
            truncated: segment.truncated,
        }
    }
}

/// Build the report for a segmented take
pub fn build_take_report(
    input: &Path,
    take: &Take,
    summary: &TakeSummary,
    written: &[WrittenSample],
    noise_trajectory_db: &[f32],
    dry_run: bool,
) -> TakeReport {
    let spec = take.spec();
    let sr = spec.sample_rate;
    TakeReport {
        version: env!("CARGO_PKG_VERSION").to_string(),
        input: input.display().to_string(),
        audio_info: AudioInfo {
            duration_seconds: take.duration_sec(),
            sample_rate: sr,
            channels: spec.channels,
            bits_per_sample: spec.bits_per_sample,
            total_frames: take.n_frames(),
        },
        summary: summary.clone(),
        segments: written
            .iter()
            .map(|w| {
                let file = if dry_run { None } else { Some(w.path.as_path()) };
                SegmentReport::new(&w.segment, sr, file)
            })
            .collect(),
        noise_trajectory_db: noise_trajectory_db.to_vec(),
    }
}

/// Export a take report to JSON
pub fn export_report(report: &TakeReport, path: &Path) -> SplitResult<()> {
    let json = serde_json::to_string_pretty(report)?;
    std::fs::write(path, json)?;
    log::info!("Exported analysis report to {}", path.display());
    Ok(())
}

/// Outcome of one input file in a batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileOutcome {
    pub input: String,
    pub notes: usize,
    pub skipped: usize,
    pub error: Option<String>,
}

/// Running totals over a batch of takes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub files: Vec<FileOutcome>,
}

impl BatchSummary {
    pub fn record_success(&mut self, input: &Path, summary: &TakeSummary) {
        self.files.push(FileOutcome {
            input: input.display().to_string(),
            notes: summary.emitted,
            skipped: summary.skipped,
            error: None,
        });
    }

    pub fn record_failure(&mut self, input: &Path, error: &dyn std::fmt::Display) {
        self.files.push(FileOutcome {
            input: input.display().to_string(),
            notes: 0,
            skipped: 0,
            error: Some(error.to_string()),
        });
    }

    pub fn total_notes(&self) -> usize {
        self.files.iter().map(|f| f.notes).sum()
    }

    pub fn failures(&self) -> usize {
        self.files.iter().filter(|f| f.error.is_some()).count()
    }

    pub fn has_failures(&self) -> bool {
        self.failures() > 0
    }

    pub fn log_summary(&self) {
        log::info!(
            "{} files, {} notes, {} failed",
            self.files.len(),
            self.total_notes(),
            self.failures()
        );
        for file in self.files.iter().filter(|f| f.error.is_some()) {
            if let Some(error) = &file.error {
                log::error!("{}: {}", file.input, error);
            }
        }
    }
}
