//! Note splitting for sampled-instrument libraries
//!
//! Takes a long recording of many performed notes, finds where each note
//! really starts and ends, estimates its pitch, and writes every note to its
//! own sample file named after that pitch.

pub mod analysis;
pub mod audio;
pub mod config;
pub mod detect;
pub mod error;
pub mod level;
pub mod midi;
pub mod segment;
pub mod sink;
pub mod trim;

pub use audio::{SampleSource, Take};
pub use config::Config;
pub use error::{Result as SplitResult, SplitError};
pub use segment::{segment_take, NoteSegment, SegmentationState, Segmenter, TakeSummary};
pub use sink::{SegmentSink, WavSampleWriter};

use analysis::BatchSummary;
use sink::WrittenSample;
use std::path::{Path, PathBuf};
use trim::{TrimPoint, TrimStats};

/// Batch-facing processor for takes and single-note files
pub struct NoteSplitter {
    config: Config,
}

impl NoteSplitter {
    /// Create a new processor with the given configuration
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Split one take into note samples under `output_dir`
    pub fn process<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        output_dir: Q,
    ) -> SplitResult<TakeSummary> {
        let input = input_path.as_ref();
        let output_dir = output_dir.as_ref();

        let mut take = Take::load(input)?;
        audio::validate_take(&take)?;
        log::info!(
            "Processing {} ({:.1} s, {} Hz, {} ch)",
            input.display(),
            take.duration_sec(),
            take.sample_rate(),
            take.channels()
        );

        // fresh state per take
        let mut writer = WavSampleWriter::new(output_dir, input, &self.config.export)?;
        let mut segmenter = Segmenter::new(&self.config);
        let summary = segmenter.run(&mut take, &mut writer)?;
        let noise_history = segmenter.into_state().noise_history;
        let written = writer.finish()?;

        self.export_results(input, output_dir, &take, &summary, &written, &noise_history)?;
        Ok(summary)
    }

    /// Process every input; a failing file is recorded and the batch moves on
    pub fn process_batch<Q: AsRef<Path>>(&self, inputs: &[PathBuf], output_dir: Q) -> BatchSummary {
        let mut batch = BatchSummary::default();
        for input in inputs {
            let result = validate_input(input, &self.config)
                .and_then(|_| self.process(input, output_dir.as_ref()));
            match result {
                Ok(summary) => batch.record_success(input, &summary),
                Err(e) => {
                    log::error!("{}: {}", input.display(), e);
                    batch.record_failure(input, &e);
                }
            }
        }
        batch.log_summary();
        batch
    }

    /// Trim the lead of a single-note file into `output_dir` (same file name)
    pub fn trim<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        input_path: P,
        output_dir: Q,
    ) -> SplitResult<Option<TrimPoint>> {
        let input = input_path.as_ref();
        let file_name = input.file_name().ok_or_else(|| {
            SplitError::InputValidationError(format!("no file name in {}", input.display()))
        })?;
        if !self.config.export.dry_run {
            std::fs::create_dir_all(output_dir.as_ref())?;
        }
        trim::trim_file(input, output_dir.as_ref().join(file_name), &self.config)
    }

    /// Trim every input, returning the trim statistics and the number of failures
    pub fn trim_batch<Q: AsRef<Path>>(&self, inputs: &[PathBuf], output_dir: Q) -> (TrimStats, usize) {
        let mut stats = TrimStats::default();
        let mut failures = 0;
        for input in inputs {
            let result = validate_input(input, &self.config)
                .and_then(|_| self.trim(input, output_dir.as_ref()));
            match result {
                Ok(Some(point)) => stats.record(&point),
                Ok(None) => {}
                Err(e) => {
                    log::error!("{}: {}", input.display(), e);
                    failures += 1;
                }
            }
        }
        log::info!(
            "{} files trimmed, average {:.1} msec, max {:.1} msec",
            stats.files,
            stats.average_ms(),
            stats.max_ms
        );
        (stats, failures)
    }

    /// Export the JSON report and the MIDI cue file for a take
    fn export_results(
        &self,
        input: &Path,
        output_dir: &Path,
        take: &Take,
        summary: &TakeSummary,
        written: &[WrittenSample],
        noise_history: &[f32],
    ) -> SplitResult<()> {
        let export = &self.config.export;
        if export.dry_run {
            return Ok(());
        }
        let basename = sink::take_basename(input)?;

        if export.write_report {
            let report = analysis::build_take_report(
                input,
                take,
                summary,
                written,
                noise_history,
                export.dry_run,
            );
            analysis::export_report(&report, &output_dir.join(format!("{}_report.json", basename)))?;
        }

        if export.write_midi {
            let segments: Vec<NoteSegment> = written.iter().map(|w| w.segment.clone()).collect();
            if segments.iter().any(|s| s.frequency_hz > 0.0) {
                midi::export_cue_file(
                    &segments,
                    take.sample_rate(),
                    &output_dir.join(format!("{}_notes.mid", basename)),
                )?;
            } else {
                log::warn!("No pitched notes, skipping MIDI cue file");
            }
        }
        Ok(())
    }
}

/// Cheap up-front checks: the input exists and the configuration is valid.
/// The audio itself is checked once it has been decoded.
pub fn validate_input<P: AsRef<Path>>(input_path: P, config: &Config) -> SplitResult<()> {
    let path = input_path.as_ref();
    if !path.is_file() {
        return Err(SplitError::InputValidationError(format!(
            "Audio file does not exist: {}",
            path.display()
        )));
    }

    config::validate_config(config)
        .map_err(|e| SplitError::ConfigValidationFailed(e.to_string()))?;

    Ok(())
}
