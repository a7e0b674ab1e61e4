//! Segment sinks: where emitted notes go
//!
//! The driver hands every emitted `NoteSegment` to a `SegmentSink` together
//! with the stream it came from. `WavSampleWriter` is the production sink:
//! it names each note after its pitch, copies the frames to a new WAV file in
//! the take's own format, and appends a row to the take's CSV log.

use crate::audio::{SampleSource, Take};
use crate::config::ExportConfig;
use crate::error::{Result as SplitResult, SplitError};
use crate::midi::{midi_note_for_freq, padded_note_name};
use crate::segment::NoteSegment;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Header of the per-take CSV log
pub const LOG_HEADER: &str = "fn_prefix,file_num,mnote,notename,cents,freq,sn_ratio,peak,duration";

/// Receives each emitted segment along with its source stream
pub trait SegmentSink<S: SampleSource + ?Sized> {
    fn accept(&mut self, source: &mut S, segment: &NoteSegment) -> SplitResult<()>;
}

/// Collect segments in memory
impl<S: SampleSource + ?Sized> SegmentSink<S> for Vec<NoteSegment> {
    fn accept(&mut self, _source: &mut S, segment: &NoteSegment) -> SplitResult<()> {
        self.push(segment.clone());
        Ok(())
    }
}

/// A note written (or, in a dry run, named) by `WavSampleWriter`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WrittenSample {
    pub segment: NoteSegment,
    pub path: PathBuf,
}

/// Split an input basename on its first `_` into the instrument prefix and
/// the remaining suffix: `Piano_mf_rr2` gives `("Piano_", "_mf_rr2")`.
pub fn split_basename(basename: &str) -> (String, String) {
    match basename.split_once('_') {
        Some((head, rest)) if !rest.is_empty() => (format!("{}_", head), format!("_{}", rest)),
        Some((head, _)) => (format!("{}_", head), String::new()),
        None => (format!("{}_", basename), String::new()),
    }
}

/// File stem for a note: `<prefix><MMM>_<note><suffix>[<maybe>]`.
///
/// Notes without a pitch use MIDI 0 and `X<NN>` (their index) as the name.
pub fn sample_file_stem(prefix: &str, suffix: &str, segment: &NoteSegment, maybe_suffix: &str) -> String {
    let (note, name) = match midi_note_for_freq(segment.frequency_hz) {
        Some(pitch) => (pitch.note, padded_note_name(pitch.note)),
        None => (0, format!("X{:02}", segment.index)),
    };
    let maybe = if segment.frequency_hz > 0.0 && !segment.confident {
        maybe_suffix
    } else {
        ""
    };
    format!("{}{:03}_{}{}{}", prefix, note, name, suffix, maybe)
}

/// `<stem>.wav` in `folder`, or `<stem>-N.wav` with the first free `N`
pub fn unique_wav_path(folder: &Path, stem: &str, taken: &HashSet<PathBuf>) -> PathBuf {
    let is_free = |path: &Path| !path.exists() && !taken.contains(path);
    let path = folder.join(format!("{}.wav", stem));
    if is_free(&path) {
        return path;
    }
    let mut index = 1;
    loop {
        let path = folder.join(format!("{}-{}.wav", stem, index));
        if is_free(&path) {
            return path;
        }
        index += 1;
    }
}

/// One CSV log row for a segment
pub fn log_row(prefix: &str, segment: &NoteSegment, sample_rate: u32) -> String {
    let (note, name, cents) = match midi_note_for_freq(segment.frequency_hz) {
        Some(pitch) => (pitch.note, pitch.name, pitch.cents),
        None => (0, format!("X{:02}", segment.index), 0),
    };
    format!(
        "{},{},{},{},{:+03},{:.2},{:.1},{:.1},{:.3}s",
        prefix,
        segment.index,
        note,
        name,
        cents,
        segment.frequency_hz,
        segment.signal_to_noise_db(),
        segment.peak_db,
        segment.limit.saturating_sub(segment.start) as f64 / sample_rate as f64
    )
}

/// Writes each note of a take to its own WAV file
pub struct WavSampleWriter {
    folder: PathBuf,
    prefix: String,
    suffix: String,
    maybe_suffix: String,
    dry_run: bool,
    log: Option<BufWriter<File>>,
    taken: HashSet<PathBuf>,
    written: Vec<WrittenSample>,
}

impl WavSampleWriter {
    /// Prepare a writer for the take at `input`, creating `folder` and the
    /// CSV log unless this is a dry run
    pub fn new<P: AsRef<Path>, Q: AsRef<Path>>(
        folder: P,
        input: Q,
        export: &ExportConfig,
    ) -> SplitResult<Self> {
        let folder = folder.as_ref().to_path_buf();
        let basename = take_basename(input.as_ref())?;
        let (prefix, suffix) = split_basename(&basename);

        let log = if export.dry_run || !export.write_log {
            None
        } else {
            std::fs::create_dir_all(&folder)?;
            let log_path = folder.join(format!("{}_log.csv", basename));
            let mut log = BufWriter::new(File::create(&log_path)?);
            writeln!(log, "{}", LOG_HEADER)?;
            Some(log)
        };

        if !export.dry_run {
            std::fs::create_dir_all(&folder)?;
        }

        log::debug!("prefix = {:?}, suffix = {:?}", prefix, suffix);
        Ok(Self {
            folder,
            prefix,
            suffix,
            maybe_suffix: export.maybe_suffix.clone(),
            dry_run: export.dry_run,
            log,
            taken: HashSet::new(),
            written: Vec::new(),
        })
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    pub fn written(&self) -> &[WrittenSample] {
        &self.written
    }

    /// Flush the log and hand back what was written
    pub fn finish(mut self) -> SplitResult<Vec<WrittenSample>> {
        if let Some(log) = self.log.as_mut() {
            log.flush()?;
        }
        Ok(self.written)
    }
}

impl SegmentSink<Take> for WavSampleWriter {
    fn accept(&mut self, take: &mut Take, segment: &NoteSegment) -> SplitResult<()> {
        let stem = sample_file_stem(&self.prefix, &self.suffix, segment, &self.maybe_suffix);
        let path = unique_wav_path(&self.folder, &stem, &self.taken);
        log::info!("File {:3}: {}", segment.index, path.display());

        if let Some(log) = self.log.as_mut() {
            writeln!(log, "{}", log_row(&self.prefix, segment, take.sample_rate()))?;
        }

        if !self.dry_run {
            take.write_range(&path, segment.start, segment.limit + 1)?;
        }

        self.taken.insert(path.clone());
        self.written.push(WrittenSample {
            segment: segment.clone(),
            path,
        });
        Ok(())
    }
}

/// Input file name without directory and extension
pub fn take_basename(input: &Path) -> SplitResult<String> {
    input
        .file_stem()
        .and_then(|s| s.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            SplitError::InputValidationError(format!("no file name in {}", input.display()))
        })
}
