//! Audio I/O and the sample source the detectors scan

use crate::error::{Result as SplitResult, SplitError};
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use std::path::Path;

/// Channel all detectors read; other channels are carried along untouched.
pub const REFERENCE_CHANNEL: usize = 0;

/// Seekable multichannel PCM stream with frame-indexed random access.
///
/// Amplitudes are normalized so that full scale is 1.0.
pub trait SampleSource {
    /// Sample rate in Hz
    fn sample_rate(&self) -> u32;

    /// Number of interleaved channels per frame
    fn channels(&self) -> usize;

    /// Total number of frames; valid indices are `0..total_frame_count()`
    fn total_frame_count(&self) -> usize;

    /// Position the read cursor. Seeking to `total_frame_count()` is allowed
    /// and leaves the stream at its end.
    fn seek(&mut self, frame_index: usize) -> SplitResult<()>;

    /// Read the frame under the cursor and advance; `None` at end of stream.
    fn read_frame(&mut self) -> SplitResult<Option<&[f32]>>;

    /// Read the reference channel of the next frame
    fn read_reference(&mut self) -> SplitResult<Option<f32>> {
        Ok(self.read_frame()?.map(|frame| frame[REFERENCE_CHANNEL]))
    }

    /// Reference-channel samples in `start..end`, clipped to the stream length
    fn read_reference_range(&mut self, start: usize, end: usize) -> SplitResult<Vec<f32>> {
        let total = self.total_frame_count();
        let end = end.min(total);
        if start >= end {
            return Ok(Vec::new());
        }

        let mut samples = Vec::with_capacity(end - start);
        self.seek(start)?;
        for frame in start..end {
            match self.read_reference()? {
                Some(value) => samples.push(value),
                None => return Err(SplitError::StreamReadError { frame, total }),
            }
        }
        Ok(samples)
    }
}

/// One decoded recording held in memory, with the format it was stored in
#[derive(Debug, Clone)]
pub struct Take {
    /// Interleaved samples, normalized to [-1, 1]
    samples: Vec<f32>,
    spec: WavSpec,
    cursor: usize,
}

impl Take {
    /// Load a WAV take from disk
    pub fn load<P: AsRef<Path>>(path: P) -> SplitResult<Self> {
        let (samples, spec) = load_wav_file(path)?;
        Ok(Self::from_parts(samples, spec))
    }

    /// Mono take from synthetic samples (32-bit float format)
    pub fn from_samples(samples: Vec<f32>, sr: u32) -> Self {
        Self::from_interleaved(samples, 1, sr)
    }

    /// Multichannel take from interleaved synthetic samples (32-bit float format)
    pub fn from_interleaved(samples: Vec<f32>, channels: u16, sr: u32) -> Self {
        let spec = WavSpec {
            channels: channels.max(1),
            sample_rate: sr,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        Self::from_parts(samples, spec)
    }

    /// Take with an explicit storage format, used when writing it back out
    pub fn from_parts(mut samples: Vec<f32>, spec: WavSpec) -> Self {
        let channels = spec.channels.max(1) as usize;
        // drop a trailing partial frame
        samples.truncate(samples.len() - samples.len() % channels);
        Take {
            samples,
            spec,
            cursor: 0,
        }
    }

    /// Storage format of the take
    pub fn spec(&self) -> WavSpec {
        self.spec
    }

    /// Interleaved samples of frames `start..end`, clipped to the take
    pub fn frames(&self, start: usize, end: usize) -> &[f32] {
        let channels = self.spec.channels.max(1) as usize;
        let n = self.n_frames();
        let end = end.min(n);
        let start = start.min(end);
        &self.samples[start * channels..end * channels]
    }

    /// New take holding frames `start..end` in the same format
    pub fn slice(&self, start: usize, end: usize) -> Take {
        Take::from_parts(self.frames(start, end).to_vec(), self.spec)
    }

    /// Reference channel as a contiguous vector
    pub fn reference(&self) -> Vec<f32> {
        let channels = self.spec.channels.max(1) as usize;
        self.samples
            .iter()
            .skip(REFERENCE_CHANNEL)
            .step_by(channels)
            .copied()
            .collect()
    }

    /// Get take duration in seconds
    pub fn duration_sec(&self) -> f32 {
        self.n_frames() as f32 / self.spec.sample_rate as f32
    }

    /// Get number of frames
    pub fn n_frames(&self) -> usize {
        self.samples.len() / self.spec.channels.max(1) as usize
    }

    /// Write frames `start..end` to a WAV file in the take's own format
    pub fn write_range<P: AsRef<Path>>(&self, path: P, start: usize, end: usize) -> SplitResult<()> {
        write_wav_file(path, self.spec, self.frames(start, end))
    }
}

impl SampleSource for Take {
    fn sample_rate(&self) -> u32 {
        self.spec.sample_rate
    }

    fn channels(&self) -> usize {
        self.spec.channels.max(1) as usize
    }

    fn total_frame_count(&self) -> usize {
        self.n_frames()
    }

    fn seek(&mut self, frame_index: usize) -> SplitResult<()> {
        let total = self.n_frames();
        if frame_index > total {
            return Err(SplitError::StreamReadError {
                frame: frame_index,
                total,
            });
        }
        self.cursor = frame_index;
        Ok(())
    }

    fn read_frame(&mut self) -> SplitResult<Option<&[f32]>> {
        if self.cursor >= self.n_frames() {
            return Ok(None);
        }
        let channels = self.channels();
        let start = self.cursor * channels;
        self.cursor += 1;
        Ok(Some(&self.samples[start..start + channels]))
    }
}

/// Load WAV file, returning interleaved normalized samples and the stored format
pub fn load_wav_file<P: AsRef<Path>>(path: P) -> SplitResult<(Vec<f32>, WavSpec)> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    if spec.channels == 0 {
        return Err(SplitError::InvalidAudioFormat(
            "WAV header declares zero channels".to_string(),
        ));
    }

    if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
        return Err(SplitError::InvalidAudioFormat(format!(
            "Unsupported bit depth: {}",
            spec.bits_per_sample
        )));
    }

    let mut samples: Vec<f32> = Vec::with_capacity(reader.len() as usize);

    match spec.sample_format {
        SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f32;
            for sample in reader.samples::<i32>() {
                samples.push(sample? as f32 / max_value);
            }
        }
        SampleFormat::Float => {
            for sample in reader.samples::<f32>() {
                samples.push(sample?);
            }
        }
    }

    Ok((samples, spec))
}

/// Write interleaved normalized samples as a WAV file in the given format
pub fn write_wav_file<P: AsRef<Path>>(path: P, spec: WavSpec, samples: &[f32]) -> SplitResult<()> {
    let mut writer = WavWriter::create(path, spec)?;

    match spec.sample_format {
        SampleFormat::Int => {
            let max_value = (1i64 << (spec.bits_per_sample - 1)) as f64;
            for &sample in samples {
                let scaled = (sample as f64 * max_value)
                    .round()
                    .clamp(-max_value, max_value - 1.0);
                writer.write_sample(scaled as i32)?;
            }
        }
        SampleFormat::Float => {
            for &sample in samples {
                writer.write_sample(sample)?;
            }
        }
    }

    writer.finalize()?;
    Ok(())
}

/// Basic sanity checks on a decoded take
pub fn validate_take(take: &Take) -> SplitResult<()> {
    if take.n_frames() == 0 {
        return Err(SplitError::InputValidationError(
            "Audio file contains no samples".to_string(),
        ));
    }

    let sr = take.spec().sample_rate;
    if !(8000..=192000).contains(&sr) {
        return Err(SplitError::UnsupportedSampleRate(sr));
    }

    let peak = take
        .reference()
        .iter()
        .fold(0.0f32, |peak, &x| peak.max(x.abs()));
    if peak > 0.99 {
        log::warn!("Audio file may be clipped (peak = {:.3})", peak);
    }

    Ok(())
}
