//! Validation tests for single-note lead trimming

use hound::{SampleFormat, WavSpec};
use notesplit::audio::Take;
use notesplit::config::Config;
use notesplit::trim::trim_file;
use notesplit::NoteSplitter;
use std::f32::consts::PI;
use std::path::{Path, PathBuf};

const SR: u32 = 48000;

/// 16-bit mono file: `lead_s` of silence, then a 1 s A4 with a 5 ms attack
fn write_late_note(dir: &Path, name: &str, lead_s: f32) -> PathBuf {
    let lead = (lead_s * SR as f32) as usize;
    let attack = 0.005 * SR as f32;
    let mut samples = vec![0.0f32; lead];
    samples.extend((0..SR as usize).map(|k| {
        let env = (k as f32 / attack).min(1.0);
        0.5 * env * (2.0 * PI * 440.0 * k as f32 / SR as f32).sin()
    }));

    let spec = WavSpec {
        channels: 1,
        sample_rate: SR,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let take = Take::from_parts(samples, spec);
    let path = dir.join(name);
    take.write_range(&path, 0, take.n_frames()).unwrap();
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_removes_lead_and_keeps_note() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_late_note(dir.path(), "late.wav", 0.3);
        let output = dir.path().join("trimmed.wav");

        let point = trim_file(&input, &output, &Config::default()).unwrap().unwrap();
        assert!((point.trimmed_ms - 300.0).abs() < 5.0, "trimmed {} ms", point.trimmed_ms);
        assert!(point.onset < point.trigger);
        // 1 ms fade at 48 kHz
        assert_eq!(point.onset - point.fade_start, 48);

        let original = Take::load(&input).unwrap();
        let trimmed = Take::load(&output).unwrap();
        assert_eq!(trimmed.spec(), original.spec());
        assert_eq!(trimmed.n_frames(), original.n_frames() - point.fade_start);

        // past the fade the audio is untouched
        let before = original.reference();
        let after = trimmed.reference();
        assert_eq!(&after[48..], &before[point.onset..]);
        // the fade never gets louder than the source
        for k in 0..48 {
            assert!(after[k].abs() <= before[point.fade_start + k].abs() + 1.0 / 32768.0);
        }
    }

    #[test]
    fn test_trim_dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_late_note(dir.path(), "late.wav", 0.2);
        let output = dir.path().join("trimmed.wav");

        let mut config = Config::default();
        config.export.dry_run = true;
        let point = trim_file(&input, &output, &config).unwrap();
        assert!(point.is_some());
        assert!(!output.exists());
    }

    #[test]
    fn test_trim_batch_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let inputs = vec![
            write_late_note(dir.path(), "a.wav", 0.1),
            write_late_note(dir.path(), "b.wav", 0.3),
            dir.path().join("missing.wav"),
        ];
        let out = dir.path().join("out");

        let (stats, failures) = NoteSplitter::new(Config::default()).trim_batch(&inputs, &out);
        assert_eq!(failures, 1);
        assert_eq!(stats.files, 2);
        assert!((stats.average_ms() - 200.0).abs() < 5.0);
        assert!((stats.max_ms - 300.0).abs() < 5.0);
        // same file names in the output folder
        assert!(out.join("a.wav").exists());
        assert!(out.join("b.wav").exists());
    }

    #[test]
    fn test_silent_file_is_not_trimmed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silent.wav");
        Take::from_samples(vec![0.0; SR as usize], SR)
            .write_range(&path, 0, SR as usize)
            .unwrap();
        let out = dir.path().join("out");

        let processor = NoteSplitter::new(Config::default());
        assert_eq!(processor.trim(&path, &out).unwrap(), None);
        assert!(!out.join("silent.wav").exists());
    }
}
