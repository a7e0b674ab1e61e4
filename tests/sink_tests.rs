//! Validation tests for sample export, logs and reports

use hound::{SampleFormat, WavSpec};
use notesplit::audio::Take;
use notesplit::config::Config;
use notesplit::sink::LOG_HEADER;
use notesplit::{NoteSplitter, Segmenter, WavSampleWriter};
use std::f32::consts::PI;
use std::path::{Path, PathBuf};

const SR: u32 = 44100;

fn add_note(samples: &mut [f32], from_s: f32, to_s: f32, freq: f32) {
    let n0 = (from_s * SR as f32) as usize;
    let n1 = ((to_s * SR as f32) as usize).min(samples.len());
    let attack = 0.005 * SR as f32;
    let release = 0.01 * SR as f32;
    for i in n0..n1 {
        let k = (i - n0) as f32;
        let env = (k / attack).min(1.0) * ((n1 - i) as f32 / release).min(1.0);
        samples[i] += 0.5 * env * (2.0 * PI * freq * k / SR as f32).sin();
    }
}

/// 16-bit stereo take with A4 and C5, written to `dir/name`
fn write_two_note_take(dir: &Path, name: &str) -> PathBuf {
    let mut mono = vec![0.0f32; 6 * SR as usize];
    add_note(&mut mono, 0.5, 2.0, 440.0);
    add_note(&mut mono, 3.0, 4.5, 523.25);
    let interleaved: Vec<f32> = mono.iter().flat_map(|&s| [s, s * 0.5]).collect();

    let spec = WavSpec {
        channels: 2,
        sample_rate: SR,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let take = Take::from_parts(interleaved, spec);
    let path = dir.join(name);
    take.write_range(&path, 0, take.n_frames()).unwrap();
    path
}

fn wav_files(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .filter(|n| n.ends_with(".wav"))
        .collect();
    names.sort();
    names
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_names_files_after_pitch() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_two_note_take(dir.path(), "Flute_mf_rr1.wav");
        let out = dir.path().join("out");

        let config = Config::default();
        let mut take = Take::load(&input).unwrap();
        let mut writer = WavSampleWriter::new(&out, &input, &config.export).unwrap();
        assert_eq!(writer.prefix(), "Flute_");
        assert_eq!(writer.suffix(), "_mf_rr1");

        let summary = Segmenter::new(&config).run(&mut take, &mut writer).unwrap();
        assert_eq!(summary.emitted, 2);
        let written = writer.finish().unwrap();
        assert_eq!(written.len(), 2);

        assert_eq!(
            wav_files(&out),
            vec!["Flute_069_A_4_mf_rr1.wav", "Flute_072_C_5_mf_rr1.wav"]
        );

        // same format as the take, one file frame per note frame
        for sample in &written {
            let loaded = Take::load(&sample.path).unwrap();
            assert_eq!(loaded.spec(), take.spec());
            assert_eq!(loaded.n_frames(), sample.segment.sample_frames());
        }

        let log = std::fs::read_to_string(out.join("Flute_mf_rr1_log.csv")).unwrap();
        let lines: Vec<&str> = log.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], LOG_HEADER);
        assert!(lines[1].starts_with("Flute_,1,69,A4,"));
        assert!(lines[2].starts_with("Flute_,2,72,C5,"));
    }

    #[test]
    fn test_sample_frames_match_source() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_two_note_take(dir.path(), "Flute_pp.wav");
        let out = dir.path().join("out");

        let config = Config::default();
        let mut take = Take::load(&input).unwrap();
        let mut writer = WavSampleWriter::new(&out, &input, &config.export).unwrap();
        Segmenter::new(&config).run(&mut take, &mut writer).unwrap();

        for sample in writer.finish().unwrap() {
            let loaded = Take::load(&sample.path).unwrap();
            let expected = take.frames(sample.segment.start, sample.segment.limit + 1);
            assert_eq!(loaded.frames(0, loaded.n_frames()), expected);
        }
    }

    #[test]
    fn test_dry_run_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_two_note_take(dir.path(), "Flute_mf.wav");
        let out = dir.path().join("out");

        let mut config = Config::default();
        config.export.dry_run = true;
        let summary = NoteSplitter::new(config).process(&input, &out).unwrap();

        assert_eq!(summary.emitted, 2);
        assert!(!out.exists());
    }

    #[test]
    fn test_process_writes_report_and_midi() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_two_note_take(dir.path(), "Flute_mf.wav");
        let out = dir.path().join("out");

        let summary = NoteSplitter::new(Config::default())
            .process(&input, &out)
            .unwrap();
        assert_eq!(summary.emitted, 2);
        assert_eq!(wav_files(&out).len(), 2);

        let report: serde_json::Value = serde_json::from_str(
            &std::fs::read_to_string(out.join("Flute_mf_report.json")).unwrap(),
        )
        .unwrap();
        assert_eq!(report["summary"]["emitted"], 2);
        assert_eq!(report["audio_info"]["channels"], 2);
        assert_eq!(report["audio_info"]["bits_per_sample"], 16);
        let segments = report["segments"].as_array().unwrap();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0]["midi_note"], 69);
        assert_eq!(segments[1]["midi_note"], 72);
        assert!(segments[0]["file"].as_str().unwrap().ends_with("Flute_069_A_4_mf.wav"));
        assert_eq!(report["noise_trajectory_db"].as_array().unwrap().len(), 2);

        let bytes = std::fs::read(out.join("Flute_mf_notes.mid")).unwrap();
        let smf = midly::Smf::parse(&bytes).unwrap();
        assert_eq!(smf.tracks.len(), 1);
    }

    #[test]
    fn test_existing_files_are_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_two_note_take(dir.path(), "Flute_mf.wav");
        let out = dir.path().join("out");
        let processor = NoteSplitter::new(Config::default());

        processor.process(&input, &out).unwrap();
        processor.process(&input, &out).unwrap();

        assert_eq!(
            wav_files(&out),
            vec![
                "Flute_069_A_4_mf-1.wav",
                "Flute_069_A_4_mf.wav",
                "Flute_072_C_5_mf-1.wav",
                "Flute_072_C_5_mf.wav",
            ]
        );
    }

    #[test]
    fn test_batch_continues_past_bad_files() {
        let dir = tempfile::tempdir().unwrap();
        let good = write_two_note_take(dir.path(), "Flute_mf.wav");
        let missing = dir.path().join("Missing_mf.wav");
        let garbage = dir.path().join("Garbage_mf.wav");
        std::fs::write(&garbage, b"not a wav file").unwrap();
        let out = dir.path().join("out");

        let processor = NoteSplitter::new(Config::default());
        let batch = processor.process_batch(&[missing, garbage, good], &out);

        assert_eq!(batch.files.len(), 3);
        assert_eq!(batch.failures(), 2);
        assert!(batch.has_failures());
        assert_eq!(batch.total_notes(), 2);
        assert!(batch.files[2].error.is_none());
    }
}
