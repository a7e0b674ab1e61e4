//! Validation tests for end-of-note location and noise floor tracking

use notesplit::audio::{SampleSource, Take};
use notesplit::config::{Config, DetectionConfig};
use notesplit::detect::{find_end, measure_noise, noise_probe};
use notesplit::level::{db2v, v2db};
use notesplit::Segmenter;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::f32::consts::PI;

const SR: u32 = 48000;

fn secs(s: f32) -> usize {
    (s * SR as f32) as usize
}

/// Seeded white noise with peak amplitude at `db` (RMS is 4.77 dB lower)
fn noise(n: usize, db: f32, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let amp = db2v(db);
    (0..n).map(|_| rng.gen_range(-1.0f32..1.0) * amp).collect()
}

/// Add a 0.5 amplitude sine from `from_s` to `to_s`
fn add_tone(samples: &mut [f32], from_s: f32, to_s: f32, freq: f32) {
    let (a, b) = (secs(from_s), secs(to_s).min(samples.len()));
    for (k, s) in samples[a..b].iter_mut().enumerate() {
        *s += 0.5 * (2.0 * PI * freq * k as f32 / SR as f32).sin();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_within_one_check_interval_of_duration() {
        let detection = DetectionConfig::default();
        let tolerance = detection.calc_interval(SR) + detection.rms_window(SR);
        for &duration in &[1.0f32, 2.5] {
            let mut samples = vec![0.0f32; secs(0.2 + duration + 3.0)];
            add_tone(&mut samples, 0.2, 0.2 + duration, 330.0);
            let mut take = Take::from_samples(samples, SR);

            let start = secs(0.2);
            let end = find_end(&mut take, start, -62.0, 0.1, 10.5, &detection).unwrap();
            let measured = end.end - start;
            let expected = secs(duration);
            assert!(measured >= expected, "{} s: ended early at {}", duration, measured);
            assert!(
                measured - expected <= tolerance,
                "{} s: measured {} expected {}",
                duration,
                measured,
                expected
            );
            assert_eq!(end.limit, end.end + secs(0.1));
            assert!(!end.limit_pinned);
            assert!(!end.truncated);
            assert!((end.peak_db - v2db(0.5)).abs() < 0.1);
        }
    }

    #[test]
    fn test_limit_pinned_when_note_exceeds_max_duration() {
        let detection = DetectionConfig::default();
        let mut samples = vec![0.0f32; secs(4.0)];
        add_tone(&mut samples, 0.0, 2.0, 220.0);
        let mut take = Take::from_samples(samples, SR);

        let end = find_end(&mut take, 0, -62.0, 0.1, 1.0, &detection).unwrap();
        assert!(end.limit_pinned);
        assert!(end.limit < end.end);
        // pinned at a crossing inside the last RMS window before 1 s
        assert!(end.limit <= secs(1.0) + 1);
        assert!(end.limit + detection.rms_window(SR) >= secs(1.0));
        assert!(end.end >= secs(2.0));
    }

    #[test]
    fn test_end_of_stream_truncates_note() {
        let detection = DetectionConfig::default();
        let mut samples = vec![0.0f32; secs(1.5)];
        add_tone(&mut samples, 0.5, 1.5, 220.0);
        let mut take = Take::from_samples(samples, SR);
        let total = take.total_frame_count();

        let end = find_end(&mut take, secs(0.5), -62.0, 0.1, 10.5, &detection).unwrap();
        assert!(end.truncated);
        assert_eq!(end.end, total - 1);
        assert_eq!(end.limit, end.end);
    }

    #[test]
    fn test_end_threshold_never_below_floor() {
        let detection = DetectionConfig::default();
        // -70 dB peak noise after the note; a -100 dB threshold alone would never end
        let mut samples = noise(secs(4.0), -70.0, 7);
        add_tone(&mut samples, 0.0, 1.0, 220.0);
        let mut take = Take::from_samples(samples, SR);
        let end = find_end(&mut take, 0, -100.0, 0.1, 10.5, &detection).unwrap();
        assert!(!end.truncated);
        assert!(end.end < secs(1.5));
    }

    #[test]
    fn test_measure_noise_of_white_noise() {
        let mut take = Take::from_samples(noise(secs(1.0), -60.0, 3), SR);
        let level = measure_noise(&mut take, 0, secs(0.5)).unwrap().unwrap();
        let expected = -60.0 - 20.0 * 3f32.sqrt().log10();
        assert!((level - expected).abs() < 0.3, "level {} expected {}", level, expected);
    }

    #[test]
    fn test_noise_probe_precedes_onset() {
        let onset = secs(3.0);
        let (start, duration) = noise_probe(onset, secs(1.0), secs(0.5));
        assert_eq!(start, secs(2.0));
        assert_eq!(duration, secs(0.5));
        assert!(start + duration <= onset);
    }

    #[test]
    fn test_noise_level_adapts_between_notes() {
        let mut config = Config::default();
        config.pitch.enabled = false;

        let mut samples = noise(secs(7.0), -70.0, 17);
        // the room gets louder before the second note
        for (s, n) in samples[secs(3.0)..]
            .iter_mut()
            .zip(noise(secs(4.0), -50.0, 19))
        {
            *s = n;
        }
        add_tone(&mut samples, 1.0, 2.5, 220.0);
        add_tone(&mut samples, 4.5, 6.0, 330.0);
        let mut take = Take::from_samples(samples, SR);

        let mut segmenter = Segmenter::new(&config);
        let first = segmenter.next_segment(&mut take).unwrap().unwrap();
        let second = segmenter.next_segment(&mut take).unwrap().unwrap();
        assert_eq!(segmenter.next_segment(&mut take).unwrap(), None);

        let history = &segmenter.state().noise_history;
        assert_eq!(history.len(), 2);
        assert!((history[0] - (-74.77)).abs() < 0.5, "quiet room {}", history[0]);
        assert!((history[1] - (-54.77)).abs() < 0.5, "loud room {}", history[1]);
        assert_eq!(first.noise_db, history[0]);
        assert_eq!(second.noise_db, history[1]);
        assert_eq!(segmenter.state().noise_default_db, history[1]);
    }

    #[test]
    fn test_unmeasurable_noise_falls_back_to_default() {
        let mut config = Config::default();
        config.pitch.enabled = false;
        config.detection.default_noise_db = -65.0;

        let mut samples = vec![0.0f32; secs(3.0)];
        add_tone(&mut samples, 0.002, 1.5, 220.0);
        let mut take = Take::from_samples(samples, SR);

        let mut segmenter = Segmenter::new(&config);
        let segment = segmenter.next_segment(&mut take).unwrap().unwrap();
        assert_eq!(segment.noise_db, -65.0);
        assert_eq!(segmenter.state().noise_default_db, -65.0);
    }
}
