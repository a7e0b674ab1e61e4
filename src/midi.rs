//! MIDI note naming and cue file export

use crate::error::{Result as SplitResult, SplitError};
use crate::segment::NoteSegment;
use midly::num::{u15, u24, u28, u4, u7};
use midly::{Format, Header, MetaMessage, MidiMessage, Smf, TrackEvent, TrackEventKind};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Flat spelling, C first
pub const NOTE_NAMES: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

/// A4
pub const REFERENCE_NOTE: u8 = 69;
pub const REFERENCE_HZ: f32 = 440.0;

const PPQ: u16 = 960;
const TEMPO_USPQ: u32 = 500_000; // 120 BPM
const CUE_CHANNEL: u8 = 0;

/// Nearest MIDI note to a frequency
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MidiPitch {
    pub note: u8,
    pub name: String,
    /// Deviation from the equal-tempered note, -50..=50
    pub cents: i32,
}

/// Map a frequency to its nearest MIDI note, or `None` for 0 Hz / out of range
pub fn midi_note_for_freq(freq: f32) -> Option<MidiPitch> {
    if !(freq > 0.0) || !freq.is_finite() {
        return None;
    }
    let exact = REFERENCE_NOTE as f32 + 12.0 * (freq / REFERENCE_HZ).log2();
    let note = exact.round();
    if !(0.0..=127.0).contains(&note) {
        return None;
    }
    let note = note as u8;
    Some(MidiPitch {
        note,
        name: note_name(note),
        cents: ((exact - note as f32) * 100.0).round() as i32,
    })
}

/// `Bb3`, `C4`; MIDI 60 is C4
pub fn note_name(note: u8) -> String {
    let octave = note as i32 / 12 - 1;
    format!("{}{}", NOTE_NAMES[note as usize % 12], octave)
}

/// Fixed-width name for file names: single-letter notes get a `_` (`C_4`)
pub fn padded_note_name(note: u8) -> String {
    let letter = NOTE_NAMES[note as usize % 12];
    let octave = note as i32 / 12 - 1;
    if letter.len() == 1 {
        format!("{}_{}", letter, octave)
    } else {
        format!("{}{}", letter, octave)
    }
}

/// Velocity for a peak level: -60 dBFS and below is 1, 0 dBFS is 127
pub fn velocity_for_peak(peak_db: f32) -> u8 {
    let scaled = (peak_db + 60.0) / 60.0 * 126.0 + 1.0;
    scaled.round().clamp(1.0, 127.0) as u8
}

/// Write a single-track MIDI file with one note per pitched segment, placed
/// at the segment's position in the take (120 BPM, 960 PPQ).
pub fn export_cue_file(segments: &[NoteSegment], sample_rate: u32, path: &Path) -> SplitResult<()> {
    let bytes = segments_to_midi(segments, sample_rate)?;
    let mut file = File::create(path)?;
    file.write_all(&bytes)?;
    log::info!("Exported MIDI cue file to {}", path.display());
    Ok(())
}

/// Encode the segments as MIDI file bytes. Unpitched segments are omitted.
pub fn segments_to_midi(segments: &[NoteSegment], sample_rate: u32) -> SplitResult<Vec<u8>> {
    let ticks_per_second = PPQ as f64 * 1_000_000.0 / TEMPO_USPQ as f64;
    let to_tick = |frame: usize| (frame as f64 / sample_rate as f64 * ticks_per_second).round() as u32;

    // (tick, note-off first, key, velocity)
    let mut timeline: Vec<(u32, bool, u8, u8)> = Vec::new();
    for segment in segments {
        let Some(pitch) = midi_note_for_freq(segment.frequency_hz) else {
            continue;
        };
        let on = to_tick(segment.start);
        let off = to_tick(segment.limit).max(on + 1);
        timeline.push((on, false, pitch.note, velocity_for_peak(segment.peak_db)));
        timeline.push((off, true, pitch.note, 0));
    }
    // offs sort ahead of ons at the same tick
    timeline.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));

    let mut track_events = vec![TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::from(TEMPO_USPQ))),
    }];

    let mut current_tick = 0u32;
    for (tick, is_off, key, vel) in timeline {
        let message = if is_off {
            MidiMessage::NoteOff {
                key: u7::from(key),
                vel: u7::from(0),
            }
        } else {
            MidiMessage::NoteOn {
                key: u7::from(key),
                vel: u7::from(vel),
            }
        };
        track_events.push(TrackEvent {
            delta: u28::from(tick - current_tick),
            kind: TrackEventKind::Midi {
                channel: u4::from(CUE_CHANNEL),
                message,
            },
        });
        current_tick = tick;
    }

    track_events.push(TrackEvent {
        delta: u28::from(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let smf = Smf {
        header: Header {
            format: Format::SingleTrack,
            timing: midly::Timing::Metrical(u15::from(PPQ)),
        },
        tracks: vec![track_events],
    };

    let mut bytes = Vec::new();
    smf.write(&mut bytes)
        .map_err(|e| SplitError::ExportError(format!("Failed to write MIDI data: {:?}", e)))?;
    Ok(bytes)
}
