//! # MIDI Module
//!
//! Frequency to MIDI note conversion based on 12-tone equal temperament
//! (A4 = 440 Hz = note 69), note naming, and offline serialization of a
//! sequence of timed notes to a standard MIDI file.

use midly::{
    Format, Header, MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind,
    num::{u4, u7, u15, u24, u28},
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::MidiError;

/// Ticks per beat of written files, same as the usual sequencer default.
pub const TICKS_PER_BEAT: u16 = 480;
/// General MIDI program selected at the start of every written track.
pub const DEFAULT_PROGRAM: u8 = 12;

const MAX_TEMPO: u32 = 0x00FF_FFFF;
const MAX_TICKS: u32 = 0x0FFF_FFFF;

/// A note played at a known position, as produced by a sequencing layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Note {
    pub pitch: u8,
    pub velocity: u8,
    pub position_secs: f32,
    pub duration_secs: f32,
}

/// A note to be played right away.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RealtimeNote {
    pub pitch: u8,
    pub velocity: u8,
    pub duration_secs: f32,
}

/// Converts a frequency in Hz to a fractional MIDI note number.
///
/// `freq` must be positive; the logarithm of zero or a negative value is
/// not a note.
pub fn hz_to_midi(freq: f32) -> f32 {
    12.0 * (freq.log2() - 440.0f32.log2()) + 69.0
}

/// Converts several frequencies at once.
pub fn hz_to_midi_many(frequencies: &[f32]) -> Vec<f32> {
    frequencies.iter().map(|&f| hz_to_midi(f)).collect()
}

/// Converts a MIDI note number to its equal-temperament frequency.
pub fn midi_to_hz(pitch: u8) -> f32 {
    440.0 * 2.0f32.powf((pitch as f32 - 69.0) / 12.0)
}

/// Nearest MIDI note for a frequency, or `None` when the frequency is not
/// positive and finite or falls outside the 0..=127 note range.
pub fn midi_pitch(freq: f32) -> Option<u8> {
    if !freq.is_finite() || freq <= 0.0 {
        return None;
    }
    let note = hz_to_midi(freq).round();
    if (0.0..=127.0).contains(&note) {
        Some(note as u8)
    } else {
        None
    }
}

/// Names of all 128 MIDI notes, "C-1" to "G9".
static NOTE_NAMES: Lazy<Vec<String>> = Lazy::new(|| {
    const PITCH_CLASSES: [&str; 12] = [
        "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
    ];
    (0..128)
        .map(|pitch: i32| format!("{}{}", PITCH_CLASSES[(pitch % 12) as usize], pitch / 12 - 1))
        .collect()
});

/// Name of a MIDI note, e.g. "A4" for 69. Values above 127 are clamped.
pub fn note_name(pitch: u8) -> &'static str {
    &NOTE_NAMES[pitch.min(127) as usize]
}

fn seconds_to_ticks(secs: f32, sec_per_tick: f64) -> u32 {
    (secs.max(0.0) as f64 / sec_per_tick).round() as u32
}

/// Builds a single-track standard MIDI file holding `notes` in order.
///
/// The track starts with a program change and a tempo event derived from
/// `bpm`, followed by one note-on/note-off pair per note. Notes are treated
/// as monophonic: a note that starts before the previous one has ended is
/// moved to start right after it.
///
/// # Arguments
/// * `notes` - Notes in playing order, positions and durations in seconds
/// * `bpm` - Tempo written to the file, used to convert seconds to ticks
///
/// # Returns
/// * `Ok(smf)` - The file contents, ready to be saved
/// * `Err(MidiError::Invalid)` - Non-positive `bpm`, a pitch or velocity above
///   127, or a note too late to fit into a track
pub fn build_smf(notes: &[Note], bpm: f32) -> Result<Smf<'static>, MidiError> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(MidiError::Invalid(format!("bpm must be positive, got {bpm}")));
    }
    let tempo = (60_000_000.0 / bpm as f64) as u32;
    if tempo > MAX_TEMPO {
        return Err(MidiError::Invalid(format!("bpm {bpm} is too slow")));
    }
    let sec_per_tick = tempo as f64 / 1_000_000.0 / TICKS_PER_BEAT as f64;

    let channel = u4::new(0);
    let mut track = vec![
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::ProgramChange {
                    program: u7::new(DEFAULT_PROGRAM),
                },
            },
        },
        TrackEvent {
            delta: u28::new(0),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(u24::new(tempo))),
        },
    ];

    let mut now = 0u32;
    for note in notes {
        if note.pitch > 127 || note.velocity > 127 {
            return Err(MidiError::Invalid(format!(
                "note {} with velocity {} is out of range",
                note.pitch, note.velocity
            )));
        }
        let start = seconds_to_ticks(note.position_secs, sec_per_tick).max(now);
        let end = start.saturating_add(seconds_to_ticks(note.duration_secs, sec_per_tick));
        if end > MAX_TICKS {
            return Err(MidiError::Invalid(format!(
                "note at {}s does not fit into a MIDI track",
                note.position_secs
            )));
        }
        let key = u7::new(note.pitch);
        let vel = u7::new(note.velocity);
        track.push(TrackEvent {
            delta: u28::new(start - now),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn { key, vel },
            },
        });
        track.push(TrackEvent {
            delta: u28::new(end - start),
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOff { key, vel },
            },
        });
        now = end;
    }
    track.push(TrackEvent {
        delta: u28::new(0),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    let mut smf = Smf::new(Header::new(
        Format::SingleTrack,
        Timing::Metrical(u15::new(TICKS_PER_BEAT)),
    ));
    smf.tracks.push(track);
    Ok(smf)
}

/// Writes `notes` to a standard MIDI file at `path`.
pub fn write_midi_file(path: impl AsRef<Path>, notes: &[Note], bpm: f32) -> Result<(), MidiError> {
    let smf = build_smf(notes, bpm)?;
    smf.save(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a4_is_note_69() {
        assert!((hz_to_midi(440.0) - 69.0).abs() < 1e-5);
        assert!((hz_to_midi(220.0) - 57.0).abs() < 1e-4);
        assert!((hz_to_midi(880.0) - 81.0).abs() < 1e-4);
    }

    #[test]
    fn conversion_is_vectorized() {
        let notes = hz_to_midi_many(&[110.0, 440.0]);
        assert_eq!(notes.len(), 2);
        assert!((notes[0] - 45.0).abs() < 1e-4);
        assert!((notes[1] - 69.0).abs() < 1e-5);
    }

    #[test]
    fn midi_to_hz_inverts_hz_to_midi() {
        for pitch in [40u8, 57, 69, 84] {
            assert!((hz_to_midi(midi_to_hz(pitch)) - pitch as f32).abs() < 1e-3);
        }
    }

    #[test]
    fn midi_pitch_rounds_to_nearest() {
        // 225 Hz is ~57.39 -> 57, 228 Hz is ~57.63 -> 58
        assert_eq!(midi_pitch(225.0), Some(57));
        assert_eq!(midi_pitch(228.0), Some(58));
        assert_eq!(midi_pitch(0.0), None);
        assert_eq!(midi_pitch(-10.0), None);
        assert_eq!(midi_pitch(f32::NAN), None);
        assert_eq!(midi_pitch(1.0), None);
    }

    #[test]
    fn note_names() {
        assert_eq!(note_name(69), "A4");
        assert_eq!(note_name(60), "C4");
        assert_eq!(note_name(61), "C#4");
        assert_eq!(note_name(0), "C-1");
        assert_eq!(note_name(200), "G9");
    }

    #[test]
    fn smf_has_program_tempo_and_note_pairs() {
        let notes = vec![
            Note { pitch: 60, velocity: 100, position_secs: 0.0, duration_secs: 0.5 },
            Note { pitch: 64, velocity: 90, position_secs: 1.0, duration_secs: 0.25 },
        ];
        let smf = build_smf(&notes, 120.0).unwrap();
        assert_eq!(smf.tracks.len(), 1);
        let track = &smf.tracks[0];
        assert_eq!(track.len(), 7);

        assert!(matches!(
            track[0].kind,
            TrackEventKind::Midi { message: MidiMessage::ProgramChange { .. }, .. }
        ));
        // 120 bpm -> 500_000 us per beat
        match track[1].kind {
            TrackEventKind::Meta(MetaMessage::Tempo(tempo)) => assert_eq!(tempo.as_int(), 500_000),
            ref other => panic!("expected tempo, got {other:?}"),
        }

        // At 120 bpm and 480 ticks per beat one second is 960 ticks.
        let deltas: Vec<u32> = track[2..6].iter().map(|e| e.delta.as_int()).collect();
        assert_eq!(deltas, vec![0, 480, 480, 240]);
        assert!(matches!(
            track[6].kind,
            TrackEventKind::Meta(MetaMessage::EndOfTrack)
        ));
    }

    #[test]
    fn overlapping_notes_are_serialized_back_to_back() {
        let notes = vec![
            Note { pitch: 60, velocity: 100, position_secs: 0.0, duration_secs: 1.0 },
            Note { pitch: 62, velocity: 100, position_secs: 0.5, duration_secs: 1.0 },
        ];
        let smf = build_smf(&notes, 120.0).unwrap();
        let deltas: Vec<u32> = smf.tracks[0][2..6].iter().map(|e| e.delta.as_int()).collect();
        assert_eq!(deltas, vec![0, 960, 0, 960]);
    }

    #[test]
    fn invalid_bpm_is_rejected() {
        assert!(matches!(build_smf(&[], 0.0), Err(MidiError::Invalid(_))));
        assert!(matches!(build_smf(&[], f32::NAN), Err(MidiError::Invalid(_))));
    }

    #[test]
    fn written_file_parses_back() {
        let path = std::env::temp_dir().join(format!("onset-notes-{}.mid", std::process::id()));
        let notes = vec![Note { pitch: 57, velocity: 100, position_secs: 0.25, duration_secs: 0.5 }];
        write_midi_file(&path, &notes, 90.0).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        std::fs::remove_file(&path).ok();
        let smf = Smf::parse(&bytes).unwrap();
        assert_eq!(smf.header.timing, Timing::Metrical(u15::new(TICKS_PER_BEAT)));
        assert_eq!(smf.tracks[0].len(), 5);
    }
}
