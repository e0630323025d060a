//! Note events and the per-track timelines they live in.

use serde::Serialize;

const PITCH_CLASSES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Scientific pitch name of a MIDI note number, with middle C (60) as `C4`.
pub fn note_name(midi: u8) -> String {
    let octave = (midi as i32 / 12) - 1;
    format!("{}{}", PITCH_CLASSES[(midi % 12) as usize], octave)
}

/// Equal-tempered frequency in Hz, A4 (69) = 440 Hz.
pub fn note_frequency(midi: u8) -> f32 {
    440.0 * 2f32.powf((midi as f32 - 69.0) / 12.0)
}

/// Formats a position in seconds as `m:ss`, flooring partial seconds.
///
/// Negative and non-finite inputs render as `0:00`.
pub fn format_clock(seconds: f64) -> String {
    let total = if seconds.is_finite() && seconds > 0.0 {
        seconds.floor() as u64
    } else {
        0
    };
    format!("{}:{:02}", total / 60, total % 60)
}

/// A single note, in absolute seconds from the start of the song.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NoteEvent {
    /// MIDI note number (0-127).
    pub midi: u8,
    /// Pitch name, e.g. `C#4`.
    pub name: String,
    /// Start time in seconds.
    pub time: f64,
    /// Length in seconds.
    pub duration: f64,
    /// Normalized velocity (0.0-1.0).
    pub velocity: f32,
}

impl NoteEvent {
    pub fn new(midi: u8, time: f64, duration: f64, velocity: f32) -> Self {
        Self {
            midi,
            name: note_name(midi),
            time,
            duration,
            velocity,
        }
    }

    pub fn end(&self) -> f64 {
        self.time + self.duration
    }

    pub fn frequency(&self) -> f32 {
        note_frequency(self.midi)
    }
}

/// Notes belonging to one track of the source file.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TrackTimeline {
    pub name: Option<String>,
    /// First channel any channel message of the track used.
    pub channel: Option<u8>,
    /// Notes ordered by start time.
    pub notes: Vec<NoteEvent>,
}

/// A decoded song: every track of the file, including note-less ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NoteTimeline {
    pub tracks: Vec<TrackTimeline>,
}

impl NoteTimeline {
    /// Total length: the latest note end across all tracks.
    pub fn duration(&self) -> f64 {
        self.notes().map(NoteEvent::end).fold(0.0, f64::max)
    }

    pub fn notes(&self) -> impl Iterator<Item = &NoteEvent> {
        self.tracks.iter().flat_map(|t| t.notes.iter())
    }

    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.notes.len()).sum()
    }

    pub fn is_silent(&self) -> bool {
        self.note_count() == 0
    }
}
