//! Decoding of audio-note files into note timelines.

mod midi;
mod note;

pub use midi::{MediaError, MidiParser};
pub use note::{format_clock, note_frequency, note_name, NoteEvent, NoteTimeline, TrackTimeline};
