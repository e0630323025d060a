//! Synthesis voices and volume conversion.

use std::fmt;

use tracing::trace;

use crate::media::{NoteEvent, TrackTimeline};

/// One polyphonic voice, assigned to a single track of a song.
pub trait Voice: Send {
    /// Start `note` now and release it after its duration.
    fn trigger_attack_release(&mut self, note: &NoteEvent);

    /// Release every note currently sounding.
    fn release_all(&mut self);

    fn set_volume_db(&mut self, db: f32);

    /// Free the voice. A disposed voice ignores further triggers.
    fn dispose(&mut self);
}

/// Creates voices for the tracks of a song.
pub trait VoiceFactory: Send + Sync {
    fn create_voice(&self, track_index: usize, track: &TrackTimeline) -> Box<dyn Voice>;
}

/// Linear gain to decibels. Zero (or less) maps to negative infinity.
pub fn gain_to_db(gain: f32) -> f32 {
    if gain <= 0.0 || gain.is_nan() {
        f32::NEG_INFINITY
    } else {
        20.0 * gain.log10()
    }
}

pub fn db_to_gain(db: f32) -> f32 {
    if db == f32::NEG_INFINITY || db.is_nan() {
        0.0
    } else {
        10f32.powf(db / 20.0)
    }
}

/// Linear volume in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Volume(f32);

impl Volume {
    pub const DEFAULT: Volume = Volume(0.8);

    pub fn new(linear: f32) -> Self {
        if linear.is_nan() {
            return Volume(0.0);
        }
        Volume(linear.clamp(0.0, 1.0))
    }

    pub fn linear(&self) -> f32 {
        self.0
    }

    pub fn db(&self) -> f32 {
        gain_to_db(self.0)
    }
}

impl Default for Volume {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Volume {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.0}%", self.0 * 100.0)
    }
}

/// A voice that only traces what it would play.
#[derive(Debug, Default)]
pub struct SilentVoice {
    track: usize,
    disposed: bool,
}

impl Voice for SilentVoice {
    fn trigger_attack_release(&mut self, note: &NoteEvent) {
        if !self.disposed {
            trace!("track {} note {} ({:.3}s)", self.track, note.name, note.duration);
        }
    }

    fn release_all(&mut self) {}

    fn set_volume_db(&mut self, _db: f32) {}

    fn dispose(&mut self) {
        self.disposed = true;
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SilentVoiceFactory;

impl VoiceFactory for SilentVoiceFactory {
    fn create_voice(&self, track_index: usize, _track: &TrackTimeline) -> Box<dyn Voice> {
        Box::new(SilentVoice {
            track: track_index,
            disposed: false,
        })
    }
}
