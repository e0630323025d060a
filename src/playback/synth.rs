//! Polyphonic software synthesizer.
//!
//! Every [`PolySynth`] voice pushes partials into a shared [`SynthBus`], which
//! mixes them to a mono signal on demand. The bus is driven either by the
//! offline renderer or by a live output stream.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::media::NoteEvent;

use super::voice::{db_to_gain, Voice, VoiceFactory};

/// Keeps a full chord of loud notes away from clipping.
const HEADROOM: f32 = 0.2;

/// Attack/decay/sustain/release envelope, times in seconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    pub attack: f32,
    pub decay: f32,
    pub sustain: f32,
    pub release: f32,
}

impl Default for Envelope {
    fn default() -> Self {
        Self {
            attack: 0.005,
            decay: 0.1,
            sustain: 0.3,
            release: 1.0,
        }
    }
}

impl Envelope {
    /// Level while the note is held, `t` seconds after the attack.
    fn held_level(&self, t: f32) -> f32 {
        if t < self.attack {
            t / self.attack
        } else if t < self.attack + self.decay {
            1.0 - (1.0 - self.sustain) * (t - self.attack) / self.decay
        } else {
            self.sustain
        }
    }
}

#[derive(Debug, Clone)]
struct Partial {
    voice: u64,
    phase: f32,
    step: f32,
    velocity: f32,
    age: u64,
    hold: u64,
    released: Option<(u64, f32)>,
}

impl Partial {
    fn level(&self, envelope: &Envelope, sample_rate: f32) -> f32 {
        match self.released {
            None => envelope.held_level(self.age as f32 / sample_rate),
            Some((at, from)) => {
                let t = (self.age - at) as f32 / sample_rate;
                from * (1.0 - t / envelope.release).max(0.0)
            }
        }
    }

    fn release(&mut self, envelope: &Envelope, sample_rate: f32) {
        if self.released.is_none() {
            self.released = Some((self.age, self.level(envelope, sample_rate)));
        }
    }

    fn finished(&self, envelope: &Envelope, sample_rate: f32) -> bool {
        match self.released {
            Some((at, _)) => (self.age - at) as f32 / sample_rate >= envelope.release,
            None => false,
        }
    }
}

#[derive(Debug)]
struct BusState {
    sample_rate: u32,
    envelope: Envelope,
    partials: Vec<Partial>,
    gains: HashMap<u64, f32>,
    next_voice: u64,
}

/// Shared mixing bus for [`PolySynth`] voices.
#[derive(Debug, Clone)]
pub struct SynthBus {
    inner: Arc<Mutex<BusState>>,
}

impl SynthBus {
    pub fn new(sample_rate: u32) -> Self {
        Self::with_envelope(sample_rate, Envelope::default())
    }

    pub fn with_envelope(sample_rate: u32, envelope: Envelope) -> Self {
        Self {
            inner: Arc::new(Mutex::new(BusState {
                sample_rate: sample_rate.max(1),
                envelope,
                partials: Vec::new(),
                gains: HashMap::new(),
                next_voice: 0,
            })),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BusState> {
        // The state stays consistent even if a holder panicked.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn sample_rate(&self) -> u32 {
        self.lock().sample_rate
    }

    pub fn envelope(&self) -> Envelope {
        self.lock().envelope
    }

    /// Number of notes still sounding, including release tails.
    pub fn active_partials(&self) -> usize {
        self.lock().partials.len()
    }

    pub fn voice(&self) -> PolySynth {
        let mut state = self.lock();
        let id = state.next_voice;
        state.next_voice += 1;
        state.gains.insert(id, 1.0);
        PolySynth {
            id,
            bus: self.clone(),
            disposed: false,
        }
    }

    /// Mix the next `out.len()` mono samples, overwriting `out`.
    pub fn render(&self, out: &mut [f32]) {
        let mut state = self.lock();
        let BusState {
            sample_rate,
            envelope,
            partials,
            gains,
            ..
        } = &mut *state;
        let sample_rate = *sample_rate as f32;

        for sample in out.iter_mut() {
            let mut mix = 0.0;
            for partial in partials.iter_mut() {
                if partial.released.is_none() && partial.age >= partial.hold {
                    partial.release(envelope, sample_rate);
                }
                let gain = gains.get(&partial.voice).copied().unwrap_or(0.0);
                let triangle = 4.0 * (partial.phase - 0.5).abs() - 1.0;
                mix += triangle * partial.level(envelope, sample_rate) * partial.velocity * gain;

                partial.phase = (partial.phase + partial.step).fract();
                partial.age += 1;
            }
            *sample = (mix * HEADROOM).clamp(-1.0, 1.0);
            partials.retain(|p| !p.finished(envelope, sample_rate));
        }
    }
}

/// A voice of the software synthesizer.
#[derive(Debug)]
pub struct PolySynth {
    id: u64,
    bus: SynthBus,
    disposed: bool,
}

impl Voice for PolySynth {
    fn trigger_attack_release(&mut self, note: &NoteEvent) {
        if self.disposed {
            return;
        }
        let mut state = self.bus.lock();
        let sample_rate = state.sample_rate as f32;
        state.partials.push(Partial {
            voice: self.id,
            phase: 0.0,
            step: note.frequency() / sample_rate,
            velocity: note.velocity,
            age: 0,
            hold: (note.duration * sample_rate as f64).round() as u64,
            released: None,
        });
    }

    fn release_all(&mut self) {
        let mut state = self.bus.lock();
        let sample_rate = state.sample_rate as f32;
        let envelope = state.envelope;
        for partial in state.partials.iter_mut().filter(|p| p.voice == self.id) {
            partial.release(&envelope, sample_rate);
        }
    }

    fn set_volume_db(&mut self, db: f32) {
        if self.disposed {
            return;
        }
        self.bus.lock().gains.insert(self.id, db_to_gain(db));
    }

    fn dispose(&mut self) {
        let mut state = self.bus.lock();
        state.partials.retain(|p| p.voice != self.id);
        state.gains.remove(&self.id);
        self.disposed = true;
    }
}

/// Hands out [`PolySynth`] voices on one bus.
#[derive(Debug, Clone)]
pub struct SynthVoiceFactory {
    bus: SynthBus,
}

impl SynthVoiceFactory {
    pub fn new(bus: SynthBus) -> Self {
        Self { bus }
    }

    pub fn bus(&self) -> &SynthBus {
        &self.bus
    }
}

impl VoiceFactory for SynthVoiceFactory {
    fn create_voice(&self, _track_index: usize, _track: &crate::media::TrackTimeline) -> Box<dyn Voice> {
        Box::new(self.bus.voice())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 8_000;

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    #[test]
    fn test_silent_bus_renders_zeros() {
        let bus = SynthBus::new(RATE);
        let mut out = vec![1.0; 64];
        bus.render(&mut out);
        assert!(out.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn test_note_sounds_then_decays_away() {
        let bus = SynthBus::new(RATE);
        let mut voice = bus.voice();
        voice.trigger_attack_release(&NoteEvent::new(69, 0.0, 0.1, 1.0));

        let mut held = vec![0.0; (RATE / 10) as usize];
        bus.render(&mut held);
        assert!(peak(&held) > 0.01);
        assert_eq!(bus.active_partials(), 1);

        // Release lasts one second by default.
        let mut tail = vec![0.0; RATE as usize + 10];
        bus.render(&mut tail);
        assert_eq!(bus.active_partials(), 0);
        assert!(peak(&tail[tail.len() - 5..]) == 0.0);
    }

    #[test]
    fn test_volume_scales_output() {
        let loud_bus = SynthBus::new(RATE);
        let quiet_bus = SynthBus::new(RATE);
        let note = NoteEvent::new(60, 0.0, 0.5, 1.0);

        let mut loud = loud_bus.voice();
        loud.trigger_attack_release(&note);
        let mut quiet = quiet_bus.voice();
        quiet.set_volume_db(-20.0);
        quiet.trigger_attack_release(&note);

        let mut a = vec![0.0; 800];
        let mut b = vec![0.0; 800];
        loud_bus.render(&mut a);
        quiet_bus.render(&mut b);
        assert!((peak(&b) - peak(&a) * 0.1).abs() < 1e-3);
    }

    #[test]
    fn test_release_all_only_affects_own_voice() {
        let bus = SynthBus::new(RATE);
        let mut first = bus.voice();
        let mut second = bus.voice();
        first.trigger_attack_release(&NoteEvent::new(60, 0.0, 10.0, 1.0));
        second.trigger_attack_release(&NoteEvent::new(64, 0.0, 10.0, 1.0));

        first.release_all();
        let mut out = vec![0.0; RATE as usize + 10];
        bus.render(&mut out);

        assert_eq!(bus.active_partials(), 1);
    }

    #[test]
    fn test_dispose_silences_and_ignores_triggers() {
        let bus = SynthBus::new(RATE);
        let mut voice = bus.voice();
        voice.trigger_attack_release(&NoteEvent::new(60, 0.0, 1.0, 1.0));
        voice.dispose();
        voice.trigger_attack_release(&NoteEvent::new(62, 0.0, 1.0, 1.0));

        assert_eq!(bus.active_partials(), 0);
    }
}
