//! Offline rendering of a note timeline to WAV.

use std::io::{Seek, Write};
use std::path::Path;

use serde::Serialize;
use tracing::info;

use crate::media::{NoteEvent, NoteTimeline};

use super::synth::SynthBus;
use super::voice::{Voice, Volume};
use super::PlaybackError;

const BLOCK: usize = 512;

#[derive(Debug, Clone, Serialize)]
pub struct RenderSummary {
    pub sample_rate: u32,
    pub samples: usize,
    pub seconds: f64,
    pub notes: usize,
}

/// Renders songs with the same voices the live player uses.
#[derive(Debug, Clone)]
pub struct OfflineRenderer {
    sample_rate: u32,
    volume: Volume,
}

impl OfflineRenderer {
    pub fn new(sample_rate: u32, volume: Volume) -> Self {
        Self {
            sample_rate: sample_rate.max(1),
            volume,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Mono samples for the whole song plus the release tail of the last note.
    pub fn render(&self, timeline: &NoteTimeline) -> Vec<f32> {
        let bus = SynthBus::new(self.sample_rate);
        let rate = self.sample_rate as f64;
        let tail = bus.envelope().release as f64;
        let total = ((timeline.duration() + tail) * rate).ceil() as usize;

        let mut voices: Vec<_> = timeline
            .tracks
            .iter()
            .map(|_| {
                let mut voice = bus.voice();
                voice.set_volume_db(self.volume.db());
                voice
            })
            .collect();

        let mut events: Vec<(usize, usize, &NoteEvent)> = timeline
            .tracks
            .iter()
            .enumerate()
            .flat_map(|(track, t)| {
                t.notes
                    .iter()
                    .map(move |note| ((note.time * rate).round() as usize, track, note))
            })
            .collect();
        events.sort_by_key(|(at, _, _)| *at);

        let mut out = vec![0.0f32; total];
        let mut cursor = 0;
        let mut next = 0;
        while cursor < total {
            while next < events.len() && events[next].0 <= cursor {
                let (_, track, note) = events[next];
                voices[track].trigger_attack_release(note);
                next += 1;
            }
            let upcoming = events.get(next).map(|e| e.0).unwrap_or(total);
            let end = upcoming.min(cursor + BLOCK).min(total).max(cursor + 1);
            bus.render(&mut out[cursor..end]);
            cursor = end;
        }

        for voice in voices.iter_mut() {
            voice.dispose();
        }
        out
    }

    /// Encode the rendered song as 16-bit mono PCM.
    pub fn write_wav<W: Write + Seek>(
        &self,
        timeline: &NoteTimeline,
        writer: W,
    ) -> Result<RenderSummary, PlaybackError> {
        let samples = self.render(timeline);
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: self.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut wav = hound::WavWriter::new(writer, spec)?;
        for sample in &samples {
            wav.write_sample((sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16)?;
        }
        wav.finalize()?;

        Ok(RenderSummary {
            sample_rate: self.sample_rate,
            samples: samples.len(),
            seconds: samples.len() as f64 / self.sample_rate as f64,
            notes: timeline.note_count(),
        })
    }

    pub fn write_wav_file(
        &self,
        timeline: &NoteTimeline,
        path: impl AsRef<Path>,
    ) -> Result<RenderSummary, PlaybackError> {
        let path = path.as_ref();
        let file = std::io::BufWriter::new(std::fs::File::create(path)?);
        let summary = self.write_wav(timeline, file)?;
        info!(
            "Rendered {} notes to {:?} ({:.1}s at {} Hz)",
            summary.notes, path, summary.seconds, summary.sample_rate
        );
        Ok(summary)
    }
}
