//! Standard MIDI File decoding.
//!
//! Uses `midly` for the container format and converts every track into a
//! list of notes with absolute times in seconds, honouring the tempo map.

use std::collections::{HashMap, VecDeque};
use std::path::Path;

use midly::{MetaMessage, MidiMessage, Smf, Timing, TrackEvent, TrackEventKind};
use thiserror::Error;
use tracing::debug;

use super::note::{NoteEvent, NoteTimeline, TrackTimeline};

/// 120 BPM, the SMF default when no tempo event is present.
const DEFAULT_US_PER_QUARTER: u32 = 500_000;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid MIDI data: {0}")]
    InvalidMidi(#[from] midly::Error),
}

#[derive(Debug, Clone, Copy)]
struct TempoSegment {
    tick: u64,
    seconds: f64,
    us_per_quarter: u32,
}

/// Converts absolute ticks into seconds.
#[derive(Debug, Clone)]
enum TickClock {
    Metrical {
        ticks_per_beat: f64,
        segments: Vec<TempoSegment>,
    },
    Timecode {
        ticks_per_second: f64,
    },
}

impl TickClock {
    fn metrical(ticks_per_beat: u16, mut tempos: Vec<(u64, u32)>) -> Self {
        let ticks_per_beat = ticks_per_beat.max(1) as f64;
        tempos.sort_by_key(|(tick, _)| *tick);

        let mut segments = vec![TempoSegment {
            tick: 0,
            seconds: 0.0,
            us_per_quarter: DEFAULT_US_PER_QUARTER,
        }];
        for (tick, us_per_quarter) in tempos {
            let last = segments[segments.len() - 1];
            if tick == last.tick {
                // A later event at the same tick wins.
                let idx = segments.len() - 1;
                segments[idx].us_per_quarter = us_per_quarter;
                continue;
            }
            let seconds = last.seconds
                + (tick - last.tick) as f64 * last.us_per_quarter as f64
                    / 1_000_000.0
                    / ticks_per_beat;
            segments.push(TempoSegment {
                tick,
                seconds,
                us_per_quarter,
            });
        }

        TickClock::Metrical {
            ticks_per_beat,
            segments,
        }
    }

    fn seconds_at(&self, tick: u64) -> f64 {
        match self {
            TickClock::Metrical {
                ticks_per_beat,
                segments,
            } => {
                let idx = segments.partition_point(|s| s.tick <= tick).saturating_sub(1);
                let seg = segments[idx];
                seg.seconds
                    + (tick - seg.tick) as f64 * seg.us_per_quarter as f64
                        / 1_000_000.0
                        / ticks_per_beat
            }
            TickClock::Timecode { ticks_per_second } => tick as f64 / ticks_per_second,
        }
    }
}

/// Decoder for MIDI files into [`NoteTimeline`]s.
pub struct MidiParser;

impl MidiParser {
    /// Read and decode a MIDI file from disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<NoteTimeline, MediaError> {
        let data = tokio::fs::read(path.as_ref()).await?;
        Self::parse(&data)
    }

    /// Decode MIDI bytes.
    pub fn parse(data: &[u8]) -> Result<NoteTimeline, MediaError> {
        let smf = Smf::parse(data)?;

        let clock = match smf.header.timing {
            Timing::Metrical(tpb) => TickClock::metrical(tpb.as_int(), collect_tempos(&smf.tracks)),
            Timing::Timecode(fps, ticks_per_frame) => TickClock::Timecode {
                ticks_per_second: (fps.as_f32() as f64 * ticks_per_frame.max(1) as f64).max(1.0),
            },
        };

        let tracks: Vec<TrackTimeline> = smf
            .tracks
            .iter()
            .map(|track| decode_track(track, &clock))
            .collect();

        let timeline = NoteTimeline { tracks };
        debug!(
            "Decoded MIDI: {} tracks, {} notes, {:.2}s",
            timeline.tracks.len(),
            timeline.note_count(),
            timeline.duration()
        );
        Ok(timeline)
    }
}

/// Tempo changes from every track, as (absolute tick, microseconds per quarter).
fn collect_tempos(tracks: &[Vec<TrackEvent<'_>>]) -> Vec<(u64, u32)> {
    let mut tempos = Vec::new();
    for track in tracks {
        let mut tick = 0u64;
        for event in track {
            tick += event.delta.as_int() as u64;
            if let TrackEventKind::Meta(MetaMessage::Tempo(tempo)) = event.kind {
                tempos.push((tick, tempo.as_int()));
            }
        }
    }
    tempos
}

fn decode_track(track: &[TrackEvent<'_>], clock: &TickClock) -> TrackTimeline {
    let mut tick = 0u64;
    let mut name = None;
    let mut channel = None;
    // Pending note-ons per (channel, key), matched first-in first-out.
    let mut open: HashMap<(u8, u8), VecDeque<(u64, u8)>> = HashMap::new();
    let mut spans: Vec<(u64, u64, u8, u8)> = Vec::new();

    for event in track {
        tick += event.delta.as_int() as u64;
        match event.kind {
            TrackEventKind::Midi {
                channel: ch,
                message,
            } => {
                let ch = ch.as_int();
                channel.get_or_insert(ch);
                match message {
                    MidiMessage::NoteOn { key, vel } if vel.as_int() > 0 => {
                        open.entry((ch, key.as_int()))
                            .or_default()
                            .push_back((tick, vel.as_int()));
                    }
                    MidiMessage::NoteOn { key, .. } | MidiMessage::NoteOff { key, .. } => {
                        if let Some((start, vel)) = open
                            .get_mut(&(ch, key.as_int()))
                            .and_then(|pending| pending.pop_front())
                        {
                            spans.push((start, tick, key.as_int(), vel));
                        }
                    }
                    _ => {}
                }
            }
            TrackEventKind::Meta(MetaMessage::TrackName(raw)) => {
                let text = String::from_utf8_lossy(raw).trim().to_string();
                if !text.is_empty() {
                    name = Some(text);
                }
            }
            _ => {}
        }
    }

    // Notes never released end with the track.
    for ((_, key), pending) in open {
        for (start, vel) in pending {
            spans.push((start, tick, key, vel));
        }
    }
    spans.sort_by_key(|&(start, _, key, _)| (start, key));

    let notes = spans
        .into_iter()
        .map(|(start, end, key, vel)| {
            let time = clock.seconds_at(start);
            let duration = (clock.seconds_at(end) - time).max(0.0);
            NoteEvent::new(key, time, duration, vel as f32 / 127.0)
        })
        .collect();

    TrackTimeline {
        name,
        channel,
        notes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use midly::num::{u15, u24, u28, u4, u7};
    use midly::{Format, Fps, Header};

    fn ev(delta: u32, kind: TrackEventKind<'static>) -> TrackEvent<'static> {
        TrackEvent {
            delta: u28::new(delta),
            kind,
        }
    }

    fn on(key: u8, vel: u8) -> TrackEventKind<'static> {
        TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOn {
                key: u7::new(key),
                vel: u7::new(vel),
            },
        }
    }

    fn off(key: u8) -> TrackEventKind<'static> {
        TrackEventKind::Midi {
            channel: u4::new(0),
            message: MidiMessage::NoteOff {
                key: u7::new(key),
                vel: u7::new(0),
            },
        }
    }

    fn tempo(us_per_quarter: u32) -> TrackEventKind<'static> {
        TrackEventKind::Meta(MetaMessage::Tempo(u24::new(us_per_quarter)))
    }

    fn end() -> TrackEventKind<'static> {
        TrackEventKind::Meta(MetaMessage::EndOfTrack)
    }

    fn smf_bytes(tracks: Vec<Vec<TrackEvent<'static>>>) -> Vec<u8> {
        smf_bytes_with(Timing::Metrical(u15::new(480)), tracks)
    }

    fn smf_bytes_with(timing: Timing, tracks: Vec<Vec<TrackEvent<'static>>>) -> Vec<u8> {
        let smf = Smf {
            header: Header::new(Format::Parallel, timing),
            tracks,
        };
        let mut out = Vec::new();
        smf.write_std(&mut out).unwrap();
        out
    }

    #[test]
    fn test_default_tempo_conversion() {
        let data = smf_bytes(vec![vec![ev(480, on(60, 127)), ev(960, off(60)), ev(0, end())]]);
        let timeline = MidiParser::parse(&data).unwrap();

        assert_eq!(timeline.tracks.len(), 1);
        let note = &timeline.tracks[0].notes[0];
        assert_eq!(note.name, "C4");
        assert!((note.time - 0.5).abs() < 1e-9);
        assert!((note.duration - 1.0).abs() < 1e-9);
        assert!((note.velocity - 1.0).abs() < 1e-6);
        assert!((timeline.duration() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_tempo_change_from_conductor_track() {
        // Quarter = 1s for the first beat, then 0.25s.
        let conductor = vec![ev(0, tempo(1_000_000)), ev(480, tempo(250_000)), ev(0, end())];
        let melody = vec![
            ev(0, on(60, 100)),
            ev(480, off(60)),
            ev(0, on(62, 100)),
            ev(480, off(62)),
            ev(0, end()),
        ];
        let timeline = MidiParser::parse(&smf_bytes(vec![conductor, melody])).unwrap();

        assert_eq!(timeline.tracks.len(), 2);
        assert!(timeline.tracks[0].notes.is_empty());
        let notes = &timeline.tracks[1].notes;
        assert!((notes[0].time - 0.0).abs() < 1e-9);
        assert!((notes[0].duration - 1.0).abs() < 1e-9);
        assert!((notes[1].time - 1.0).abs() < 1e-9);
        assert!((notes[1].duration - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_smpte_timecode_conversion() {
        // 25 fps * 40 ticks per frame = 1000 ticks per second; tempo is ignored.
        let data = smf_bytes_with(
            Timing::Timecode(Fps::Fps25, 40),
            vec![vec![
                ev(0, tempo(250_000)),
                ev(500, on(69, 100)),
                ev(1_000, off(69)),
                ev(0, end()),
            ]],
        );
        let timeline = MidiParser::parse(&data).unwrap();

        let note = &timeline.tracks[0].notes[0];
        assert_eq!(note.name, "A4");
        assert!((note.time - 0.5).abs() < 1e-9);
        assert!((note.duration - 1.0).abs() < 1e-9);
        assert!((timeline.duration() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_note_on_with_zero_velocity_releases() {
        let data = smf_bytes(vec![vec![ev(0, on(64, 90)), ev(240, on(64, 0)), ev(0, end())]]);
        let timeline = MidiParser::parse(&data).unwrap();

        let notes = &timeline.tracks[0].notes;
        assert_eq!(notes.len(), 1);
        assert!((notes[0].duration - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_chord_keeps_every_note() {
        let data = smf_bytes(vec![vec![
            ev(0, on(60, 100)),
            ev(0, on(64, 100)),
            ev(0, on(67, 100)),
            ev(480, off(60)),
            ev(0, off(64)),
            ev(0, off(67)),
            ev(0, end()),
        ]]);
        let timeline = MidiParser::parse(&data).unwrap();

        let names: Vec<_> = timeline.tracks[0].notes.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["C4", "E4", "G4"]);
        assert!(timeline.tracks[0].notes.iter().all(|n| n.time == 0.0));
    }

    #[test]
    fn test_unreleased_note_ends_with_track() {
        let data = smf_bytes(vec![vec![ev(0, on(60, 100)), ev(960, end())]]);
        let timeline = MidiParser::parse(&data).unwrap();

        assert!((timeline.tracks[0].notes[0].duration - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_track_name_and_channel() {
        let data = smf_bytes(vec![vec![
            ev(0, TrackEventKind::Meta(MetaMessage::TrackName(b"Lead"))),
            ev(0, on(60, 100)),
            ev(10, off(60)),
            ev(0, end()),
        ]]);
        let timeline = MidiParser::parse(&data).unwrap();

        assert_eq!(timeline.tracks[0].name.as_deref(), Some("Lead"));
        assert_eq!(timeline.tracks[0].channel, Some(0));
    }

    #[test]
    fn test_invalid_bytes_are_rejected() {
        let result = MidiParser::parse(b"definitely not a midi file");
        assert!(matches!(result, Err(MediaError::InvalidMidi(_))));
    }

    #[tokio::test]
    async fn test_load_missing_file() {
        let result = MidiParser::load("/nonexistent/song.mid").await;
        assert!(matches!(result, Err(MediaError::Io(_))));
    }
}
