//! Playback state machine.
//!
//! [`PlaybackEngine`] is synchronous: every operation takes the current
//! instant, and [`PlaybackEngine::tick`] fires the notes that became due.
//! The async [`super::PlayerHandle`] drives it from a timer.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::media::{format_clock, NoteEvent, NoteTimeline};

use super::transport::Transport;
use super::voice::{Voice, VoiceFactory, Volume};
use super::PlaybackError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayerState {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PlayerState::Idle => "idle",
            PlayerState::Loading => "loading",
            PlayerState::Ready => "ready",
            PlayerState::Playing => "playing",
            PlayerState::Paused => "paused",
        };
        f.write_str(label)
    }
}

/// Display metadata of the song in the player.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SongInfo {
    pub title: String,
    pub singer: Option<String>,
    pub image: Option<String>,
}

impl SongInfo {
    pub fn titled(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Default::default()
        }
    }
}

/// Identity of a note within a song. The start time alone would merge chords.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteKey {
    pub track: usize,
    pub start_us: i64,
    pub midi: u8,
}

impl NoteKey {
    pub fn of(track: usize, note: &NoteEvent) -> Self {
        Self {
            track,
            start_us: (note.time * 1_000_000.0).round() as i64,
            midi: note.midi,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ScheduledNote {
    key: NoteKey,
    track: usize,
    index: usize,
}

#[derive(Debug, Clone)]
struct LoadedSong {
    info: SongInfo,
    timeline: Arc<NoteTimeline>,
    duration: f64,
}

/// Snapshot published to the player view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlayerStatus {
    pub state: PlayerState,
    pub song: Option<SongInfo>,
    /// Seconds, clamped to `duration`.
    pub position: f64,
    pub duration: f64,
    pub volume: f32,
}

impl Default for PlayerStatus {
    fn default() -> Self {
        Self {
            state: PlayerState::Idle,
            song: None,
            position: 0.0,
            duration: 0.0,
            volume: Volume::DEFAULT.linear(),
        }
    }
}

impl PlayerStatus {
    /// Progress through the song in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.duration <= 0.0 {
            0.0
        } else {
            (self.position / self.duration).clamp(0.0, 1.0)
        }
    }

    pub fn elapsed_label(&self) -> String {
        format_clock(self.position.min(self.duration))
    }

    pub fn total_label(&self) -> String {
        format_clock(self.duration)
    }
}

pub struct PlaybackEngine {
    state: PlayerState,
    factory: Arc<dyn VoiceFactory>,
    song: Option<LoadedSong>,
    pending: Option<(u64, SongInfo)>,
    generation: u64,
    transport: Transport<ScheduledNote>,
    voices: Vec<Box<dyn Voice>>,
    scheduled: HashSet<NoteKey>,
    fired: HashSet<NoteKey>,
    volume: Volume,
}

impl PlaybackEngine {
    pub fn new(factory: Arc<dyn VoiceFactory>, volume: Volume) -> Self {
        Self {
            state: PlayerState::Idle,
            factory,
            song: None,
            pending: None,
            generation: 0,
            transport: Transport::new(),
            voices: Vec::new(),
            scheduled: HashSet::new(),
            fired: HashSet::new(),
            volume,
        }
    }

    pub fn state(&self) -> PlayerState {
        self.state
    }

    pub fn volume(&self) -> Volume {
        self.volume
    }

    pub fn duration(&self) -> f64 {
        self.song.as_ref().map(|s| s.duration).unwrap_or(0.0)
    }

    pub fn song(&self) -> Option<&SongInfo> {
        match (&self.song, &self.pending) {
            (Some(song), _) => Some(&song.info),
            (None, Some((_, info))) => Some(info),
            _ => None,
        }
    }

    pub fn voice_count(&self) -> usize {
        self.voices.len()
    }

    /// Tear down the current song and wait for a new one.
    ///
    /// Returns the generation the matching [`Self::finish_load`] must carry.
    pub fn begin_load(&mut self, info: SongInfo) -> u64 {
        self.teardown();
        self.song = None;
        self.generation += 1;
        info!("Loading \"{}\"", info.title);
        self.pending = Some((self.generation, info));
        self.state = PlayerState::Loading;
        self.generation
    }

    /// Complete a load. Results of superseded loads are dropped and `false` is returned.
    pub fn finish_load(
        &mut self,
        generation: u64,
        result: Result<NoteTimeline, PlaybackError>,
    ) -> bool {
        let info = match self.pending.take() {
            Some((pending, info)) if pending == generation => info,
            other => {
                debug!("Dropping stale load result (generation {})", generation);
                self.pending = other;
                return false;
            }
        };

        match result {
            Ok(timeline) => {
                let duration = timeline.duration();
                info!(
                    "Loaded \"{}\": {} tracks, {} notes, {}",
                    info.title,
                    timeline.tracks.len(),
                    timeline.note_count(),
                    format_clock(duration)
                );
                self.song = Some(LoadedSong {
                    info,
                    timeline: Arc::new(timeline),
                    duration,
                });
                self.transport.stop();
                self.state = PlayerState::Ready;
            }
            Err(err) => {
                error!("Failed to load \"{}\": {}", info.title, err);
                self.song = None;
                self.state = PlayerState::Idle;
            }
        }
        true
    }

    pub fn play(&mut self, now: Instant) -> Result<(), PlaybackError> {
        match self.state {
            PlayerState::Playing => {}
            PlayerState::Paused => {
                self.transport.start(now);
                self.state = PlayerState::Playing;
            }
            PlayerState::Ready => {
                self.schedule_song();
                self.transport.start(now);
                self.state = PlayerState::Playing;
            }
            PlayerState::Idle | PlayerState::Loading => return Err(PlaybackError::NotReady),
        }
        Ok(())
    }

    pub fn pause(&mut self, now: Instant) {
        if self.state != PlayerState::Playing {
            return;
        }
        self.transport.pause(now);
        for voice in self.voices.iter_mut() {
            voice.release_all();
        }
        self.state = PlayerState::Paused;
    }

    pub fn toggle(&mut self, now: Instant) -> Result<(), PlaybackError> {
        if self.state == PlayerState::Playing {
            self.pause(now);
            Ok(())
        } else {
            self.play(now)
        }
    }

    /// Move to `seconds`, clamped to the song. Returns the new position.
    pub fn seek(&mut self, now: Instant, seconds: f64) -> f64 {
        if self.song.is_none() {
            return 0.0;
        }
        let target = if seconds.is_nan() {
            0.0
        } else {
            seconds.clamp(0.0, self.duration())
        };
        self.transport.seek(now, target);
        debug!("Seek to {:.2}s", target);
        target
    }

    pub fn set_volume(&mut self, linear: f32) {
        self.volume = Volume::new(linear);
        let db = self.volume.db();
        for voice in self.voices.iter_mut() {
            voice.set_volume_db(db);
        }
    }

    /// Fire every note that became due. Returns how many were triggered.
    pub fn tick(&mut self, now: Instant) -> usize {
        if self.state != PlayerState::Playing {
            return 0;
        }
        let Some(song) = self.song.as_ref() else {
            return 0;
        };
        let timeline = song.timeline.clone();
        let duration = song.duration;

        let mut triggered = 0;
        for (_, scheduled) in self.transport.due(now) {
            if !self.fired.insert(scheduled.key) {
                continue;
            }
            let note = &timeline.tracks[scheduled.track].notes[scheduled.index];
            if let Some(voice) = self.voices.get_mut(scheduled.track) {
                voice.trigger_attack_release(note);
                triggered += 1;
            }
        }

        if self.transport.position(now) > duration {
            info!("Reached the end of \"{}\"", song_title(&self.song));
            self.rewind();
        }
        triggered
    }

    /// Stop playback and rewind. The song stays loaded.
    pub fn stop(&mut self) {
        if matches!(self.state, PlayerState::Playing | PlayerState::Paused) {
            self.rewind();
        } else if self.state == PlayerState::Ready {
            self.transport.stop();
        }
    }

    /// Release and dispose every voice and clear the schedule.
    pub fn teardown(&mut self) {
        for mut voice in self.voices.drain(..) {
            voice.release_all();
            voice.dispose();
        }
        self.transport.stop();
        self.transport.cancel();
        self.scheduled.clear();
        self.fired.clear();
        if self.state != PlayerState::Idle {
            debug!("Player torn down");
        }
        self.state = if self.song.is_some() {
            PlayerState::Ready
        } else {
            PlayerState::Idle
        };
    }

    /// Tear down and forget the current song.
    pub fn eject(&mut self) {
        self.song = None;
        self.pending = None;
        self.teardown();
    }

    pub fn position(&self, now: Instant) -> f64 {
        match self.state {
            PlayerState::Ready | PlayerState::Playing | PlayerState::Paused => {
                self.transport.position(now).clamp(0.0, self.duration())
            }
            PlayerState::Idle | PlayerState::Loading => 0.0,
        }
    }

    pub fn status(&self, now: Instant) -> PlayerStatus {
        PlayerStatus {
            state: self.state,
            song: self.song().cloned(),
            position: self.position(now),
            duration: self.duration(),
            volume: self.volume.linear(),
        }
    }

    fn schedule_song(&mut self) {
        let Some(song) = self.song.as_ref() else {
            return;
        };
        let timeline = song.timeline.clone();

        if self.voices.is_empty() {
            let db = self.volume.db();
            for (index, track) in timeline.tracks.iter().enumerate() {
                let mut voice = self.factory.create_voice(index, track);
                voice.set_volume_db(db);
                self.voices.push(voice);
            }
        }

        let mut added = 0;
        for (track, timeline_track) in timeline.tracks.iter().enumerate() {
            for (index, note) in timeline_track.notes.iter().enumerate() {
                let key = NoteKey::of(track, note);
                if self.scheduled.insert(key) {
                    self.transport.schedule(note.time, ScheduledNote { key, track, index });
                    added += 1;
                }
            }
        }
        debug!("Scheduled {} notes on {} voices", added, self.voices.len());
    }

    /// End the play session: voices released, schedule cleared, back to Ready at 0.
    fn rewind(&mut self) {
        for voice in self.voices.iter_mut() {
            voice.release_all();
        }
        self.transport.stop();
        self.transport.cancel();
        self.scheduled.clear();
        self.fired.clear();
        self.state = PlayerState::Ready;
    }
}

fn song_title(song: &Option<LoadedSong>) -> &str {
    song.as_ref().map(|s| s.info.title.as_str()).unwrap_or("")
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::media::TrackTimeline;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    pub(crate) enum VoiceCall {
        Created(usize),
        Trigger(usize, u8),
        ReleaseAll(usize),
        Volume(usize),
        Dispose(usize),
    }

    /// Voices that record every call into a shared log.
    #[derive(Default, Clone)]
    pub(crate) struct RecordingFactory {
        pub log: Arc<Mutex<Vec<VoiceCall>>>,
    }

    impl RecordingFactory {
        pub fn calls(&self) -> Vec<VoiceCall> {
            self.log.lock().unwrap().clone()
        }

        pub fn triggers(&self) -> Vec<(usize, u8)> {
            self.calls()
                .into_iter()
                .filter_map(|c| match c {
                    VoiceCall::Trigger(track, midi) => Some((track, midi)),
                    _ => None,
                })
                .collect()
        }
    }

    struct RecordingVoice {
        track: usize,
        log: Arc<Mutex<Vec<VoiceCall>>>,
    }

    impl Voice for RecordingVoice {
        fn trigger_attack_release(&mut self, note: &NoteEvent) {
            self.log.lock().unwrap().push(VoiceCall::Trigger(self.track, note.midi));
        }
        fn release_all(&mut self) {
            self.log.lock().unwrap().push(VoiceCall::ReleaseAll(self.track));
        }
        fn set_volume_db(&mut self, _db: f32) {
            self.log.lock().unwrap().push(VoiceCall::Volume(self.track));
        }
        fn dispose(&mut self) {
            self.log.lock().unwrap().push(VoiceCall::Dispose(self.track));
        }
    }

    impl VoiceFactory for RecordingFactory {
        fn create_voice(&self, track_index: usize, _track: &TrackTimeline) -> Box<dyn Voice> {
            self.log.lock().unwrap().push(VoiceCall::Created(track_index));
            Box::new(RecordingVoice {
                track: track_index,
                log: self.log.clone(),
            })
        }
    }

    /// Two tracks: a C major chord at 0s and single notes at 1s and 2s.
    pub(crate) fn sample_timeline() -> NoteTimeline {
        NoteTimeline {
            tracks: vec![
                TrackTimeline {
                    notes: vec![
                        NoteEvent::new(60, 0.0, 0.5, 0.8),
                        NoteEvent::new(64, 0.0, 0.5, 0.8),
                        NoteEvent::new(67, 0.0, 0.5, 0.8),
                        NoteEvent::new(72, 2.0, 0.5, 0.8),
                    ],
                    ..Default::default()
                },
                TrackTimeline {
                    notes: vec![NoteEvent::new(48, 1.0, 1.0, 0.8)],
                    ..Default::default()
                },
            ],
        }
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    fn ready_engine(factory: &RecordingFactory) -> PlaybackEngine {
        let mut engine = PlaybackEngine::new(Arc::new(factory.clone()), Volume::default());
        let generation = engine.begin_load(SongInfo::titled("Sample"));
        assert!(engine.finish_load(generation, Ok(sample_timeline())));
        engine
    }

    #[test]
    fn test_load_transitions() {
        let factory = RecordingFactory::default();
        let mut engine = PlaybackEngine::new(Arc::new(factory.clone()), Volume::default());
        assert_eq!(engine.state(), PlayerState::Idle);

        let generation = engine.begin_load(SongInfo::titled("Sample"));
        assert_eq!(engine.state(), PlayerState::Loading);
        assert_eq!(engine.song().map(|s| s.title.as_str()), Some("Sample"));

        engine.finish_load(generation, Ok(sample_timeline()));
        assert_eq!(engine.state(), PlayerState::Ready);
        assert!((engine.duration() - 2.5).abs() < 1e-9);
        // Voices are only created on first play.
        assert!(factory.calls().is_empty());
    }

    #[test]
    fn test_failed_load_returns_to_idle() {
        let factory = RecordingFactory::default();
        let mut engine = PlaybackEngine::new(Arc::new(factory), Volume::default());
        let generation = engine.begin_load(SongInfo::titled("Broken"));

        engine.finish_load(generation, Err(PlaybackError::Fetch("404".into())));

        assert_eq!(engine.state(), PlayerState::Idle);
        assert_eq!(engine.duration(), 0.0);
        assert!(engine.play(Instant::now()).is_err());
    }

    #[test]
    fn test_stale_load_result_is_dropped() {
        let factory = RecordingFactory::default();
        let mut engine = PlaybackEngine::new(Arc::new(factory), Volume::default());
        let first = engine.begin_load(SongInfo::titled("First"));
        let second = engine.begin_load(SongInfo::titled("Second"));

        assert!(!engine.finish_load(first, Ok(sample_timeline())));
        assert_eq!(engine.state(), PlayerState::Loading);

        assert!(engine.finish_load(second, Ok(NoteTimeline::default())));
        assert_eq!(engine.song().map(|s| s.title.as_str()), Some("Second"));
    }

    #[test]
    fn test_first_play_creates_one_voice_per_track() {
        let factory = RecordingFactory::default();
        let mut engine = ready_engine(&factory);
        let t0 = Instant::now();

        engine.play(t0).unwrap();
        assert_eq!(engine.state(), PlayerState::Playing);
        assert_eq!(engine.voice_count(), 2);

        assert_eq!(engine.tick(t0 + ms(10)), 3);
        assert_eq!(factory.triggers(), vec![(0, 60), (0, 64), (0, 67)]);
    }

    #[test]
    fn test_play_pause_play_never_refires() {
        let factory = RecordingFactory::default();
        let mut engine = ready_engine(&factory);
        let t0 = Instant::now();

        engine.play(t0).unwrap();
        engine.tick(t0 + ms(500));
        engine.pause(t0 + ms(600));
        assert_eq!(engine.state(), PlayerState::Paused);
        assert_eq!(engine.tick(t0 + ms(5_000)), 0);

        engine.play(t0 + ms(5_000)).unwrap();
        engine.tick(t0 + ms(5_500));
        engine.pause(t0 + ms(5_500));
        engine.play(t0 + ms(6_000)).unwrap();
        engine.tick(t0 + ms(7_000));

        let triggers = factory.triggers();
        assert_eq!(triggers, vec![(0, 60), (0, 64), (0, 67), (1, 48), (0, 72)]);
        // Still one voice per track.
        let created = factory
            .calls()
            .iter()
            .filter(|c| matches!(c, VoiceCall::Created(_)))
            .count();
        assert_eq!(created, 2);
    }

    #[test]
    fn test_pause_releases_sounding_notes() {
        let factory = RecordingFactory::default();
        let mut engine = ready_engine(&factory);
        let t0 = Instant::now();

        engine.play(t0).unwrap();
        engine.tick(t0 + ms(100));
        engine.pause(t0 + ms(200));

        let calls = factory.calls();
        assert!(calls.contains(&VoiceCall::ReleaseAll(0)));
        assert!(calls.contains(&VoiceCall::ReleaseAll(1)));
        assert!((engine.position(t0 + ms(900)) - 0.2).abs() < 1e-9);
    }

    #[test]
    fn test_seek_forward_skips_notes() {
        let factory = RecordingFactory::default();
        let mut engine = ready_engine(&factory);
        let t0 = Instant::now();

        engine.play(t0).unwrap();
        engine.tick(t0 + ms(10));
        engine.seek(t0 + ms(10), 1.5);
        engine.tick(t0 + ms(1_000));

        assert_eq!(factory.triggers(), vec![(0, 60), (0, 64), (0, 67), (0, 72)]);
    }

    #[test]
    fn test_seek_backward_does_not_refire() {
        let factory = RecordingFactory::default();
        let mut engine = ready_engine(&factory);
        let t0 = Instant::now();

        engine.play(t0).unwrap();
        engine.tick(t0 + ms(1_200));
        engine.seek(t0 + ms(1_200), 0.0);
        engine.tick(t0 + ms(2_400));

        let triggers = factory.triggers();
        assert_eq!(triggers.iter().filter(|t| **t == (0, 60)).count(), 1);
        assert_eq!(triggers.iter().filter(|t| **t == (1, 48)).count(), 1);
    }

    #[test]
    fn test_seek_is_clamped() {
        let factory = RecordingFactory::default();
        let mut engine = ready_engine(&factory);
        let t0 = Instant::now();

        assert_eq!(engine.seek(t0, -4.0), 0.0);
        assert!((engine.seek(t0, 99.0) - 2.5).abs() < 1e-9);
        assert_eq!(engine.seek(t0, f64::NAN), 0.0);
    }

    #[test]
    fn test_position_display_is_clamped_to_duration() {
        let factory = RecordingFactory::default();
        let mut engine = ready_engine(&factory);
        let t0 = Instant::now();

        engine.play(t0).unwrap();
        let status = engine.status(t0 + ms(2_600));
        assert!((status.position - 2.5).abs() < 1e-9);
        assert_eq!(status.elapsed_label(), "0:02");
        assert_eq!(status.fraction(), 1.0);
    }

    #[test]
    fn test_end_of_song_returns_to_ready() {
        let factory = RecordingFactory::default();
        let mut engine = ready_engine(&factory);
        let t0 = Instant::now();

        engine.play(t0).unwrap();
        engine.tick(t0 + ms(3_000));

        assert_eq!(engine.state(), PlayerState::Ready);
        assert_eq!(engine.position(t0 + ms(3_000)), 0.0);
        assert_eq!(factory.triggers().len(), 5);

        // A new play session hears every note again.
        engine.play(t0 + ms(4_000)).unwrap();
        engine.tick(t0 + ms(7_000));
        assert_eq!(factory.triggers().len(), 10);
    }

    #[test]
    fn test_volume_applies_to_active_voices() {
        let factory = RecordingFactory::default();
        let mut engine = ready_engine(&factory);

        engine.play(Instant::now()).unwrap();
        factory.log.lock().unwrap().clear();
        engine.set_volume(0.25);

        assert_eq!(factory.calls(), vec![VoiceCall::Volume(0), VoiceCall::Volume(1)]);
        assert_eq!(engine.volume().linear(), 0.25);
    }

    #[test]
    fn test_song_change_disposes_voices_before_scheduling() {
        let factory = RecordingFactory::default();
        let mut engine = ready_engine(&factory);
        let t0 = Instant::now();
        engine.play(t0).unwrap();
        engine.tick(t0 + ms(100));

        let generation = engine.begin_load(SongInfo::titled("Next"));
        engine.finish_load(generation, Ok(sample_timeline()));
        engine.play(t0 + ms(200)).unwrap();
        engine.tick(t0 + ms(300));

        let calls = factory.calls();
        let last_dispose = calls
            .iter()
            .rposition(|c| matches!(c, VoiceCall::Dispose(_)))
            .unwrap();
        let second_session_start = calls
            .iter()
            .enumerate()
            .filter(|(_, c)| matches!(c, VoiceCall::Created(_)))
            .map(|(i, _)| i)
            .nth(2)
            .unwrap();
        assert!(last_dispose < second_session_start);
        assert_eq!(
            calls.iter().filter(|c| matches!(c, VoiceCall::Dispose(_))).count(),
            2
        );
        // The chord fires again for the new song.
        assert_eq!(factory.triggers().len(), 6);
    }

    #[test]
    fn test_stop_keeps_song_loaded() {
        let factory = RecordingFactory::default();
        let mut engine = ready_engine(&factory);
        let t0 = Instant::now();

        engine.play(t0).unwrap();
        engine.tick(t0 + ms(1_100));
        engine.stop();

        assert_eq!(engine.state(), PlayerState::Ready);
        assert_eq!(engine.position(t0 + ms(2_000)), 0.0);
        assert!(engine.song().is_some());
    }

    #[test]
    fn test_eject_goes_idle() {
        let factory = RecordingFactory::default();
        let mut engine = ready_engine(&factory);
        engine.play(Instant::now()).unwrap();

        engine.eject();

        assert_eq!(engine.state(), PlayerState::Idle);
        assert!(engine.song().is_none());
        assert_eq!(engine.voice_count(), 0);
    }
}
