//! Async player: a tokio task owning the [`PlaybackEngine`].
//!
//! Commands go in over an mpsc channel; [`PlayerStatus`] snapshots come out
//! over a watch channel, refreshed on every state change and by a polling
//! timer that only runs while playing.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{interval, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::media::{MidiParser, NoteTimeline};

use super::engine::{PlaybackEngine, PlayerState, PlayerStatus, SongInfo};
use super::voice::{VoiceFactory, Volume};
use super::PlaybackError;

/// Where the bytes of a song come from.
#[derive(Debug, Clone)]
pub enum SongSource {
    File(PathBuf),
    Url(String),
    Bytes(Arc<Vec<u8>>),
}

#[derive(Debug, Clone)]
pub struct SongRef {
    pub info: SongInfo,
    pub source: SongSource,
}

#[derive(Debug, Clone)]
pub struct PlayerSettings {
    /// How often due notes are fired.
    pub tick_interval: Duration,
    /// How often progress is published while playing.
    pub poll_interval: Duration,
    pub volume: f32,
}

impl Default for PlayerSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(10),
            poll_interval: Duration::from_millis(100),
            volume: Volume::DEFAULT.linear(),
        }
    }
}

#[derive(Debug)]
enum PlayerCommand {
    Load(SongRef, oneshot::Sender<u64>),
    Play,
    Pause,
    Toggle,
    Stop,
    Seek(f64),
    SetVolume(f32),
    Eject,
    Shutdown,
}

/// Client side of the player task.
pub struct PlayerHandle {
    commands: mpsc::Sender<PlayerCommand>,
    status: watch::Receiver<PlayerStatus>,
    task: Option<JoinHandle<()>>,
}

impl PlayerHandle {
    pub fn spawn(
        factory: Arc<dyn VoiceFactory>,
        settings: PlayerSettings,
        http: reqwest::Client,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (loads_tx, loads_rx) = mpsc::unbounded_channel();
        let engine = PlaybackEngine::new(factory, Volume::new(settings.volume));
        let (status_tx, status_rx) = watch::channel(engine.status(Instant::now()));

        let actor = PlayerActor {
            engine,
            settings,
            http,
            commands: commands_rx,
            status: status_tx,
            loads_tx,
            loads_rx,
            fetch: None,
            poll: None,
        };
        let task = tokio::spawn(actor.run());

        Self {
            commands: commands_tx,
            status: status_rx,
            task: Some(task),
        }
    }

    async fn send(&self, command: PlayerCommand) -> Result<(), PlaybackError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| PlaybackError::PlayerGone)
    }

    /// Start loading `song`, superseding any load in flight.
    ///
    /// Returns once the player is in the loading state, with the load generation.
    pub async fn load(&self, song: SongRef) -> Result<u64, PlaybackError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.send(PlayerCommand::Load(song, reply_tx)).await?;
        reply_rx.await.map_err(|_| PlaybackError::PlayerGone)
    }

    pub async fn play(&self) -> Result<(), PlaybackError> {
        self.send(PlayerCommand::Play).await
    }

    pub async fn pause(&self) -> Result<(), PlaybackError> {
        self.send(PlayerCommand::Pause).await
    }

    pub async fn toggle(&self) -> Result<(), PlaybackError> {
        self.send(PlayerCommand::Toggle).await
    }

    pub async fn stop(&self) -> Result<(), PlaybackError> {
        self.send(PlayerCommand::Stop).await
    }

    pub async fn seek(&self, seconds: f64) -> Result<(), PlaybackError> {
        self.send(PlayerCommand::Seek(seconds)).await
    }

    pub async fn set_volume(&self, linear: f32) -> Result<(), PlaybackError> {
        self.send(PlayerCommand::SetVolume(linear)).await
    }

    pub async fn eject(&self) -> Result<(), PlaybackError> {
        self.send(PlayerCommand::Eject).await
    }

    /// Latest published snapshot.
    pub fn status(&self) -> PlayerStatus {
        self.status.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlayerStatus> {
        self.status.clone()
    }

    /// Wait until the player leaves the loading state.
    pub async fn wait_loaded(&self) -> Result<PlayerStatus, PlaybackError> {
        let mut rx = self.status.clone();
        let status = rx
            .wait_for(|s| s.state != PlayerState::Loading)
            .await
            .map_err(|_| PlaybackError::PlayerGone)?;
        Ok(status.clone())
    }

    /// Stop the task, tearing down every voice.
    pub async fn shutdown(mut self) {
        let _ = self.commands.send(PlayerCommand::Shutdown).await;
        if let Some(task) = self.task.take() {
            if let Err(err) = task.await {
                warn!("Player task ended abnormally: {}", err);
            }
        }
    }
}

impl Drop for PlayerHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

type LoadResult = (u64, Result<NoteTimeline, PlaybackError>);

struct PlayerActor {
    engine: PlaybackEngine,
    settings: PlayerSettings,
    http: reqwest::Client,
    commands: mpsc::Receiver<PlayerCommand>,
    status: watch::Sender<PlayerStatus>,
    loads_tx: mpsc::UnboundedSender<LoadResult>,
    loads_rx: mpsc::UnboundedReceiver<LoadResult>,
    fetch: Option<JoinHandle<()>>,
    poll: Option<Interval>,
}

impl PlayerActor {
    async fn run(mut self) {
        let mut ticker = interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                command = self.commands.recv() => {
                    match command {
                        None | Some(PlayerCommand::Shutdown) => break,
                        Some(command) => self.handle(command),
                    }
                }
                Some((generation, result)) = self.loads_rx.recv() => {
                    if self.engine.finish_load(generation, result) {
                        self.publish();
                    }
                }
                _ = ticker.tick() => {
                    let before = self.engine.state();
                    self.engine.tick(Instant::now());
                    if before == PlayerState::Playing && self.engine.state() != PlayerState::Playing {
                        self.poll = None;
                        self.publish();
                    }
                }
                _ = next_poll(&mut self.poll) => self.publish(),
            }
        }

        if let Some(fetch) = self.fetch.take() {
            fetch.abort();
        }
        self.engine.eject();
        self.publish();
        info!("Player stopped");
    }

    fn handle(&mut self, command: PlayerCommand) {
        let now = Instant::now();
        debug!("Player command: {:?}", command);
        match command {
            PlayerCommand::Load(song, reply) => {
                self.poll = None;
                if let Some(fetch) = self.fetch.take() {
                    fetch.abort();
                }
                let generation = self.engine.begin_load(song.info);
                let http = self.http.clone();
                let results = self.loads_tx.clone();
                self.fetch = Some(tokio::spawn(async move {
                    let result = fetch_timeline(&http, song.source).await;
                    let _ = results.send((generation, result));
                }));
                self.publish();
                let _ = reply.send(generation);
                return;
            }
            PlayerCommand::Play => self.start(now, |engine, now| engine.play(now)),
            PlayerCommand::Toggle => self.start(now, |engine, now| engine.toggle(now)),
            PlayerCommand::Pause => {
                self.poll = None;
                self.engine.pause(now);
            }
            PlayerCommand::Stop => {
                self.poll = None;
                self.engine.stop();
            }
            PlayerCommand::Seek(seconds) => {
                self.engine.seek(now, seconds);
            }
            PlayerCommand::SetVolume(linear) => self.engine.set_volume(linear),
            PlayerCommand::Eject => {
                self.poll = None;
                if let Some(fetch) = self.fetch.take() {
                    fetch.abort();
                }
                self.engine.eject();
            }
            PlayerCommand::Shutdown => {}
        }
        self.publish();
    }

    fn start<F>(&mut self, now: Instant, op: F)
    where
        F: FnOnce(&mut PlaybackEngine, Instant) -> Result<(), PlaybackError>,
    {
        if let Err(err) = op(&mut self.engine, now) {
            warn!("Cannot play: {}", err);
        }
        if self.engine.state() == PlayerState::Playing {
            if self.poll.is_none() {
                let mut poll = interval(self.settings.poll_interval);
                poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
                self.poll = Some(poll);
            }
        } else {
            self.poll = None;
        }
    }

    fn publish(&self) {
        self.status.send_replace(self.engine.status(Instant::now()));
    }
}

async fn next_poll(poll: &mut Option<Interval>) {
    match poll {
        Some(poll) => {
            poll.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn fetch_timeline(
    http: &reqwest::Client,
    source: SongSource,
) -> Result<NoteTimeline, PlaybackError> {
    match source {
        SongSource::Bytes(bytes) => Ok(MidiParser::parse(&bytes)?),
        SongSource::File(path) => Ok(MidiParser::load(&path).await?),
        SongSource::Url(url) => {
            let response = http
                .get(&url)
                .send()
                .await
                .map_err(|e| PlaybackError::Fetch(e.to_string()))?;
            if !response.status().is_success() {
                return Err(PlaybackError::Fetch(format!(
                    "{} returned {}",
                    url,
                    response.status()
                )));
            }
            let bytes = response
                .bytes()
                .await
                .map_err(|e| PlaybackError::Fetch(e.to_string()))?;
            Ok(MidiParser::parse(&bytes)?)
        }
    }
}
