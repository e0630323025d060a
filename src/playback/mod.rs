//! Note scheduling, synthesis and the player.

mod engine;
#[cfg(feature = "audio-output")]
mod output;
mod player;
mod render;
mod synth;
mod transport;
mod voice;

pub use engine::{NoteKey, PlaybackEngine, PlayerState, PlayerStatus, SongInfo};
#[cfg(feature = "audio-output")]
pub use output::AudioOutput;
pub use player::{PlayerHandle, PlayerSettings, SongRef, SongSource};
pub use render::{OfflineRenderer, RenderSummary};
pub use synth::{Envelope, PolySynth, SynthBus, SynthVoiceFactory};
pub use transport::{Transport, TransportState};
pub use voice::{db_to_gain, gain_to_db, SilentVoiceFactory, Voice, VoiceFactory, Volume};

use thiserror::Error;

use crate::media::MediaError;

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Media(#[from] MediaError),

    #[error("Failed to fetch song: {0}")]
    Fetch(String),

    #[error("WAV encoding error: {0}")]
    Wav(#[from] hound::Error),

    #[error("No song is ready to play")]
    NotReady,

    #[error("Audio output error: {0}")]
    Output(String),

    #[error("Player task is no longer running")]
    PlayerGone,
}
