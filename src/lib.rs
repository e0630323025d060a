//! Hummify client library
//!
//! Query-by-humming client: uploads a song catalog and datasets to a search
//! backend, runs similarity queries and plays matching MIDI songs.

pub mod backend;
pub mod catalog;
pub mod cli_style;
pub mod config;
pub mod media;
pub mod playback;
pub mod session;
pub mod shell;
pub mod upload;

// Re-export commonly used types for convenience
pub use backend::{BackendClient, SearchBackend};
pub use config::{AppConfig, CliConfig, FileConfig};
pub use playback::{PlayerHandle, PlayerSettings};
pub use shell::{AppShell, ShellSettings};
