use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use super::filter::fold_case;

/// One song of the mapper file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SongRecord {
    #[serde(alias = "title")]
    pub song: String,
    #[serde(default)]
    pub singer: String,
    #[serde(default)]
    pub genre: String,
    /// Cover image file name inside the image dataset.
    #[serde(default, alias = "filename", alias = "image")]
    pub album: String,
    /// MIDI file name inside the audio dataset.
    #[serde(default, alias = "audio_file", alias = "midi")]
    pub audio: Option<String>,
}

/// The song-metadata mapping file: `{"songs": [...]}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Mapper {
    pub songs: Vec<SongRecord>,
}

impl Mapper {
    pub fn from_slice(data: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(data)
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let data = tokio::fs::read(path)
            .await
            .with_context(|| format!("Failed to read mapper file {:?}", path))?;
        Self::from_slice(&data).with_context(|| format!("Invalid mapper file {:?}", path))
    }

    pub fn entries(&self) -> Vec<CatalogEntry> {
        self.songs
            .iter()
            .enumerate()
            .map(|(index, song)| CatalogEntry::from_record(index, song))
            .collect()
    }

    /// First song with the given title and singer, compared case-insensitively.
    pub fn find(&self, title: &str, singer: &str) -> Option<&SongRecord> {
        let (title, singer) = (fold_case(title), fold_case(singer));
        self.songs
            .iter()
            .find(|s| fold_case(&s.song) == title && fold_case(&s.singer) == singer)
    }
}

/// A catalog item as shown in the card grid.
///
/// Identity is the position in the source list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub index: usize,
    pub title: String,
    pub singer: String,
    pub genre: String,
    pub album: Option<String>,
    pub audio: Option<String>,
    /// Percent, only for search results.
    pub similarity: Option<f64>,
}

impl CatalogEntry {
    pub fn from_record(index: usize, record: &SongRecord) -> Self {
        Self {
            index,
            title: record.song.clone(),
            singer: record.singer.clone(),
            genre: record.genre.clone(),
            album: non_empty(&record.album),
            audio: record.audio.as_deref().and_then(non_empty),
            similarity: None,
        }
    }

    /// Path of the cover image, relative to the image dataset root.
    pub fn image_path(&self) -> Option<String> {
        self.album.as_ref().map(|album| format!("images/{}", album))
    }
}

fn non_empty(s: &str) -> Option<String> {
    let s = s.trim();
    if s.is_empty() {
        None
    } else {
        Some(s.to_string())
    }
}
