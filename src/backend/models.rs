use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogEntry, Mapper};

/// One hit of a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMatch {
    #[serde(alias = "title")]
    pub song: String,
    #[serde(default)]
    pub singer: String,
    #[serde(default)]
    pub genre: String,
    #[serde(default, alias = "filename")]
    pub album: String,
    #[serde(default)]
    pub similarity_percentage: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMetrics {
    /// Seconds spent answering the query.
    #[serde(default)]
    pub processing_time: f64,
    /// Seconds spent loading the dataset.
    #[serde(default)]
    pub load_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub matches_found: usize,
    #[serde(default)]
    pub matching_results: Vec<SearchMatch>,
    #[serde(default)]
    pub highest_similarity: Option<f64>,
    #[serde(default)]
    pub all_similarities: Vec<f64>,
    #[serde(default)]
    pub processing_metrics: ProcessingMetrics,
}

impl SearchResponse {
    pub fn query_time(&self) -> f64 {
        self.processing_metrics.processing_time
    }

    /// Results as catalog entries. Audio references come from the mapper,
    /// matched on title and singer.
    pub fn entries(&self, mapper: Option<&Mapper>) -> Vec<CatalogEntry> {
        self.matching_results
            .iter()
            .enumerate()
            .map(|(index, hit)| {
                let audio = mapper
                    .and_then(|m| m.find(&hit.song, &hit.singer))
                    .and_then(|record| record.audio.clone())
                    .filter(|a| !a.trim().is_empty());
                CatalogEntry {
                    index,
                    title: hit.song.clone(),
                    singer: hit.singer.clone(),
                    genre: hit.genre.clone(),
                    album: Some(hit.album.clone()).filter(|a| !a.is_empty()),
                    audio,
                    similarity: Some(hit.similarity_percentage),
                }
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadResponse {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Error payload: `{"error": ...}`, or `{"detail": ...}` from validation layers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn message(&self) -> Option<String> {
        if let Some(error) = &self.error {
            return Some(error.clone());
        }
        match &self.detail {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(other) => Some(other.to_string()),
            None => None,
        }
    }

    /// Message from a raw response body, if it is a recognized error payload.
    pub fn parse(body: &str) -> Option<String> {
        serde_json::from_str::<ErrorBody>(body)
            .ok()
            .and_then(|b| b.message())
    }
}
