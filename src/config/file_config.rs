use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    // Core settings (can override CLI)
    pub backend_url: Option<String>,
    pub request_timeout_sec: Option<u64>,
    pub similarity_threshold: Option<f64>,
    pub page_size: Option<usize>,
    pub page_window: Option<usize>,
    pub volume: Option<f32>,
    pub sample_rate: Option<u32>,

    // Sections
    pub upload: Option<UploadConfig>,
    pub player: Option<PlayerConfig>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct UploadConfig {
    pub max_size_mb: Option<u64>,
    pub recording_max_size_mb: Option<u64>,
    pub progress_step: Option<u8>,
    pub progress_interval_ms: Option<u64>,
    pub recording_progress_step: Option<u8>,
    pub recording_progress_interval_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct PlayerConfig {
    pub tick_interval_ms: Option<u64>,
    pub poll_interval_ms: Option<u64>,
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        toml::from_str(&content).with_context(|| format!("Failed to parse config file: {:?}", path))
    }
}
