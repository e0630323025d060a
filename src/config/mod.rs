mod file_config;

pub use file_config::{FileConfig, PlayerConfig, UploadConfig};

use anyhow::{bail, Result};
use std::time::Duration;

use crate::catalog::{DEFAULT_PAGE_SIZE, DEFAULT_PAGE_WINDOW};
use crate::playback::{PlayerSettings, Volume};
use crate::shell::ShellSettings;
use crate::upload::{ProgressProfile, UploadLimits};

pub const DEFAULT_BACKEND_URL: &str = "http://localhost:8000";
pub const DEFAULT_SAMPLE_RATE: u32 = 44_100;
pub const DEFAULT_TIMEOUT_SEC: u64 = 120;

const MB: u64 = 1024 * 1024;

/// CLI arguments that can be used for config resolution.
/// Every field can be overridden by the TOML config.
#[derive(Debug, Clone)]
pub struct CliConfig {
    pub backend_url: Option<String>,
    pub request_timeout_sec: u64,
    pub similarity_threshold: Option<f64>,
    pub page_size: usize,
    pub page_window: usize,
    pub volume: f32,
    pub sample_rate: u32,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            backend_url: None,
            request_timeout_sec: DEFAULT_TIMEOUT_SEC,
            similarity_threshold: None,
            page_size: DEFAULT_PAGE_SIZE,
            page_window: DEFAULT_PAGE_WINDOW,
            volume: Volume::DEFAULT.linear(),
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backend_url: String,
    pub request_timeout: Duration,
    pub similarity_threshold: Option<f64>,
    pub page_size: usize,
    pub page_window: usize,
    pub sample_rate: u32,

    pub upload: UploadLimits,
    pub player: PlayerSettings,
}

impl AppConfig {
    /// Resolve configuration from CLI arguments and optional TOML file config.
    /// TOML values override CLI values where present.
    pub fn resolve(cli: &CliConfig, file_config: Option<FileConfig>) -> Result<Self> {
        let file = file_config.unwrap_or_default();

        let backend_url = file
            .backend_url
            .or_else(|| cli.backend_url.clone())
            .unwrap_or_else(|| DEFAULT_BACKEND_URL.to_string());
        if !backend_url.starts_with("http://") && !backend_url.starts_with("https://") {
            bail!("backend_url must be an http(s) URL, got {:?}", backend_url);
        }

        let request_timeout_sec = file.request_timeout_sec.unwrap_or(cli.request_timeout_sec);
        if request_timeout_sec == 0 {
            bail!("request_timeout_sec must be greater than 0");
        }

        let similarity_threshold = file.similarity_threshold.or(cli.similarity_threshold);
        if let Some(threshold) = similarity_threshold {
            if !(0.0..=100.0).contains(&threshold) {
                bail!("similarity_threshold must be within 0 and 100, got {}", threshold);
            }
        }

        let page_size = file.page_size.unwrap_or(cli.page_size);
        if page_size == 0 {
            bail!("page_size must be greater than 0");
        }
        let page_window = file.page_window.unwrap_or(cli.page_window);
        if page_window == 0 {
            bail!("page_window must be greater than 0");
        }

        let volume = file.volume.unwrap_or(cli.volume);
        if !(0.0..=1.0).contains(&volume) {
            bail!("volume must be within 0.0 and 1.0, got {}", volume);
        }

        let sample_rate = file.sample_rate.unwrap_or(cli.sample_rate);
        if sample_rate == 0 {
            bail!("sample_rate must be greater than 0");
        }

        let upload_file = file.upload.unwrap_or_default();
        let defaults = UploadLimits::default();
        let upload = UploadLimits {
            max_size: upload_file
                .max_size_mb
                .map(|mb| mb * MB)
                .unwrap_or(defaults.max_size),
            recording_max_size: upload_file
                .recording_max_size_mb
                .map(|mb| mb * MB)
                .unwrap_or(defaults.recording_max_size),
            progress: progress_profile(
                upload_file.progress_step,
                upload_file.progress_interval_ms,
                defaults.progress,
            )?,
            recording_progress: progress_profile(
                upload_file.recording_progress_step,
                upload_file.recording_progress_interval_ms,
                defaults.recording_progress,
            )?,
        };

        let player_file = file.player.unwrap_or_default();
        let player_defaults = PlayerSettings::default();
        let player = PlayerSettings {
            tick_interval: player_file
                .tick_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(player_defaults.tick_interval),
            poll_interval: player_file
                .poll_interval_ms
                .map(Duration::from_millis)
                .unwrap_or(player_defaults.poll_interval),
            volume,
        };
        if player.tick_interval.is_zero() || player.poll_interval.is_zero() {
            bail!("Player intervals must be greater than 0");
        }

        Ok(Self {
            backend_url,
            request_timeout: Duration::from_secs(request_timeout_sec),
            similarity_threshold,
            page_size,
            page_window,
            sample_rate,
            upload,
            player,
        })
    }

    pub fn shell_settings(&self) -> ShellSettings {
        ShellSettings {
            page_size: self.page_size,
            page_window: self.page_window,
            limits: self.upload,
            similarity_threshold: self.similarity_threshold,
        }
    }
}

fn progress_profile(
    step: Option<u8>,
    interval_ms: Option<u64>,
    default: ProgressProfile,
) -> Result<ProgressProfile> {
    let step = step.unwrap_or(default.step);
    if step == 0 || step > 100 {
        bail!("progress step must be within 1 and 100, got {}", step);
    }
    let interval = interval_ms
        .map(Duration::from_millis)
        .unwrap_or(default.interval);
    if interval.is_zero() {
        bail!("progress interval must be greater than 0");
    }
    Ok(ProgressProfile { step, interval })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_defaults() {
        let config = AppConfig::resolve(&CliConfig::default(), None).unwrap();

        assert_eq!(config.backend_url, DEFAULT_BACKEND_URL);
        assert_eq!(config.request_timeout, Duration::from_secs(DEFAULT_TIMEOUT_SEC));
        assert_eq!(config.page_size, 12);
        assert_eq!(config.page_window, 5);
        assert_eq!(config.upload, UploadLimits::default());
        assert_eq!(config.player.poll_interval, Duration::from_millis(100));
        assert!(config.similarity_threshold.is_none());
    }

    #[test]
    fn test_resolve_toml_overrides_cli() {
        let cli = CliConfig {
            backend_url: Some("http://cli:8000".to_string()),
            page_size: 6,
            similarity_threshold: Some(50.0),
            ..Default::default()
        };
        let file_config = FileConfig {
            backend_url: Some("https://toml:8443".to_string()),
            similarity_threshold: Some(80.0),
            upload: Some(UploadConfig {
                max_size_mb: Some(2),
                progress_step: Some(20),
                ..Default::default()
            }),
            player: Some(PlayerConfig {
                tick_interval_ms: Some(5),
                ..Default::default()
            }),
            ..Default::default()
        };

        let config = AppConfig::resolve(&cli, Some(file_config)).unwrap();

        // TOML values should override CLI
        assert_eq!(config.backend_url, "https://toml:8443");
        assert_eq!(config.similarity_threshold, Some(80.0));
        assert_eq!(config.upload.max_size, 2 * MB);
        assert_eq!(config.upload.progress.step, 20);
        assert_eq!(config.upload.progress.interval, Duration::from_millis(100));
        assert_eq!(config.player.tick_interval, Duration::from_millis(5));
        // CLI value used when TOML doesn't specify
        assert_eq!(config.page_size, 6);

        let shell = config.shell_settings();
        assert_eq!(shell.page_size, 6);
        assert_eq!(shell.limits.max_size, 2 * MB);
    }

    #[test]
    fn test_resolve_rejects_invalid_values() {
        let bad_url = CliConfig {
            backend_url: Some("localhost:8000".to_string()),
            ..Default::default()
        };
        let err = AppConfig::resolve(&bad_url, None).unwrap_err();
        assert!(err.to_string().contains("backend_url"));

        let bad_threshold = FileConfig {
            similarity_threshold: Some(120.0),
            ..Default::default()
        };
        assert!(AppConfig::resolve(&CliConfig::default(), Some(bad_threshold)).is_err());

        let bad_step = FileConfig {
            upload: Some(UploadConfig {
                recording_progress_step: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };
        let err = AppConfig::resolve(&CliConfig::default(), Some(bad_step)).unwrap_err();
        assert!(err.to_string().contains("progress step"));

        let zero_page = CliConfig {
            page_size: 0,
            ..Default::default()
        };
        assert!(AppConfig::resolve(&zero_page, None).is_err());
    }
}
