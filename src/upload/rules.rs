//! What each upload dialog accepts.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

const MIDI: &[&str] = &["mid", "midi"];
const IMAGES: &[&str] = &["jpg", "jpeg", "png"];

const MB: u64 = 1024 * 1024;
pub const DEFAULT_MAX_SIZE: u64 = 10 * MB;
pub const DEFAULT_RECORDING_MAX_SIZE: u64 = 50 * MB;

/// Kind of media a dataset or query holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Image,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MediaKind::Audio => "audio",
            MediaKind::Image => "image",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum UploadPurpose {
    /// Song metadata mapping (JSON).
    Mapper,
    /// ZIP of MIDI files.
    AudioDataset,
    /// ZIP of cover images.
    ImageDataset,
    /// A single MIDI or WAV file to search with.
    AudioQuery,
    /// A single image to search with.
    ImageQuery,
    /// A hummed WAV recording.
    Recording,
}

impl UploadPurpose {
    pub const ALL: [UploadPurpose; 6] = [
        UploadPurpose::Mapper,
        UploadPurpose::AudioDataset,
        UploadPurpose::ImageDataset,
        UploadPurpose::AudioQuery,
        UploadPurpose::ImageQuery,
        UploadPurpose::Recording,
    ];

    /// Accepted extensions of the selected file, lowercase, without dot.
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            UploadPurpose::Mapper => &["json"],
            UploadPurpose::AudioDataset | UploadPurpose::ImageDataset => &["zip"],
            UploadPurpose::AudioQuery => &["mid", "midi", "wav"],
            UploadPurpose::ImageQuery => IMAGES,
            UploadPurpose::Recording => &["wav"],
        }
    }

    /// Accepted extensions of archive members, for archive uploads.
    pub fn archive_members(&self) -> Option<&'static [&'static str]> {
        match self {
            UploadPurpose::AudioDataset => Some(MIDI),
            UploadPurpose::ImageDataset => Some(IMAGES),
            _ => None,
        }
    }

    /// Media kind of datasets and queries; `None` for the mapper.
    pub fn media_kind(&self) -> Option<MediaKind> {
        match self {
            UploadPurpose::Mapper => None,
            UploadPurpose::AudioDataset | UploadPurpose::AudioQuery | UploadPurpose::Recording => {
                Some(MediaKind::Audio)
            }
            UploadPurpose::ImageDataset | UploadPurpose::ImageQuery => Some(MediaKind::Image),
        }
    }

    pub fn is_dataset(&self) -> bool {
        self.archive_members().is_some()
    }

    pub fn dataset(kind: MediaKind) -> Self {
        match kind {
            MediaKind::Audio => UploadPurpose::AudioDataset,
            MediaKind::Image => UploadPurpose::ImageDataset,
        }
    }

    /// Noun for the members of an archive upload.
    pub fn member_kind(&self) -> &'static str {
        match self {
            UploadPurpose::AudioDataset => "MIDI",
            UploadPurpose::ImageDataset => "image",
            _ => "",
        }
    }

    pub fn allows(&self, file_name: &str) -> bool {
        extension_of(file_name)
            .map(|ext| self.extensions().contains(&ext.as_str()))
            .unwrap_or(false)
    }

    /// `mid, midi, wav`
    pub fn formats_label(&self) -> String {
        self.extensions().join(", ")
    }

    pub fn label(&self) -> &'static str {
        match self {
            UploadPurpose::Mapper => "mapper",
            UploadPurpose::AudioDataset => "audio dataset",
            UploadPurpose::ImageDataset => "image dataset",
            UploadPurpose::AudioQuery => "audio query",
            UploadPurpose::ImageQuery => "image query",
            UploadPurpose::Recording => "recording",
        }
    }
}

impl fmt::Display for UploadPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lowercase extension of a file name, if any.
pub fn extension_of(file_name: &str) -> Option<String> {
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}

/// Simulated progress: `step` percent every `interval`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressProfile {
    pub step: u8,
    pub interval: Duration,
}

impl ProgressProfile {
    pub const STANDARD: ProgressProfile = ProgressProfile {
        step: 5,
        interval: Duration::from_millis(100),
    };

    pub const RECORDING: ProgressProfile = ProgressProfile {
        step: 10,
        interval: Duration::from_millis(300),
    };

    /// Time to go from 0 to 100.
    pub fn total_time(&self) -> Duration {
        let steps = 100u32.div_ceil(self.step.max(1) as u32);
        self.interval * steps
    }
}

impl Default for ProgressProfile {
    fn default() -> Self {
        Self::STANDARD
    }
}

/// Size limits and progress profiles for every purpose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadLimits {
    pub max_size: u64,
    pub recording_max_size: u64,
    pub progress: ProgressProfile,
    pub recording_progress: ProgressProfile,
}

impl Default for UploadLimits {
    fn default() -> Self {
        Self {
            max_size: DEFAULT_MAX_SIZE,
            recording_max_size: DEFAULT_RECORDING_MAX_SIZE,
            progress: ProgressProfile::STANDARD,
            recording_progress: ProgressProfile::RECORDING,
        }
    }
}

impl UploadLimits {
    pub fn max_size(&self, purpose: UploadPurpose) -> u64 {
        match purpose {
            UploadPurpose::Recording => self.recording_max_size,
            _ => self.max_size,
        }
    }

    pub fn progress(&self, purpose: UploadPurpose) -> ProgressProfile {
        match purpose {
            UploadPurpose::Recording => self.recording_progress,
            _ => self.progress,
        }
    }
}
