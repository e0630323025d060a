//! Upload dialogs: file selection, validation and simulated progress.

mod archive;
mod controller;
mod recording;
mod rules;
mod validate;

pub use archive::{extract_member, inspect_archive, ArchiveReport};
pub use controller::{AcceptedUpload, SelectedFile, UploadController, UploadSnapshot};
pub use recording::{inspect_recording, RecordingInfo};
pub use rules::{
    extension_of, MediaKind, ProgressProfile, UploadLimits, UploadPurpose, DEFAULT_MAX_SIZE,
    DEFAULT_RECORDING_MAX_SIZE,
};
pub use validate::{check_name_and_size, validate_file, Validation};

use std::fmt;

use thiserror::Error;

/// A byte count displayed with a binary unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileSize(pub u64);

impl fmt::Display for FileSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", byte_unit::Byte::from(self.0))
    }
}

/// Upload failures. The messages are shown to the user as is.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum UploadError {
    #[error("Please upload only one file at a time")]
    MultipleFiles,

    #[error("No file selected")]
    NothingSelected,

    #[error("Invalid file format. Allowed formats: {allowed}")]
    InvalidFormat { allowed: String },

    #[error("File is too large ({size}). Up to {limit} is allowed")]
    TooLarge { size: FileSize, limit: FileSize },

    #[error("Invalid files found in ZIP: {}", .names.join(", "))]
    InvalidArchiveMembers { names: Vec<String> },

    #[error("ZIP contains no valid {kind} files")]
    EmptyArchive { kind: &'static str },

    #[error("Failed to read ZIP file: {0}")]
    ArchiveRead(String),

    #[error("File not found in ZIP: {0}")]
    MemberNotFound(String),

    #[error("Invalid mapper file: {0}")]
    InvalidMapper(String),

    #[error("Invalid recording: {0}")]
    InvalidRecording(String),

    #[error("Upload is not complete yet ({0}%)")]
    Incomplete(u8),

    #[error("Failed to read file {0}")]
    Io(String),
}
