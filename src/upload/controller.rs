//! Upload dialog state: selection, validation and simulated progress.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::catalog::Mapper;

use super::archive::ArchiveReport;
use super::recording::RecordingInfo;
use super::rules::{ProgressProfile, UploadLimits, UploadPurpose};
use super::validate::{check_name_and_size, validate_file, Validation};
use super::{FileSize, UploadError};

/// A file picked by the user, held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectedFile {
    pub name: String,
    pub data: Arc<Vec<u8>>,
}

impl SelectedFile {
    pub fn new(name: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            data: Arc::new(data),
        }
    }

    pub async fn read(path: impl AsRef<Path>) -> Result<Self, UploadError> {
        let path = path.as_ref();
        let data = tokio::fs::read(path).await.map_err(|e| io_error(path, e))?;
        Ok(Self::new(display_name(path), data))
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}

fn io_error(path: &Path, err: std::io::Error) -> UploadError {
    UploadError::Io(format!("{}: {}", path.display(), err))
}

/// A confirmed upload, handed to the application shell.
#[derive(Debug, Clone)]
pub struct AcceptedUpload {
    pub purpose: UploadPurpose,
    pub file: SelectedFile,
    pub archive: Option<ArchiveReport>,
    pub mapper: Option<Mapper>,
    pub recording: Option<RecordingInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadSnapshot {
    pub purpose: UploadPurpose,
    pub open: bool,
    pub file_name: Option<String>,
    pub size: Option<u64>,
    pub error: Option<String>,
    pub progress: u8,
}

impl UploadSnapshot {
    pub fn can_confirm(&self) -> bool {
        self.file_name.is_some() && self.error.is_none() && self.progress >= 100
    }
}

struct Selection {
    file: SelectedFile,
    validation: Validation,
}

pub struct UploadController {
    purpose: UploadPurpose,
    limits: UploadLimits,
    open: bool,
    selection: Option<Selection>,
    error: Option<UploadError>,
    progress: Option<watch::Receiver<u8>>,
    simulation: Option<CancellationToken>,
}

impl UploadController {
    pub fn new(purpose: UploadPurpose, limits: UploadLimits) -> Self {
        Self {
            purpose,
            limits,
            open: false,
            selection: None,
            error: None,
            progress: None,
            simulation: None,
        }
    }

    pub fn purpose(&self) -> UploadPurpose {
        self.purpose
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    pub fn error(&self) -> Option<&UploadError> {
        self.error.as_ref()
    }

    pub fn open(&mut self) {
        self.reset();
        self.open = true;
    }

    pub fn close(&mut self) {
        self.reset();
        self.open = false;
    }

    fn reset(&mut self) {
        self.stop_simulation();
        self.selection = None;
        self.error = None;
        self.progress = None;
    }

    fn stop_simulation(&mut self) {
        if let Some(token) = self.simulation.take() {
            token.cancel();
        }
    }

    /// Select files as dropped or picked. Exactly one file is accepted.
    ///
    /// Must be called within a tokio runtime: a valid selection starts the
    /// progress simulation.
    pub fn select(&mut self, mut files: Vec<SelectedFile>) -> Result<(), UploadError> {
        if !self.open {
            self.open();
        }
        self.reset();

        let result = match files.len() {
            0 => Err(UploadError::NothingSelected),
            1 => {
                let file = files.remove(0);
                validate_file(self.purpose, &self.limits, &file.name, &file.data)
                    .map(|validation| Selection { file, validation })
            }
            _ => Err(UploadError::MultipleFiles),
        };

        match result {
            Ok(selection) => {
                info!(
                    "Selected {} ({}) for {}",
                    selection.file.name,
                    FileSize(selection.file.size()),
                    self.purpose
                );
                self.selection = Some(selection);
                self.start_simulation(self.limits.progress(self.purpose));
                Ok(())
            }
            Err(err) => {
                warn!("Rejected {} upload: {}", self.purpose, err);
                self.error = Some(err.clone());
                Err(err)
            }
        }
    }

    /// Read `paths` from disk and select them.
    ///
    /// Name and size are checked from the file metadata, so a rejected file
    /// is never read.
    pub async fn select_paths(&mut self, paths: &[PathBuf]) -> Result<(), UploadError> {
        if paths.len() > 1 {
            return Err(self.reject(UploadError::MultipleFiles));
        }

        let mut files = Vec::with_capacity(paths.len());
        for path in paths {
            let checked = match tokio::fs::metadata(path).await {
                Ok(metadata) => check_name_and_size(
                    self.purpose,
                    &self.limits,
                    &display_name(path),
                    metadata.len(),
                ),
                Err(err) => Err(io_error(path, err)),
            };
            if let Err(err) = checked {
                return Err(self.reject(err));
            }
            match SelectedFile::read(path).await {
                Ok(file) => files.push(file),
                Err(err) => return Err(self.reject(err)),
            }
        }
        self.select(files)
    }

    fn reject(&mut self, err: UploadError) -> UploadError {
        if !self.open {
            self.open();
        }
        self.reset();
        warn!("Rejected {} upload: {}", self.purpose, err);
        self.error = Some(err.clone());
        err
    }

    fn start_simulation(&mut self, profile: ProgressProfile) {
        let (tx, rx) = watch::channel(0u8);
        let token = CancellationToken::new();
        let cancelled = token.clone();

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + profile.interval, profile.interval);
            let mut progress = 0u8;
            loop {
                tokio::select! {
                    _ = cancelled.cancelled() => break,
                    _ = ticker.tick() => {
                        progress = progress.saturating_add(profile.step.max(1)).min(100);
                        if tx.send(progress).is_err() || progress >= 100 {
                            break;
                        }
                    }
                }
            }
            debug!("Upload progress simulation ended at {}%", progress);
        });

        self.progress = Some(rx);
        self.simulation = Some(token);
    }

    pub fn progress(&self) -> u8 {
        self.progress.as_ref().map(|rx| *rx.borrow()).unwrap_or(0)
    }

    pub fn subscribe_progress(&self) -> Option<watch::Receiver<u8>> {
        self.progress.clone()
    }

    /// Wait until progress reaches 100. Fails when nothing valid is selected
    /// or the simulation was stopped.
    pub async fn wait_complete(&self) -> Result<(), UploadError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let mut rx = self.progress.clone().ok_or(UploadError::NothingSelected)?;
        let reached = rx.wait_for(|p| *p >= 100).await.is_ok();
        if reached {
            Ok(())
        } else {
            Err(UploadError::Incomplete(self.progress()))
        }
    }

    pub fn snapshot(&self) -> UploadSnapshot {
        UploadSnapshot {
            purpose: self.purpose,
            open: self.open,
            file_name: self.selection.as_ref().map(|s| s.file.name.clone()),
            size: self.selection.as_ref().map(|s| s.file.size()),
            error: self.error.as_ref().map(|e| e.to_string()),
            progress: self.progress(),
        }
    }

    /// Hand over the selection and close. Only an error-free, completed selection confirms.
    pub fn confirm(&mut self) -> Result<AcceptedUpload, UploadError> {
        if let Some(err) = &self.error {
            return Err(err.clone());
        }
        let progress = self.progress();
        let Some(selection) = self.selection.take() else {
            return Err(UploadError::NothingSelected);
        };
        if progress < 100 {
            self.selection = Some(selection);
            return Err(UploadError::Incomplete(progress));
        }

        let Selection { file, validation } = selection;
        info!("Confirmed {} upload of {}", self.purpose, file.name);
        let accepted = AcceptedUpload {
            purpose: self.purpose,
            file,
            archive: validation.archive,
            mapper: validation.mapper,
            recording: validation.recording,
        };
        self.close();
        Ok(accepted)
    }
}

impl Drop for UploadController {
    fn drop(&mut self) {
        self.stop_simulation();
    }
}
