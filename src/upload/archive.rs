//! Inspection of dataset archives.

use std::io::{Cursor, Read};
use std::path::Path;

use tracing::debug;
use zip::ZipArchive;

use super::rules::extension_of;
use super::UploadError;

/// Members of an archive split by whether their extension is allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveReport {
    pub valid: Vec<String>,
    pub invalid: Vec<String>,
}

impl ArchiveReport {
    pub fn is_acceptable(&self) -> bool {
        self.invalid.is_empty() && !self.valid.is_empty()
    }
}

fn open(data: &[u8]) -> Result<ZipArchive<Cursor<&[u8]>>, UploadError> {
    ZipArchive::new(Cursor::new(data)).map_err(|e| UploadError::ArchiveRead(e.to_string()))
}

/// Classify every file of the archive against `allowed` extensions.
/// Directory entries are skipped.
pub fn inspect_archive(data: &[u8], allowed: &[&str]) -> Result<ArchiveReport, UploadError> {
    let mut archive = open(data)?;
    let mut report = ArchiveReport::default();

    for i in 0..archive.len() {
        let file = archive
            .by_index(i)
            .map_err(|e| UploadError::ArchiveRead(e.to_string()))?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        let ok = extension_of(&name)
            .map(|ext| allowed.contains(&ext.as_str()))
            .unwrap_or(false);
        if ok {
            report.valid.push(name);
        } else {
            report.invalid.push(name);
        }
    }

    debug!(
        "Archive has {} valid and {} invalid members",
        report.valid.len(),
        report.invalid.len()
    );
    Ok(report)
}

/// Read one member, matched by full path or, failing that, by file name
/// ignoring case.
pub fn extract_member(data: &[u8], name: &str) -> Result<Vec<u8>, UploadError> {
    let mut archive = open(data)?;

    let index = match archive.index_for_name(name) {
        Some(index) => index,
        None => {
            let wanted = file_name(name).to_lowercase();
            archive
                .file_names()
                .find(|member| file_name(member).to_lowercase() == wanted)
                .map(|member| member.to_string())
                .and_then(|member| archive.index_for_name(&member))
                .ok_or_else(|| UploadError::MemberNotFound(name.to_string()))?
        }
    };

    let mut file = archive
        .by_index(index)
        .map_err(|e| UploadError::ArchiveRead(e.to_string()))?;
    let mut content = Vec::with_capacity(file.size() as usize);
    file.read_to_end(&mut content)
        .map_err(|e| UploadError::ArchiveRead(e.to_string()))?;
    Ok(content)
}

fn file_name(path: &str) -> &str {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
}
