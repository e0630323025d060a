//! Validation of a selected file against its upload purpose.

use tracing::debug;

use crate::catalog::Mapper;

use super::archive::{inspect_archive, ArchiveReport};
use super::recording::{inspect_recording, RecordingInfo};
use super::rules::{UploadLimits, UploadPurpose};
use super::{FileSize, UploadError};

/// What was learned about a file while validating it.
#[derive(Debug, Clone, Default)]
pub struct Validation {
    pub archive: Option<ArchiveReport>,
    pub mapper: Option<Mapper>,
    pub recording: Option<RecordingInfo>,
}

/// Extension and size checks, which need no file contents.
pub fn check_name_and_size(
    purpose: UploadPurpose,
    limits: &UploadLimits,
    name: &str,
    size: u64,
) -> Result<(), UploadError> {
    if !purpose.allows(name) {
        return Err(UploadError::InvalidFormat {
            allowed: purpose.formats_label(),
        });
    }

    let limit = limits.max_size(purpose);
    if size > limit {
        return Err(UploadError::TooLarge {
            size: FileSize(size),
            limit: FileSize(limit),
        });
    }
    Ok(())
}

/// Checks run in order: extension, size, then content.
pub fn validate_file(
    purpose: UploadPurpose,
    limits: &UploadLimits,
    name: &str,
    data: &[u8],
) -> Result<Validation, UploadError> {
    let size = data.len() as u64;
    check_name_and_size(purpose, limits, name, size)?;

    let mut validation = Validation::default();
    match purpose {
        UploadPurpose::AudioDataset | UploadPurpose::ImageDataset => {
            let allowed = purpose.archive_members().unwrap_or_default();
            let report = inspect_archive(data, allowed)?;
            if !report.invalid.is_empty() {
                return Err(UploadError::InvalidArchiveMembers {
                    names: report.invalid,
                });
            }
            if report.valid.is_empty() {
                return Err(UploadError::EmptyArchive {
                    kind: purpose.member_kind(),
                });
            }
            validation.archive = Some(report);
        }
        UploadPurpose::Mapper => {
            let mapper =
                Mapper::from_slice(data).map_err(|e| UploadError::InvalidMapper(e.to_string()))?;
            validation.mapper = Some(mapper);
        }
        UploadPurpose::Recording => {
            validation.recording = Some(inspect_recording(data)?);
        }
        UploadPurpose::AudioQuery | UploadPurpose::ImageQuery => {}
    }

    debug!("{} ({}) is a valid {}", name, FileSize(size), purpose);
    Ok(validation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::archive::tests::zip_of;
    use crate::upload::recording::tests::wav_bytes;

    fn limits() -> UploadLimits {
        UploadLimits::default()
    }

    #[test]
    fn test_wrong_extension_lists_allowed_formats() {
        let err = validate_file(UploadPurpose::AudioQuery, &limits(), "song.mp3", b"x").unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid file format. Allowed formats: mid, midi, wav"
        );
    }

    #[test]
    fn test_oversized_file() {
        let small = UploadLimits {
            max_size: 4,
            ..UploadLimits::default()
        };
        let err = validate_file(UploadPurpose::ImageQuery, &small, "a.png", b"12345").unwrap_err();
        assert!(matches!(err, UploadError::TooLarge { .. }));
        assert!(err.to_string().starts_with("File is too large"));
    }

    #[test]
    fn test_zip_with_text_file_is_rejected_by_name() {
        let data = zip_of(&[("a.mid", b"1"), ("notes.txt", b"2"), ("b.mid", b"3")]);
        let err = validate_file(UploadPurpose::AudioDataset, &limits(), "songs.zip", &data).unwrap_err();
        assert_eq!(err.to_string(), "Invalid files found in ZIP: notes.txt");
    }

    #[test]
    fn test_zip_of_allowed_members_is_accepted() {
        let data = zip_of(&[("covers/", b""), ("covers/a.jpg", b"1"), ("covers/b.PNG", b"2")]);
        let validation =
            validate_file(UploadPurpose::ImageDataset, &limits(), "covers.zip", &data).unwrap();
        assert_eq!(validation.archive.unwrap().valid.len(), 2);
    }

    #[test]
    fn test_zip_without_members_is_rejected() {
        let data = zip_of(&[("empty/", b"")]);
        let err = validate_file(UploadPurpose::AudioDataset, &limits(), "songs.zip", &data).unwrap_err();
        assert_eq!(err.to_string(), "ZIP contains no valid MIDI files");
    }

    #[test]
    fn test_unreadable_zip() {
        let err = validate_file(UploadPurpose::AudioDataset, &limits(), "songs.zip", b"garbage").unwrap_err();
        assert!(err.to_string().starts_with("Failed to read ZIP file"));
    }

    #[test]
    fn test_mapper_must_parse() {
        let err = validate_file(UploadPurpose::Mapper, &limits(), "mapper.json", b"{").unwrap_err();
        assert!(matches!(err, UploadError::InvalidMapper(_)));

        let ok = validate_file(
            UploadPurpose::Mapper,
            &limits(),
            "mapper.json",
            br#"{"songs": [{"song": "A", "singer": "B"}]}"#,
        )
        .unwrap();
        assert_eq!(ok.mapper.unwrap().songs.len(), 1);
    }

    #[test]
    fn test_recording_is_inspected() {
        let data = wav_bytes(16_000, &[0; 1_600]);
        let validation = validate_file(UploadPurpose::Recording, &limits(), "hum.wav", &data).unwrap();
        assert_eq!(validation.recording.unwrap().frames, 1_600);
    }
}
