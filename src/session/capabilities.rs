use serde::Serialize;

use crate::upload::{MediaKind, UploadPurpose};

use super::state::SessionState;

/// What the user may do next, derived from the session state and the
/// media kind currently on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub view: MediaKind,
    pub upload_dataset: bool,
    pub upload_content: bool,
    pub record: bool,
    pub query: bool,
    pub play: bool,
    pub show_catalog: bool,
    pub show_results: bool,
}

impl Capabilities {
    pub fn of(state: &SessionState, view: MediaKind) -> Self {
        let has_mapper = state.mapper().is_some();
        let has_view_dataset = state.has_dataset(view);
        let has_audio = state.has_dataset(MediaKind::Audio);

        Self {
            view,
            upload_dataset: has_mapper,
            upload_content: has_view_dataset,
            record: has_view_dataset && view == MediaKind::Audio,
            query: state.content().is_some(),
            play: has_audio && view == MediaKind::Audio,
            show_catalog: has_mapper,
            show_results: state.query().is_some(),
        }
    }

    pub fn allows(&self, purpose: UploadPurpose) -> bool {
        match purpose {
            UploadPurpose::Mapper => true,
            UploadPurpose::AudioDataset | UploadPurpose::ImageDataset => self.upload_dataset,
            UploadPurpose::AudioQuery => self.upload_content && self.view == MediaKind::Audio,
            UploadPurpose::ImageQuery => self.upload_content && self.view == MediaKind::Image,
            UploadPurpose::Recording => self.record,
        }
    }
}
