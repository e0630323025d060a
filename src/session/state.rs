//! Session state machine.
//!
//! Mapper loaded -> dataset loaded -> content uploaded -> query executed,
//! reduced from [`SessionAction`]s. Illegal transitions leave the state as is.

use serde::Serialize;
use thiserror::Error;

use crate::upload::MediaKind;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapperInfo {
    pub file_name: String,
    pub songs: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetInfo {
    pub kind: MediaKind,
    pub file_name: String,
    pub members: usize,
}

/// At most one dataset per media kind.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Datasets {
    pub audio: Option<DatasetInfo>,
    pub image: Option<DatasetInfo>,
}

impl Datasets {
    pub fn get(&self, kind: MediaKind) -> Option<&DatasetInfo> {
        match kind {
            MediaKind::Audio => self.audio.as_ref(),
            MediaKind::Image => self.image.as_ref(),
        }
    }

    pub fn has(&self, kind: MediaKind) -> bool {
        self.get(kind).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.audio.is_none() && self.image.is_none()
    }

    fn insert(&mut self, info: DatasetInfo) {
        match info.kind {
            MediaKind::Audio => self.audio = Some(info),
            MediaKind::Image => self.image = Some(info),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentInfo {
    pub kind: MediaKind,
    pub file_name: String,
    /// Hummed rather than picked from disk.
    pub recorded: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryInfo {
    pub matches: usize,
    pub highest_similarity: Option<f64>,
    /// Seconds.
    pub query_time: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Empty,
    MapperLoaded {
        mapper: MapperInfo,
    },
    DatasetLoaded {
        mapper: MapperInfo,
        datasets: Datasets,
    },
    ContentUploaded {
        mapper: MapperInfo,
        datasets: Datasets,
        content: ContentInfo,
    },
    QueryExecuted {
        mapper: MapperInfo,
        datasets: Datasets,
        content: ContentInfo,
        query: QueryInfo,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    LoadMapper(MapperInfo),
    LoadDataset(DatasetInfo),
    UploadContent(ContentInfo),
    ExecuteQuery(QueryInfo),
    Reset,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Load a mapper file first")]
    MapperRequired,

    #[error("Upload a dataset first")]
    DatasetRequired,

    #[error("No {0} dataset is loaded")]
    KindMismatch(MediaKind),

    #[error("Upload a query file first")]
    ContentRequired,
}

impl SessionState {
    pub fn stage(&self) -> &'static str {
        match self {
            SessionState::Empty => "empty",
            SessionState::MapperLoaded { .. } => "mapper loaded",
            SessionState::DatasetLoaded { .. } => "dataset loaded",
            SessionState::ContentUploaded { .. } => "content uploaded",
            SessionState::QueryExecuted { .. } => "query executed",
        }
    }

    pub fn mapper(&self) -> Option<&MapperInfo> {
        match self {
            SessionState::Empty => None,
            SessionState::MapperLoaded { mapper }
            | SessionState::DatasetLoaded { mapper, .. }
            | SessionState::ContentUploaded { mapper, .. }
            | SessionState::QueryExecuted { mapper, .. } => Some(mapper),
        }
    }

    pub fn datasets(&self) -> Option<&Datasets> {
        match self {
            SessionState::Empty | SessionState::MapperLoaded { .. } => None,
            SessionState::DatasetLoaded { datasets, .. }
            | SessionState::ContentUploaded { datasets, .. }
            | SessionState::QueryExecuted { datasets, .. } => Some(datasets),
        }
    }

    pub fn content(&self) -> Option<&ContentInfo> {
        match self {
            SessionState::ContentUploaded { content, .. }
            | SessionState::QueryExecuted { content, .. } => Some(content),
            _ => None,
        }
    }

    pub fn query(&self) -> Option<&QueryInfo> {
        match self {
            SessionState::QueryExecuted { query, .. } => Some(query),
            _ => None,
        }
    }

    pub fn has_dataset(&self, kind: MediaKind) -> bool {
        self.datasets().map(|d| d.has(kind)).unwrap_or(false)
    }
}

/// Next state for `action`, or why it is not allowed from `state`.
pub fn reduce(state: &SessionState, action: SessionAction) -> Result<SessionState, TransitionError> {
    match action {
        SessionAction::Reset => Ok(SessionState::Empty),

        // A new mapper invalidates everything uploaded against the old one.
        SessionAction::LoadMapper(mapper) => Ok(SessionState::MapperLoaded { mapper }),

        SessionAction::LoadDataset(info) => {
            let mapper = state.mapper().ok_or(TransitionError::MapperRequired)?.clone();
            let mut datasets = state.datasets().cloned().unwrap_or_default();
            datasets.insert(info);
            Ok(SessionState::DatasetLoaded { mapper, datasets })
        }

        SessionAction::UploadContent(content) => {
            let mapper = state.mapper().ok_or(TransitionError::MapperRequired)?.clone();
            let datasets = state
                .datasets()
                .filter(|d| !d.is_empty())
                .ok_or(TransitionError::DatasetRequired)?
                .clone();
            if !datasets.has(content.kind) {
                return Err(TransitionError::KindMismatch(content.kind));
            }
            Ok(SessionState::ContentUploaded {
                mapper,
                datasets,
                content,
            })
        }

        SessionAction::ExecuteQuery(query) => match state {
            SessionState::ContentUploaded {
                mapper,
                datasets,
                content,
            }
            | SessionState::QueryExecuted {
                mapper,
                datasets,
                content,
                ..
            } => Ok(SessionState::QueryExecuted {
                mapper: mapper.clone(),
                datasets: datasets.clone(),
                content: content.clone(),
                query,
            }),
            SessionState::Empty => Err(TransitionError::MapperRequired),
            SessionState::MapperLoaded { .. } => Err(TransitionError::DatasetRequired),
            SessionState::DatasetLoaded { .. } => Err(TransitionError::ContentRequired),
        },
    }
}
