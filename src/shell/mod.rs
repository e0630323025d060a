//! The application shell: session flow, catalog, uploads, backend and player
//! wired together.
//!
//! Every operation either applies a [`SessionAction`] and refreshes the
//! derived [`Capabilities`], or fails and leaves the session untouched.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::backend::{DatasetUpload, SearchBackend, SearchRequest, UploadResponse};
use crate::catalog::{CatalogEntry, CatalogSource, CatalogView, Mapper, PageView};
use crate::playback::{PlayerHandle, PlayerState, PlayerStatus, SongInfo, SongRef, SongSource};
use crate::session::{
    reduce, Capabilities, ContentInfo, DatasetInfo, MapperInfo, QueryInfo, RequestTracker,
    SessionAction, SessionState,
};
use crate::upload::{
    extract_member, AcceptedUpload, MediaKind, SelectedFile, UploadController, UploadLimits,
    UploadPurpose, UploadSnapshot,
};

#[derive(Debug, Clone)]
pub struct ShellSettings {
    pub page_size: usize,
    pub page_window: usize,
    pub limits: UploadLimits,
    /// Percent; `None` lets the backend decide.
    pub similarity_threshold: Option<f64>,
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            page_size: crate::catalog::DEFAULT_PAGE_SIZE,
            page_window: crate::catalog::DEFAULT_PAGE_WINDOW,
            limits: UploadLimits::default(),
            similarity_threshold: None,
        }
    }
}

/// Called with the progress channel of every upload that starts simulating.
pub type ProgressObserver = Box<dyn Fn(UploadPurpose, watch::Receiver<u8>) + Send + Sync>;

pub struct AppShell {
    backend: Arc<dyn SearchBackend>,
    player: PlayerHandle,
    settings: ShellSettings,
    session: SessionState,
    view: MediaKind,
    capabilities: Capabilities,
    catalog: CatalogView,
    uploads: HashMap<UploadPurpose, UploadController>,
    requests: RequestTracker,
    progress_observer: Option<ProgressObserver>,
    mapper: Option<(Mapper, SelectedFile)>,
    audio_dataset: Option<SelectedFile>,
    content: Option<SelectedFile>,
}

impl AppShell {
    pub fn new(backend: Arc<dyn SearchBackend>, player: PlayerHandle, settings: ShellSettings) -> Self {
        let session = SessionState::Empty;
        let view = MediaKind::Audio;
        Self {
            backend,
            player,
            catalog: CatalogView::new(settings.page_size, settings.page_window),
            settings,
            capabilities: Capabilities::of(&session, view),
            session,
            view,
            uploads: HashMap::new(),
            requests: RequestTracker::new(),
            progress_observer: None,
            mapper: None,
            audio_dataset: None,
            content: None,
        }
    }

    pub fn on_progress(&mut self, observer: ProgressObserver) {
        self.progress_observer = Some(observer);
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    pub fn view(&self) -> MediaKind {
        self.view
    }

    pub fn catalog(&self) -> &CatalogView {
        &self.catalog
    }

    pub fn page(&self) -> PageView {
        self.catalog.page_view(self.capabilities.play)
    }

    pub fn requests(&self) -> &RequestTracker {
        &self.requests
    }

    pub fn player(&self) -> &PlayerHandle {
        &self.player
    }

    pub fn player_status(&self) -> PlayerStatus {
        self.player.status()
    }

    pub fn upload_snapshot(&self, purpose: UploadPurpose) -> Option<UploadSnapshot> {
        self.uploads.get(&purpose).map(|c| c.snapshot())
    }

    fn apply(&mut self, action: SessionAction) -> Result<()> {
        let next = reduce(&self.session, action)?;
        debug!("Session {} -> {}", self.session.stage(), next.stage());
        self.session = next;
        self.capabilities = Capabilities::of(&self.session, self.view);
        Ok(())
    }

    fn show_mapper_entries(&mut self) {
        let entries = self
            .mapper
            .as_ref()
            .map(|(mapper, _)| mapper.entries())
            .unwrap_or_default();
        self.catalog.set_entries(entries, CatalogSource::Mapper);
    }

    /// Run one upload dialog to completion: open, select, wait for the
    /// simulated progress and confirm.
    async fn upload(&mut self, purpose: UploadPurpose, path: PathBuf) -> Result<AcceptedUpload> {
        if !self.capabilities.allows(purpose) {
            bail!("The {} upload is not available right now", purpose);
        }

        let limits = self.settings.limits;
        let controller = self
            .uploads
            .entry(purpose)
            .or_insert_with(|| UploadController::new(purpose, limits));
        controller.open();
        controller.select_paths(&[path]).await?;

        if let (Some(observer), Some(progress)) =
            (&self.progress_observer, controller.subscribe_progress())
        {
            observer(purpose, progress);
        }

        controller.wait_complete().await?;
        Ok(controller.confirm()?)
    }

    /// Load a mapper file. Replaces everything loaded so far.
    pub async fn load_mapper(&mut self, path: PathBuf) -> Result<MapperInfo> {
        let accepted = self.upload(UploadPurpose::Mapper, path).await?;
        let mapper = accepted
            .mapper
            .ok_or_else(|| anyhow!("Mapper upload carried no mapper"))?;

        let info = MapperInfo {
            file_name: accepted.file.name.clone(),
            songs: mapper.songs.len(),
        };
        self.apply(SessionAction::LoadMapper(info.clone()))?;

        self.requests.cancel_all();
        if let Err(err) = self.player.eject().await {
            warn!("Failed to eject player: {}", err);
        }
        self.mapper = Some((mapper, accepted.file));
        self.audio_dataset = None;
        self.content = None;
        self.catalog.set_search_text("");
        self.show_mapper_entries();
        info!("Loaded mapper {} with {} songs", info.file_name, info.songs);
        Ok(info)
    }

    /// Validate a dataset archive and send it, with the mapper, to the backend.
    pub async fn upload_dataset(&mut self, kind: MediaKind, path: PathBuf) -> Result<UploadResponse> {
        let accepted = self.upload(UploadPurpose::dataset(kind), path).await?;
        let mapper_file = self
            .mapper
            .as_ref()
            .map(|(_, file)| file.clone())
            .ok_or_else(|| anyhow!("Load a mapper file first"))?;
        let members = accepted.archive.as_ref().map(|a| a.valid.len()).unwrap_or(0);

        let ticket = self.requests.begin();
        let request = DatasetUpload {
            kind,
            dataset: accepted.file.clone(),
            mapper: Some(mapper_file),
        };
        let response = match ticket.run(self.backend.upload_dataset(request)).await {
            None => bail!("Dataset upload was superseded"),
            Some(Err(err)) => {
                warn!("Dataset upload failed: {:#}", err);
                return Err(err);
            }
            Some(Ok(response)) => response,
        };
        if !self.requests.finish(&ticket) {
            bail!("Dataset upload was superseded");
        }

        self.apply(SessionAction::LoadDataset(DatasetInfo {
            kind,
            file_name: accepted.file.name.clone(),
            members,
        }))?;
        if kind == MediaKind::Audio {
            // The loaded song was decoded from the previous archive.
            if let Err(err) = self.player.eject().await {
                warn!("Failed to eject player: {}", err);
            }
            self.audio_dataset = Some(accepted.file);
        }
        self.content = None;
        if self.catalog.source() != CatalogSource::Mapper {
            self.show_mapper_entries();
        }
        Ok(response)
    }

    /// Pick the query file. `recorded` marks a hummed WAV.
    pub async fn submit_content(&mut self, path: PathBuf, recorded: bool) -> Result<ContentInfo> {
        let purpose = match (self.view, recorded) {
            (MediaKind::Audio, true) => UploadPurpose::Recording,
            (MediaKind::Audio, false) => UploadPurpose::AudioQuery,
            (MediaKind::Image, false) => UploadPurpose::ImageQuery,
            (MediaKind::Image, true) => bail!("Recordings are only available in the audio view"),
        };
        let accepted = self.upload(purpose, path).await?;
        let info = ContentInfo {
            kind: self.view,
            file_name: accepted.file.name.clone(),
            recorded,
        };
        self.apply(SessionAction::UploadContent(info.clone()))?;
        self.content = Some(accepted.file);
        if self.catalog.source() != CatalogSource::Mapper {
            self.show_mapper_entries();
        }
        Ok(info)
    }

    /// Search the backend with the uploaded content and list the results.
    pub async fn run_query(&mut self, threshold: Option<f64>) -> Result<QueryInfo> {
        if !self.capabilities.query {
            bail!("Upload a query file first");
        }
        let (file, kind) = match (&self.content, self.session.content()) {
            (Some(file), Some(info)) => (file.clone(), info.kind),
            _ => bail!("Upload a query file first"),
        };

        let ticket = self.requests.begin();
        let request = SearchRequest {
            kind: Some(kind),
            file,
            similarity_threshold: threshold.or(self.settings.similarity_threshold),
        };
        let response = match ticket.run(self.backend.search(request)).await {
            None => bail!("Query was superseded"),
            Some(Err(err)) => {
                warn!("Query failed: {:#}", err);
                return Err(err);
            }
            Some(Ok(response)) => response,
        };
        if !self.requests.finish(&ticket) {
            bail!("Query was superseded");
        }

        let info = QueryInfo {
            matches: response.matching_results.len(),
            highest_similarity: response.highest_similarity,
            query_time: response.query_time(),
        };
        self.apply(SessionAction::ExecuteQuery(info.clone()))?;

        let entries = response.entries(self.mapper.as_ref().map(|(m, _)| m));
        self.catalog.set_entries(
            entries,
            CatalogSource::SearchResults {
                query_time: info.query_time,
            },
        );
        info!("Query found {} matches", info.matches);
        Ok(info)
    }

    /// Switch between the audio and image views.
    pub async fn set_view(&mut self, view: MediaKind) {
        if view == self.view {
            return;
        }
        self.view = view;
        self.capabilities = Capabilities::of(&self.session, view);
        if !self.capabilities.play {
            if let Err(err) = self.player.eject().await {
                warn!("Failed to eject player: {}", err);
            }
        }
    }

    pub fn set_search_text(&mut self, text: impl Into<String>) {
        self.catalog.set_search_text(text);
    }

    pub fn change_page(&mut self, page: usize) -> bool {
        self.catalog.request_page(page)
    }

    pub fn next_page(&mut self) -> bool {
        self.catalog.next_page()
    }

    pub fn previous_page(&mut self) -> bool {
        self.catalog.previous_page()
    }

    /// Load and start the song behind the card at `index`.
    pub async fn play_entry(&mut self, index: usize) -> Result<PlayerStatus> {
        if !self.capabilities.play {
            bail!("Playback needs an audio dataset and the audio view");
        }
        let entry = self
            .catalog
            .entry(index)
            .cloned()
            .ok_or_else(|| anyhow!("No entry with index {}", index))?;
        let source = self.song_source(&entry)?;

        let song = SongRef {
            info: SongInfo {
                title: entry.title.clone(),
                singer: Some(entry.singer.clone()).filter(|s| !s.is_empty()),
                image: entry.image_path(),
            },
            source,
        };
        self.player.load(song).await?;
        let status = self.player.wait_loaded().await?;
        if status.state == PlayerState::Idle {
            bail!("Failed to load {}", entry.title);
        }
        self.player.play().await?;
        Ok(self.player.status())
    }

    fn song_source(&self, entry: &CatalogEntry) -> Result<SongSource> {
        let audio = entry
            .audio
            .as_deref()
            .ok_or_else(|| anyhow!("{} has no audio", entry.title))?;
        if audio.starts_with("http://") || audio.starts_with("https://") {
            return Ok(SongSource::Url(audio.to_string()));
        }
        let dataset = self
            .audio_dataset
            .as_ref()
            .ok_or_else(|| anyhow!("No audio dataset is loaded"))?;
        let data = extract_member(&dataset.data, audio)
            .with_context(|| format!("Failed to find audio for {}", entry.title))?;
        Ok(SongSource::Bytes(Arc::new(data)))
    }

    pub async fn toggle_playback(&self) -> Result<()> {
        Ok(self.player.toggle().await?)
    }

    pub async fn pause(&self) -> Result<()> {
        Ok(self.player.pause().await?)
    }

    pub async fn resume(&self) -> Result<()> {
        Ok(self.player.play().await?)
    }

    pub async fn stop(&self) -> Result<()> {
        Ok(self.player.stop().await?)
    }

    pub async fn seek(&self, seconds: f64) -> Result<()> {
        Ok(self.player.seek(seconds).await?)
    }

    pub async fn set_volume(&self, linear: f32) -> Result<()> {
        Ok(self.player.set_volume(linear).await?)
    }

    pub async fn eject(&self) -> Result<()> {
        Ok(self.player.eject().await?)
    }

    /// Cancel in-flight requests and stop the player.
    pub async fn shutdown(self) {
        self.requests.cancel_all();
        self.player.shutdown().await;
    }
}
