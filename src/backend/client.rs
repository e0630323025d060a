//! HTTP client for the external search backend.

use std::fmt;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::upload::{extension_of, MediaKind, SelectedFile};

use super::models::{ErrorBody, SearchResponse, UploadResponse};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    UploadAudioDataset,
    UploadImageDataset,
    /// Mapper and dataset in one request.
    UploadDataset,
    SearchAudio,
    SearchImage,
    Search,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::UploadAudioDataset => "upload-audio-dataset",
            Endpoint::UploadImageDataset => "upload-image-dataset",
            Endpoint::UploadDataset => "upload-dataset",
            Endpoint::SearchAudio => "search-audio",
            Endpoint::SearchImage => "search-image",
            Endpoint::Search => "search",
        }
    }

    pub fn for_dataset(kind: MediaKind, with_mapper: bool) -> Self {
        match (with_mapper, kind) {
            (true, _) => Endpoint::UploadDataset,
            (false, MediaKind::Audio) => Endpoint::UploadAudioDataset,
            (false, MediaKind::Image) => Endpoint::UploadImageDataset,
        }
    }

    pub fn for_query(kind: Option<MediaKind>) -> Self {
        match kind {
            Some(MediaKind::Audio) => Endpoint::SearchAudio,
            Some(MediaKind::Image) => Endpoint::SearchImage,
            None => Endpoint::Search,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.path())
    }
}

/// A dataset archive, optionally sent together with the mapper.
#[derive(Debug, Clone)]
pub struct DatasetUpload {
    pub kind: MediaKind,
    pub dataset: SelectedFile,
    pub mapper: Option<SelectedFile>,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    /// `None` uses the generic search endpoint.
    pub kind: Option<MediaKind>,
    pub file: SelectedFile,
    /// Minimum similarity in percent.
    pub similarity_threshold: Option<f64>,
}

/// Anything that can store datasets and answer similarity queries.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    async fn upload_dataset(&self, request: DatasetUpload) -> Result<UploadResponse>;

    async fn search(&self, request: SearchRequest) -> Result<SearchResponse>;
}

/// Content type sent for an uploaded file: sniffed from the bytes, else
/// guessed from the extension.
pub fn content_type(file: &SelectedFile) -> &'static str {
    if let Some(kind) = infer::get(&file.data) {
        return kind.mime_type();
    }
    match extension_of(&file.name).as_deref() {
        Some("json") => "application/json",
        Some("zip") => "application/zip",
        Some("mid") | Some("midi") => "audio/midi",
        Some("wav") => "audio/wav",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        _ => "application/octet-stream",
    }
}

fn file_part(file: &SelectedFile) -> Result<Part> {
    Part::bytes(file.data.to_vec())
        .file_name(file.name.clone())
        .mime_str(content_type(file))
        .with_context(|| format!("Invalid content type for {}", file.name))
}

/// HTTP implementation of [`SearchBackend`].
#[derive(Debug, Clone)]
pub struct BackendClient {
    client: reqwest::Client,
    base_url: String,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, endpoint: Endpoint) -> String {
        format!("{}/{}", self.base_url, endpoint.path())
    }

    pub fn http(&self) -> &reqwest::Client {
        &self.client
    }

    async fn post_form<T: DeserializeOwned>(
        &self,
        endpoint: Endpoint,
        form: Form,
        query: &[(&str, String)],
    ) -> Result<T> {
        let url = self.url(endpoint);
        debug!("POST {} {:?}", url, query);
        let response = self
            .client
            .post(&url)
            .query(query)
            .multipart(form)
            .send()
            .await
            .with_context(|| format!("Failed to reach backend at {}", url))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = ErrorBody::parse(&body).unwrap_or_else(|| {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            });
            bail!("{} failed with status {}: {}", endpoint, status.as_u16(), message);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", endpoint))
    }
}

#[async_trait]
impl SearchBackend for BackendClient {
    async fn upload_dataset(&self, request: DatasetUpload) -> Result<UploadResponse> {
        let endpoint = Endpoint::for_dataset(request.kind, request.mapper.is_some());
        let mut form = Form::new();
        if let Some(mapper) = &request.mapper {
            form = form.part("mapper_file", file_part(mapper)?);
        }
        form = form.part("file", file_part(&request.dataset)?);

        let response: UploadResponse = self.post_form(endpoint, form, &[]).await?;
        info!(
            "Uploaded {} dataset {}: {}",
            request.kind, request.dataset.name, response.status
        );
        Ok(response)
    }

    async fn search(&self, request: SearchRequest) -> Result<SearchResponse> {
        let endpoint = Endpoint::for_query(request.kind);
        let form = Form::new().part("file", file_part(&request.file)?);
        let query: Vec<(&str, String)> = request
            .similarity_threshold
            .map(|t| vec![("similarity_threshold", t.to_string())])
            .unwrap_or_default();

        let response: SearchResponse = self.post_form(endpoint, form, &query).await?;
        info!(
            "{} returned {} matches in {:.3}s",
            endpoint,
            response.matches_found,
            response.query_time()
        );
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_selection() {
        assert_eq!(
            Endpoint::for_dataset(MediaKind::Audio, false).path(),
            "upload-audio-dataset"
        );
        assert_eq!(
            Endpoint::for_dataset(MediaKind::Image, false).path(),
            "upload-image-dataset"
        );
        assert_eq!(Endpoint::for_dataset(MediaKind::Image, true).path(), "upload-dataset");
        assert_eq!(Endpoint::for_query(Some(MediaKind::Audio)).path(), "search-audio");
        assert_eq!(Endpoint::for_query(Some(MediaKind::Image)).path(), "search-image");
        assert_eq!(Endpoint::for_query(None).path(), "search");
    }

    #[test]
    fn test_urls_trim_slashes() {
        let client = BackendClient::new("http://localhost:8000/", Duration::from_secs(5)).unwrap();
        assert_eq!(client.url(Endpoint::Search), "http://localhost:8000/search");
        assert_eq!(client.base_url(), "http://localhost:8000");
    }

    #[test]
    fn test_content_type() {
        let png = SelectedFile::new("cover.bin", vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0]);
        assert_eq!(content_type(&png), "image/png");
        assert_eq!(content_type(&SelectedFile::new("a.jpeg", b"xx".to_vec())), "image/jpeg");
        assert_eq!(content_type(&SelectedFile::new("mapper.json", b"{}".to_vec())), "application/json");
        assert_eq!(content_type(&SelectedFile::new("x", vec![])), "application/octet-stream");
    }
}
