//! Client for the external search backend.

mod client;
mod models;

pub use client::{
    content_type, BackendClient, DatasetUpload, Endpoint, SearchBackend, SearchRequest,
};
pub use models::{ErrorBody, ProcessingMetrics, SearchMatch, SearchResponse, UploadResponse};
