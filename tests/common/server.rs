//! Mock search backend
//!
//! An axum server on a random port that speaks the backend's multipart API,
//! records every request it gets and answers with canned results.

use super::constants::*;
use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

/// One multipart field as received.
#[derive(Debug, Clone)]
pub struct ReceivedField {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct ReceivedRequest {
    pub endpoint: String,
    pub query: HashMap<String, String>,
    pub fields: Vec<ReceivedField>,
}

impl ReceivedRequest {
    pub fn field(&self, name: &str) -> Option<&ReceivedField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

#[derive(Default)]
struct MockState {
    requests: Mutex<Vec<ReceivedRequest>>,
    failing: AtomicBool,
    delay_ms: Mutex<u64>,
}

/// Mock backend instance. Shuts down when dropped.
pub struct MockBackend {
    pub base_url: String,
    state: Arc<MockState>,
    _shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl MockBackend {
    pub async fn spawn() -> Self {
        let state = Arc::new(MockState::default());

        let app = Router::new()
            .route("/", get(|| async { "ok" }))
            .route("/{endpoint}", post(handle))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let port = listener
            .local_addr()
            .expect("Failed to get local address")
            .port();
        let base_url = format!("http://127.0.0.1:{}", port);

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();
        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .expect("Mock backend failed");
        });

        let backend = Self {
            base_url,
            state,
            _shutdown_tx: Some(shutdown_tx),
        };
        backend.wait_for_ready().await;
        backend
    }

    async fn wait_for_ready(&self) {
        let client = reqwest::Client::new();
        let start = std::time::Instant::now();
        while start.elapsed() < Duration::from_millis(SERVER_READY_TIMEOUT_MS) {
            if let Ok(response) = client.get(format!("{}/", self.base_url)).send().await {
                if response.status().is_success() {
                    return;
                }
            }
            tokio::time::sleep(Duration::from_millis(SERVER_READY_POLL_INTERVAL_MS)).await;
        }
        panic!(
            "Mock backend did not become ready within {}ms",
            SERVER_READY_TIMEOUT_MS
        );
    }

    /// Make every following request fail with a 500 and an error payload.
    pub fn set_failing(&self, failing: bool) {
        self.state.failing.store(failing, Ordering::SeqCst);
    }

    /// Hold every following response back for `ms` milliseconds.
    pub fn set_delay_ms(&self, ms: u64) {
        *self.state.delay_ms.lock().unwrap() = ms;
    }

    pub fn requests(&self) -> Vec<ReceivedRequest> {
        self.state.requests.lock().unwrap().clone()
    }
}

async fn handle(
    State(state): State<Arc<MockState>>,
    Path(endpoint): Path<String>,
    Query(query): Query<HashMap<String, String>>,
    mut multipart: Multipart,
) -> Response {
    let mut fields = Vec::new();
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(str::to_string);
        let size = field.bytes().await.map(|b| b.len()).unwrap_or(0);
        fields.push(ReceivedField {
            name,
            file_name,
            content_type,
            size,
        });
    }

    state.requests.lock().unwrap().push(ReceivedRequest {
        endpoint: endpoint.clone(),
        query,
        fields,
    });

    let delay = *state.delay_ms.lock().unwrap();
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }

    if state.failing.load(Ordering::SeqCst) {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(serde_json::json!({ "error": MOCK_ERROR })),
        )
            .into_response();
    }

    match endpoint.as_str() {
        "upload-dataset" | "upload-audio-dataset" | "upload-image-dataset" => {
            Json(serde_json::json!({ "status": "Dataset loaded successfully" })).into_response()
        }
        "search" | "search-audio" | "search-image" => {
            let matching_results = vec![
                serde_json::json!({
                    "song": TOP_MATCH,
                    "singer": TOP_MATCH_SINGER,
                    "genre": "Pop",
                    "filename": "imagine.jpg",
                    "similarity_percentage": TOP_SIMILARITY,
                }),
                serde_json::json!({
                    "song": "Hey Jude",
                    "singer": "The Beatles",
                    "genre": "Pop",
                    "filename": "jude.jpg",
                    "similarity_percentage": 64.0,
                }),
            ];
            Json(serde_json::json!({
                "matches_found": matching_results.len(),
                "matching_results": matching_results,
                "highest_similarity": TOP_SIMILARITY,
                "all_similarities": [TOP_SIMILARITY, 64.0, 12.0],
                "processing_metrics": {
                    "processing_time": MOCK_PROCESSING_TIME,
                    "load_time": 0.5,
                },
            }))
            .into_response()
        }
        _ => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "detail": "Not Found" })),
        )
            .into_response(),
    }
}
