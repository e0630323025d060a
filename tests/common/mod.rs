//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{MockBackend, write_fixture_files};
//!
//! #[tokio::test]
//! async fn test_search() {
//!     let backend = MockBackend::spawn().await;
//!     let files = write_fixture_files().unwrap();
//!     // point a BackendClient at backend.base_url ...
//! }
//! ```

mod constants;
mod fixtures;
mod server;

// Public API - this is what tests import
pub use constants::*;
#[allow(unused_imports)]
pub use fixtures::{
    audio_dataset, image_dataset, mapper_json, midi_bytes, wav_bytes, write_fixture_files, zip_of,
    FixtureFiles,
};
pub use server::MockBackend;
