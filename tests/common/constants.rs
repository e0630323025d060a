//! Shared constants for end-to-end tests
//!
//! When the fixture catalog changes, update only this file.

/// Songs in the fixture mapper: (title, singer, genre, cover, midi file).
pub const SONGS: &[(&str, &str, &str, &str, &str)] = &[
    ("Hey Jude", "The Beatles", "Pop", "jude.jpg", "hey_jude.mid"),
    ("Imagine", "John Lennon", "Pop", "imagine.jpg", "imagine.mid"),
    ("Bohemian Rhapsody", "Queen", "Rock", "bohemian.png", "bohemian.mid"),
];

/// Song returned first by the mock backend's searches.
pub const TOP_MATCH: &str = "Imagine";
pub const TOP_MATCH_SINGER: &str = "John Lennon";
pub const TOP_SIMILARITY: f64 = 91.5;

/// Seconds reported by the mock backend as processing time.
pub const MOCK_PROCESSING_TIME: f64 = 0.125;

/// Error reported by the mock backend when failing.
pub const MOCK_ERROR: &str = "Dataset not loaded";

/// Maximum time to wait for the mock backend to start
pub const SERVER_READY_TIMEOUT_MS: u64 = 5000;

/// Polling interval when waiting for the mock backend
pub const SERVER_READY_POLL_INTERVAL_MS: u64 = 10;
