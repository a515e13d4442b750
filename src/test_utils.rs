//! Test utilities for Overlap
//!
//! Shared helpers for unit tests: temporary stores and event-stream bodies.

use crate::storage::ConversationStore;
use std::path::PathBuf;
use tempfile::TempDir;

/// Create a temporary directory for testing
///
/// # Returns
///
/// Returns a TempDir that will be cleaned up when dropped
pub fn temp_dir() -> TempDir {
    TempDir::new().expect("Failed to create temporary directory")
}

/// Store backed by a history file inside a fresh temporary directory
///
/// Keep the returned `TempDir` alive for as long as the store is used.
pub fn temp_store() -> (ConversationStore, PathBuf, TempDir) {
    let dir = temp_dir();
    let path = dir.path().join("conversations.json");
    let store = ConversationStore::open(path.clone()).expect("Failed to open temporary store");
    (store, path, dir)
}

/// Event-stream body carrying one `{"text": ...}` event per fragment
pub fn sse_body(fragments: &[&str]) -> Vec<u8> {
    let mut body = String::new();
    for fragment in fragments {
        body.push_str("data: ");
        body.push_str(&serde_json::json!({ "text": fragment }).to_string());
        body.push_str("\n\n");
    }
    body.into_bytes()
}

/// Assert that an error contains the expected message
///
/// # Panics
///
/// Panics if the result is Ok or if the error doesn't contain the expected message
pub fn assert_error_contains<T: std::fmt::Debug>(result: anyhow::Result<T>, expected: &str) {
    match result {
        Ok(value) => panic!("Expected error containing '{}', got Ok({:?})", expected, value),
        Err(e) => {
            let message = format!("{:#}", e);
            assert!(
                message.contains(expected),
                "Expected error containing '{}', got '{}'",
                expected,
                message
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sse_body_frames_each_fragment() {
        let body = String::from_utf8(sse_body(&["He", "llo"])).unwrap();
        assert_eq!(
            body,
            "data: {\"text\":\"He\"}\n\ndata: {\"text\":\"llo\"}\n\n"
        );
    }

    #[test]
    fn test_temp_store_writes_under_temp_dir() {
        let (store, path, dir) = temp_store();
        store.add_conversation("a", "A").unwrap();
        assert!(path.starts_with(dir.path()));
        assert!(path.exists());
    }
}
