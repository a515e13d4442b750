use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;
use overlap::storage::ConversationStore;

#[allow(dead_code)]
pub fn create_temp_store() -> (ConversationStore, PathBuf, TempDir) {
    let tmp = TempDir::new().expect("failed to create tempdir");
    let path = tmp.path().join("conversations.json");
    let store = ConversationStore::open(path.clone()).expect("failed to open store with path");
    (store, path, tmp)
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Event-stream body with one `{"text": ...}` event per fragment
#[allow(dead_code)]
pub fn sse_body(fragments: &[&str]) -> Vec<u8> {
    fragments
        .iter()
        .map(|f| format!("data: {}\n\n", serde_json::json!({ "text": f })))
        .collect::<String>()
        .into_bytes()
}
