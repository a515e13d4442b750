#![allow(deprecated)]

/// End-to-end CLI tests
///
/// Every test points the binary at a temporary history file and config so
/// nothing outside the temp directory is touched. Turns run in mock mode.
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::Path;
mod common;

const OVERLAP_ENV: [&str; 9] = [
    "OVERLAP_BASE_URL",
    "OVERLAP_MODEL",
    "OVERLAP_API_KEY",
    "OVERLAP_INTERNET_ACCESS",
    "OVERLAP_MOCK",
    "OVERLAP_USER_ID",
    "OVERLAP_USER_EMAIL",
    "OVERLAP_TEAM_ID",
    "OVERLAP_HISTORY_FILE",
];

fn overlap(config: &Path, history: &Path) -> Command {
    let mut cmd = Command::cargo_bin("overlap").unwrap();
    for var in OVERLAP_ENV {
        cmd.env_remove(var);
    }
    cmd.env("NO_COLOR", "1")
        .arg("--config")
        .arg(config)
        .arg("--storage-path")
        .arg(history);
    cmd
}

#[test]
fn test_history_list_on_empty_store() {
    let (temp_dir, config_path) = common::temp_config_file("chat:\n  mock: true\n");
    let history = temp_dir.path().join("history.json");

    overlap(&config_path, &history)
        .arg("history")
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No conversation history found."));
}

#[test]
fn test_mock_send_is_streamed_and_stored() {
    let (temp_dir, config_path) = common::temp_config_file("chat:\n  mock: true\n");
    let history = temp_dir.path().join("history.json");

    overlap(&config_path, &history)
        .arg("send")
        .arg("Plan a trip")
        .arg("--conversation")
        .arg("conv-1")
        .assert()
        .success()
        .stdout(predicate::str::contains("Echo: Plan a trip"))
        .stderr(predicate::str::contains("conversation: conv-1"));

    overlap(&config_path, &history)
        .arg("history")
        .arg("show")
        .arg("conv-1")
        .assert()
        .success()
        .stdout(predicate::str::contains("Plan a trip"))
        .stdout(predicate::str::contains("(Local simulated response.)"));

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&history).unwrap()).unwrap();
    assert_eq!(raw["conv-1"]["messages"].as_array().unwrap().len(), 2);
}

#[test]
fn test_history_rename_and_delete() {
    let (temp_dir, config_path) = common::temp_config_file("chat:\n  mock: true\n");
    let history = temp_dir.path().join("history.json");

    overlap(&config_path, &history)
        .args(["send", "hello", "--conversation", "c1"])
        .assert()
        .success();

    overlap(&config_path, &history)
        .args(["history", "rename", "c1", "Greetings"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Renamed conversation c1"));

    overlap(&config_path, &history)
        .args(["history", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Greetings"));

    overlap(&config_path, &history)
        .args(["history", "delete", "c1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted conversation c1"));

    overlap(&config_path, &history)
        .args(["history", "clear", "--yes"])
        .assert()
        .success();
    assert!(!history.exists());
}

#[test]
fn test_send_without_identity_fails() {
    let (temp_dir, config_path) = common::temp_config_file("chat:\n  mock: false\n");
    let history = temp_dir.path().join("history.json");

    overlap(&config_path, &history)
        .args(["send", "hello"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("No user identity configured"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (temp_dir, config_path) =
        common::temp_config_file("server:\n  conversation_path: backend-api/v2/conversation\n");
    let history = temp_dir.path().join("history.json");

    overlap(&config_path, &history)
        .args(["history", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("must start with '/'"));
}

#[test]
fn test_unreadable_config_yaml_is_rejected() {
    let (temp_dir, config_path) = common::temp_config_file("server: [broken");
    let history = temp_dir.path().join("history.json");

    overlap(&config_path, &history)
        .args(["history", "list"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config"));
}

#[test]
fn test_short_conversation_ids_resolve_for_send_and_resume() {
    let (temp_dir, config_path) = common::temp_config_file("chat:\n  mock: true\n");
    let history = temp_dir.path().join("history.json");
    let full_id = "5f1c2a9e-7d41-4c1b-9a0e-2b6f8c3d1e77";

    overlap(&config_path, &history)
        .args(["send", "first", "--conversation", full_id])
        .assert()
        .success();

    overlap(&config_path, &history)
        .args(["send", "second", "--conversation", &full_id[..8]])
        .assert()
        .success()
        .stderr(predicate::str::contains(format!("conversation: {}", full_id)));

    let raw: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&history).unwrap()).unwrap();
    assert_eq!(raw.as_object().unwrap().len(), 1);
    assert_eq!(raw[full_id]["messages"].as_array().unwrap().len(), 4);

    overlap(&config_path, &history)
        .args(["chat", "--resume", &full_id[..8]])
        .write_stdin("/exit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Resuming first (4 messages)"));
}
