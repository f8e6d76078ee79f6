//! Basic CLI tests for the zigmind command-line interface.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

fn write_json(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

/// Test that the CLI binary exists and shows help.
#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("zigmind").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("inspect"));
}

/// Test that providing no subcommand shows an error.
#[test]
fn test_no_subcommand_shows_error() {
    let mut cmd = Command::cargo_bin("zigmind").unwrap();
    cmd.assert().failure();
}

#[test]
fn test_inspect_device_list() {
    let file = write_json(
        r#"[
            {"friendly_name": "Coordinator", "type": "Coordinator"},
            {"friendly_name": "lamp1", "type": "Router", "definition": {
                "vendor": "IKEA", "description": "LED bulb",
                "exposes": [{"type": "light", "features": [
                    {"type": "binary", "name": "state", "access": 7},
                    {"type": "numeric", "name": "brightness", "access": 7}
                ]}]
            }}
        ]"#,
    );

    let mut cmd = Command::cargo_bin("zigmind").unwrap();
    cmd.arg("inspect").arg(file.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("\"lamp1\""))
        .stdout(predicate::str::contains("BrightnessProperty"))
        .stdout(predicate::str::contains("Coordinator").not());
}

#[test]
fn test_inspect_single_entry() {
    let file = write_json(
        r#"{"friendly_name": "button", "definition": {"exposes": [
            {"type": "enum", "name": "action", "access": 1, "values": ["single", "double"]}
        ]}}"#,
    );

    let mut cmd = Command::cargo_bin("zigmind").unwrap();
    cmd.arg("inspect").arg(file.path());

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("PushButton"))
        .stdout(predicate::str::contains("DoublePressedEvent"));
}

#[test]
fn test_inspect_rejects_garbage() {
    let file = write_json("not json at all");

    let mut cmd = Command::cargo_bin("zigmind").unwrap();
    cmd.arg("inspect").arg(file.path());

    cmd.assert().failure();
}

#[test]
fn test_inspect_missing_file() {
    let mut cmd = Command::cargo_bin("zigmind").unwrap();
    cmd.arg("inspect").arg("/nonexistent/devices.json");

    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}
