//! End-to-end tests of the `ragpersona` binary
//!
//! Each test runs the binary inside its own temp directory with its own data
//! directory and checks output and exit codes: 2 for user errors, 3 when
//! Ollama is unreachable.

mod common;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn ragpersona(workdir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("ragpersona").expect("binary builds");
    cmd.current_dir(workdir.path())
        .env("RAGPERSONA_DATA_DIR", workdir.path().join("data"))
        .env("RAGPERSONA_OLLAMA_HOST", "http://127.0.0.1:1")
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn test_list_personas_when_empty() {
    let tmp = TempDir::new().expect("tempdir");
    ragpersona(&tmp)
        .arg("list-personas")
        .assert()
        .success()
        .stdout(predicate::str::contains("No personas found"));
}

#[test]
fn test_create_list_info_delete() {
    let tmp = TempDir::new().expect("tempdir");

    ragpersona(&tmp)
        .args(["create-persona", "Rick", "--description", "Mad scientist"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created persona 'Rick'"));

    ragpersona(&tmp)
        .arg("list-personas")
        .assert()
        .success()
        .stdout(predicate::str::contains("Rick").and(predicate::str::contains("Empty")));

    ragpersona(&tmp)
        .args(["info", "rick"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Mad scientist"));

    ragpersona(&tmp)
        .args(["delete-persona", "Rick", "--force"])
        .assert()
        .success();

    ragpersona(&tmp).args(["info", "Rick"]).assert().code(2);
}

#[test]
fn test_unknown_persona_exits_with_user_error() {
    let tmp = TempDir::new().expect("tempdir");
    ragpersona(&tmp)
        .args(["create-persona", "Rick"])
        .assert()
        .success();

    ragpersona(&tmp)
        .args(["info", "Rik"])
        .assert()
        .code(2)
        .stderr(
            predicate::str::contains("Persona 'Rik' not found")
                .and(predicate::str::contains("Rick")),
        );
}

#[test]
fn test_duplicate_name_exits_with_user_error() {
    let tmp = TempDir::new().expect("tempdir");
    ragpersona(&tmp)
        .args(["create-persona", "Rick"])
        .assert()
        .success();

    ragpersona(&tmp)
        .args(["create-persona", "RICK"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn test_empty_transcript_exits_with_user_error() {
    let tmp = TempDir::new().expect("tempdir");
    let empty = common::write_file(&tmp, "empty.srt", "1\n00:00:01,000 --> 00:00:02,000\n\n");

    ragpersona(&tmp)
        .args(["create-persona", "Rick"])
        .assert()
        .success();

    ragpersona(&tmp)
        .args(["add-transcript", "Rick"])
        .arg(&empty)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("No transcript available"));
}

#[test]
fn test_check_ollama_unreachable_exits_with_environment_error() {
    let tmp = TempDir::new().expect("tempdir");
    ragpersona(&tmp)
        .arg("check-ollama")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("ollama serve"));
}

#[test]
fn test_chat_unreachable_exits_with_environment_error() {
    let tmp = TempDir::new().expect("tempdir");
    ragpersona(&tmp)
        .args(["create-persona", "Rick"])
        .assert()
        .success();

    ragpersona(&tmp)
        .args(["chat", "Rick"])
        .write_stdin("")
        .assert()
        .code(3);
}

#[test]
fn test_invalid_config_exits_with_user_error() {
    let tmp = TempDir::new().expect("tempdir");
    common::write_file(
        &tmp,
        "bad.yaml",
        "rag:\n  chunk_size: 100\n  chunk_overlap: 100\n",
    );

    ragpersona(&tmp)
        .args(["--config", "bad.yaml", "list-personas"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("overlap"));
}

#[test]
fn test_sessions_list_and_delete_missing() {
    let tmp = TempDir::new().expect("tempdir");
    ragpersona(&tmp)
        .args(["sessions", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No saved chat sessions"));

    ragpersona(&tmp)
        .args(["sessions", "delete", "Rick"])
        .assert()
        .code(2);
}

#[test]
fn test_missing_transcript_file_exits_with_user_error() {
    let tmp = TempDir::new().expect("tempdir");
    ragpersona(&tmp)
        .args(["create-persona", "Rick"])
        .assert()
        .success();

    ragpersona(&tmp)
        .args(["add-transcript", "Rick", "no-such-clip.srt"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("no-such-clip.srt"));
}
