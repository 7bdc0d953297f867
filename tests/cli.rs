use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use tempfile::TempDir;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn advisor(secrets_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("advisor").unwrap();
    cmd.env_remove("ADVISOR_MODEL")
        .env_remove("ADVISOR_API_BASE")
        .env("ADVISOR_SECRETS", secrets_dir.path().join("secrets.env"));
    cmd
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("advisor").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: advisor [OPTIONS] <COMMAND>"))
        .stdout(predicate::str::contains("Commands:"))
        .stdout(predicate::str::contains("serve"))
        .stdout(predicate::str::contains("chat"))
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("--model <MODEL>"))
        .stdout(predicate::str::contains("--secrets <SECRETS>"))
        .stdout(predicate::str::contains("--no-dashboard"))
        .stdout(predicate::str::contains("--version"));
}

#[test]
fn test_cli_serve_help() {
    let mut cmd = Command::cargo_bin("advisor").unwrap();
    cmd.arg("serve")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: advisor serve"))
        .stdout(predicate::str::contains("--port <PORT>"));
}

#[test]
fn test_cli_chat_help() {
    let mut cmd = Command::cargo_bin("advisor").unwrap();
    cmd.arg("chat")
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage: advisor chat"))
        .stdout(predicate::str::contains("--mode <MODE>"));
}

#[test]
fn test_cli_no_command() {
    let mut cmd = Command::cargo_bin("advisor").unwrap();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage: advisor [OPTIONS] <COMMAND>"));
}

#[test]
fn test_ask_without_key_prints_warning() {
    let dir = TempDir::new().unwrap();
    advisor(&dir)
        .args(["ask", "strategy", "should we pivot?"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Please enter your API Key"));
}

#[test]
fn test_ask_unknown_mode_fails() {
    let dir = TempDir::new().unwrap();
    advisor(&dir)
        .args(["ask", "fundraising", "x"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown mode 'fundraising'"));
}

#[test]
fn test_chat_mode_switch_then_quit() {
    let dir = TempDir::new().unwrap();
    advisor(&dir)
        .args(["chat", "--mode", "competition"])
        .write_stdin("\n/mode idea-gen\n/quit\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Mode: 💡 Idea Gen"));
}

#[test]
fn test_chat_exits_on_eof() {
    let dir = TempDir::new().unwrap();
    advisor(&dir)
        .args(["chat"])
        .write_stdin("\n/mode competition\n")
        .assert()
        .success()
        .stdout(predicate::str::contains("Mode: 📊 Competition"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ask_with_secret_store_calls_service() {
    let mock_server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1beta/models/cli-model:generateContent"))
        .and(header("x-goog-api-key", "file-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "candidates": [{ "content": { "parts": [{
                "text": "Hire a closer.\n```json\n{\"allocation\": {\"Sales\": 70, \"R&D\": 30}, \"trend\": [1, 2, 3, 4], \"ratio\": \"4.1x\"}\n```"
            }] } }]
        })))
        .expect(1)
        .mount(&mock_server)
        .await;

    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("secrets.env"), "GEMINI_API_KEY=file-key\n").unwrap();
    let uri = mock_server.uri();

    tokio::task::spawn_blocking(move || {
        advisor(&dir)
            .args(["--model", "cli-model", "--api-base", uri.as_str(), "ask", "strategy", "sales?"])
            .assert()
            .success()
            .stdout(predicate::str::contains("Hire a closer."))
            .stdout(predicate::str::contains("LTV:CAC: 4.1x"))
            .stdout(predicate::str::contains("```json").not());
    })
    .await
    .unwrap();
}
