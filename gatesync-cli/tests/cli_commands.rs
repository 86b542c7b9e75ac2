use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::{json, Value};
use tempfile::TempDir;

// Far above any pid the test host will hand out.
const DEAD_PID: u32 = 2_147_483_000;

fn gatesync(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("gatesync").unwrap();
    cmd.env("HOME", home)
        .env("USERPROFILE", home)
        .env_remove("HORIZON_DOMAIN")
        .env_remove("KEYCLOAK_URL")
        .env_remove("MCP_REGISTRY_URL")
        .env_remove("RUST_LOG");
    cmd
}

fn gemini_dir(home: &Path) -> std::path::PathBuf {
    home.join(".gemini")
}

fn write_json(path: &Path, value: &Value) {
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(path, serde_json::to_vec_pretty(value).unwrap()).unwrap();
}

fn state_path(home: &Path) -> std::path::PathBuf {
    gemini_dir(home).join("mcp-gateway-sync-state.json")
}

#[test]
fn login_requires_base_domain() {
    let home = TempDir::new().unwrap();
    gatesync(home.path())
        .arg("--no-prompt")
        .assert()
        .failure()
        .stderr(predicate::str::contains("HORIZON_DOMAIN"));
}

#[test]
fn prune_and_force_are_mutually_exclusive() {
    let home = TempDir::new().unwrap();
    gatesync(home.path())
        .args(["login", "--prune", "--force"])
        .env("HORIZON_DOMAIN", "dev.example.com")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
}

#[test]
fn status_reports_not_running() {
    let home = TempDir::new().unwrap();
    gatesync(home.path())
        .args(["daemon", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sync is not running."));
}

#[test]
fn status_json_reports_not_running() {
    let home = TempDir::new().unwrap();
    let output = gatesync(home.path())
        .args(["daemon", "status", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let status: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["running"], json!(false));
}

#[test]
fn stop_cleans_stale_state() {
    let home = TempDir::new().unwrap();
    write_json(
        &state_path(home.path()),
        &json!({
            "pid": DEAD_PID,
            "mode": "daemon",
            "script": "/usr/local/bin/gatesync",
            "started_at": 1_700_000_000u64,
        }),
    );

    gatesync(home.path())
        .args(["daemon", "stop"])
        .assert()
        .success()
        .stdout(predicate::str::contains(format!("stale PID {DEAD_PID}")));
    assert!(!state_path(home.path()).exists());
}

#[test]
fn status_does_not_trust_dead_pid() {
    let home = TempDir::new().unwrap();
    write_json(
        &state_path(home.path()),
        &json!({
            "pid": DEAD_PID,
            "mode": "foreground",
            "script": "/usr/local/bin/gatesync",
            "started_at": 1_700_000_000u64,
        }),
    );

    gatesync(home.path())
        .args(["daemon", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sync is not running."));
    assert!(!state_path(home.path()).exists());
}

#[test]
fn logs_without_file_says_so() {
    let home = TempDir::new().unwrap();
    gatesync(home.path())
        .args(["daemon", "logs"])
        .assert()
        .success()
        .stdout(predicate::str::contains("log file not found"));
}

#[test]
fn logs_prints_only_the_tail() {
    let home = TempDir::new().unwrap();
    let log = gemini_dir(home.path()).join("mcp-gateway-sync.log");
    std::fs::create_dir_all(log.parent().unwrap()).unwrap();
    let body: String = (1..=10).map(|n| format!("line {n}\n")).collect();
    std::fs::write(&log, body).unwrap();

    gatesync(home.path())
        .args(["daemon", "logs", "--lines", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("line 8\nline 9\nline 10"))
        .stdout(predicate::str::contains("line 7").not());
}

#[test]
fn daemon_start_requires_base_domain() {
    let home = TempDir::new().unwrap();
    gatesync(home.path())
        .args(["daemon", "start"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("HORIZON_DOMAIN"));
    assert!(!state_path(home.path()).exists());
}

#[test]
fn watch_without_session_fails_and_releases_the_loop() {
    let home = TempDir::new().unwrap();
    gatesync(home.path())
        .arg("watch")
        .env("HORIZON_DOMAIN", "dev.example.com")
        .assert()
        .failure()
        .stderr(predicate::str::contains("gatesync login"));
    assert!(!state_path(home.path()).exists());
}

#[test]
fn login_surfaces_unreachable_registry() {
    let home = TempDir::new().unwrap();
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs();
    write_json(
        &gemini_dir(home.path()).join("mcp-gateway-registry-token.json"),
        &json!({
            "access_token": "fresh",
            "refresh_token": "r",
            "expires_in": 3600,
            "obtained_at": now,
        }),
    );
    let settings = gemini_dir(home.path()).join("settings.json");
    write_json(&settings, &json!({ "theme": "dark" }));
    let before = std::fs::read(&settings).unwrap();

    gatesync(home.path())
        .args(["login", "--no-prompt"])
        .env("HORIZON_DOMAIN", "dev.example.com")
        .env("MCP_REGISTRY_URL", "http://127.0.0.1:9")
        .assert()
        .failure()
        .stdout(predicate::str::contains("Using existing session"))
        .stderr(predicate::str::contains("sync failed"));
    assert_eq!(std::fs::read(&settings).unwrap(), before);
}
