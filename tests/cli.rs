// ABOUTME: Integration tests for the bootstrapper CLI commands.
// ABOUTME: Validates --help output, init, plan rendering, dry runs and status.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

const CONFIG: &str = r#"
instance: chat
services:
  - name: server
    image: ghcr.io/example/chat-server:9.1
    requires: [database]
database:
  password: { env: BOOTSTRAPPER_CLI_TEST_PASSWORD, default: changeme }
engine:
  poll_interval: 10ms
  ready_timeout: 1s
"#;

fn bootstrapper_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("bootstrapper"));
    cmd.current_dir(dir.path())
        .env("BOOTSTRAPPER_STATE_DIR", dir.path().join("state"));
    cmd
}

fn project() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("bootstrap.yml"), CONFIG).unwrap();
    dir
}

#[test]
fn help_shows_commands() {
    let dir = tempfile::tempdir().unwrap();
    bootstrapper_cmd(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("up"))
        .stdout(predicate::str::contains("down"))
        .stdout(predicate::str::contains("status"));
}

#[test]
fn init_creates_config_file() {
    let dir = tempfile::tempdir().unwrap();
    bootstrapper_cmd(&dir)
        .args(["init", "--instance", "team-chat"])
        .assert()
        .success();

    let content = fs::read_to_string(dir.path().join("bootstrap.yml")).unwrap();
    assert!(content.contains("instance: team-chat"));
    assert!(content.contains("image:"));
}

#[test]
fn init_refuses_to_overwrite_existing_config() {
    let dir = project();
    bootstrapper_cmd(&dir)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn plan_lists_resources_in_dependency_order() {
    let dir = project();
    let output = bootstrapper_cmd(&dir).arg("plan").assert().success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();

    let namespace = stdout.find("namespace/chat").unwrap();
    let database = stdout.find("statefulset/chat/chat-db").unwrap();
    let server = stdout.find("deployment/chat/chat-server").unwrap();
    assert!(namespace < database);
    assert!(database < server);
    assert!(!stdout.contains("changeme"));
}

#[test]
fn plan_json_is_machine_readable() {
    let dir = project();
    let output = bootstrapper_cmd(&dir)
        .args(["plan", "--output", "json"])
        .assert()
        .success();
    let stdout = String::from_utf8(output.get_output().stdout.clone()).unwrap();

    let plan: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(plan["event"], "plan");
    assert!(plan["resources"].as_array().unwrap().len() >= 5);
}

#[test]
fn invalid_plan_is_rejected_before_anything_runs() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("bootstrap.yml"),
        r#"
instance: chat
services:
  - name: server
    image: nginx
    requires: [object_storage]
"#,
    )
    .unwrap();

    bootstrapper_cmd(&dir)
        .args(["up", "--dry-run"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid plan"));
}

#[test]
fn dry_run_succeeds_without_a_cluster() {
    let dir = project();
    bootstrapper_cmd(&dir)
        .args(["up", "--dry-run"])
        .assert()
        .success();

    // Dry runs leave no state behind.
    assert!(!dir.path().join("state").join("chat.run.json").exists());
}

#[test]
fn status_without_run_fails() {
    let dir = project();
    bootstrapper_cmd(&dir)
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no previous run"));
}

#[test]
fn missing_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    bootstrapper_cmd(&dir)
        .arg("plan")
        .assert()
        .failure()
        .stderr(predicate::str::contains("configuration file not found"));
}
