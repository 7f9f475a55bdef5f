//! Integration tests for CLI commands

#![allow(deprecated)]

use assert_cmd::{assert::OutputAssertExt, cargo::CommandCargoExt};
use predicates::prelude::*;
use std::path::Path;
use std::process::Command;
use tempfile::TempDir;

fn write_config(dir: &Path, base_url: &str) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    std::fs::write(
        &path,
        format!(
            r#"
[api]
base_url = "{}"
api_prefix = "/console/api"
marketplace_url = "{}"

[cache]
retry = 0
"#,
            base_url, base_url
        ),
    )
    .unwrap();
    path
}

fn plugctl(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("plugctl").unwrap();
    cmd.arg("--config")
        .arg(config)
        .env_remove("PLUGCTL_API_BASE_URL")
        .env_remove("PLUGCTL_API_TOKEN")
        .env_remove("PLUGCTL_MARKETPLACE_URL")
        .env("NO_COLOR", "1");
    cmd
}

#[test]
fn test_help_lists_commands() {
    let mut cmd = Command::cargo_bin("plugctl").unwrap();
    cmd.arg("--help");

    cmd.assert()
        .success()
        .stdout(predicate::str::contains("login-url"))
        .stdout(predicate::str::contains("install"))
        .stdout(predicate::str::contains("tasks"));
}

#[test]
fn test_login_url_forwards_invite_query() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "https://cloud.example.com");

    plugctl(&config)
        .args(["login-url", "--query", "?invite_token=abc&lang=en"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "https://cloud.example.com/console/api/oauth/login/galaxy?invite_token=abc&lang=en",
        ));
}

#[test]
fn test_login_url_without_invite_has_no_query() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "https://cloud.example.com");

    plugctl(&config)
        .args(["login-url", "--provider", "github", "--query", "lang=en"])
        .assert()
        .success()
        .stdout(predicate::str::diff(
            "https://cloud.example.com/console/api/oauth/login/github\n",
        ));
}

#[test]
fn test_install_queues_package() {
    let mut server = mockito::Server::new();
    let install = server
        .mock("POST", "/console/api/workspaces/current/plugin/install/pkg")
        .with_body(r#"{"all_installed": false, "task_id": "t-1"}"#)
        .create();

    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), &server.url());
    let deps = tmp.path().join("deps.json");
    std::fs::write(
        &deps,
        r#"{
            "dependencies": [{"type": "package", "value": {"unique_identifier": "acme/local:1.0.0@abc"}}],
            "plugins": [{"org": "acme", "name": "local"}]
        }"#,
    )
    .unwrap();
    let installed = tmp.path().join("installed.json");
    std::fs::write(&installed, "{}").unwrap();

    plugctl(&config)
        .arg("install")
        .arg(&deps)
        .arg("--installed")
        .arg(&installed)
        .assert()
        .success()
        .stdout(predicate::str::contains("acme/local"));

    install.assert();
}

#[test]
fn test_install_reports_failures() {
    let mut server = mockito::Server::new();
    server
        .mock("POST", "/console/api/workspaces/current/plugin/install/marketplace")
        .with_status(400)
        .create();

    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), &server.url());
    let deps = tmp.path().join("deps.json");
    std::fs::write(
        &deps,
        r#"{
            "dependencies": [{"type": "marketplace", "value": {"marketplace_plugin_unique_identifier": "acme/search:1.0@x"}}]
        }"#,
    )
    .unwrap();

    plugctl(&config)
        .arg("install")
        .arg(&deps)
        .assert()
        .failure()
        .stderr(predicate::str::contains("1 of 1 dependencies failed"));
}

#[test]
fn test_tasks_lists_plugins() {
    let mut server = mockito::Server::new();
    server
        .mock("GET", "/console/api/workspaces/current/plugin/tasks")
        .match_query(mockito::Matcher::Any)
        .with_body(
            r#"{"tasks": [{
                "id": "t-1",
                "status": "running",
                "plugins": [{"plugin_unique_identifier": "acme/search:1.0@x", "plugin_id": "acme/search", "status": "running"}]
            }]}"#,
        )
        .create();

    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), &server.url());

    plugctl(&config)
        .arg("tasks")
        .assert()
        .success()
        .stdout(predicate::str::contains("acme/search"))
        .stdout(predicate::str::contains("running"));
}

#[test]
fn test_clear_task_needs_both_ids() {
    let tmp = TempDir::new().unwrap();
    let config = write_config(tmp.path(), "http://127.0.0.1:9");

    plugctl(&config)
        .args(["tasks", "clear", "--task", "t-1"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--task and --plugin"));
}
