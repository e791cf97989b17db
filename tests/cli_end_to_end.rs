#![deny(clippy::all, clippy::pedantic)]

use assert_cmd::Command;
use httpmock::MockServer;
use predicates::str::contains;
use std::io::Write;
use tempfile::TempDir;

/// `atelier-cli` running in an empty directory with no site configured.
fn cli(workdir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("atelier-cli"));
    cmd.current_dir(workdir.path())
        .env_remove("ATELIER_SITE_URL")
        .env_remove("ATELIER_CONFIG_FILE")
        .env_remove("ATELIER_API__BASE_URL");
    cmd
}

fn workdir() -> TempDir {
    tempfile::tempdir().expect("temp dir")
}

#[test]
fn journals_get_works_end_to_end() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("GET").path("/api/journals/3");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"id":3,"author_id":7,"title":"Field notes"}"#);
    });

    let dir = workdir();
    let assert = cli(&dir)
        .env("ATELIER_SITE_URL", server.base_url())
        .args(["journals", "get", "3"])
        .assert()
        .success();

    let output = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(output.contains("\"title\": \"Field notes\""));
    mock.assert();
}

#[test]
fn missing_site_fails_fast() {
    let dir = workdir();
    cli(&dir)
        .args(["categories", "list"])
        .assert()
        .failure()
        .stderr(contains("api.base_url"));
}

#[test]
fn site_flag_overrides_environment() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("GET").path("/api/categories");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"[{"id":1,"name":"Ceramics"}]"#);
    });

    let dir = workdir();
    cli(&dir)
        .env("ATELIER_SITE_URL", "http://127.0.0.1:9")
        .args(["--site", &server.base_url(), "categories", "list"])
        .assert()
        .success()
        .stdout(contains("Ceramics"));
    mock.assert();
}

#[test]
fn site_read_from_config_file_in_working_directory() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method("GET").path("/api/site-settings");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"site_name":"Atelier","registrations_open":false}"#);
    });

    let dir = workdir();
    let mut file = std::fs::File::create(dir.path().join("atelier.toml")).expect("config file");
    writeln!(file, "[api]\nbase_url = \"{}\"", server.base_url()).expect("write config");

    cli(&dir)
        .args(["settings", "get"])
        .assert()
        .success()
        .stdout(contains("\"site_name\": \"Atelier\""));
    mock.assert();
}

#[test]
fn follow_toggle_prints_committed_state() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("GET").path("/api/users/5/follow-status");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"following":true}"#);
    });
    let unfollow = server.mock(|when, then| {
        when.method("DELETE").path("/api/users/5/follow");
        then.status(200)
            .header("content-type", "application/json")
            .body(r#"{"following":false}"#);
    });

    let dir = workdir();
    cli(&dir)
        .env("ATELIER_SITE_URL", server.base_url())
        .args(["follow", "toggle", "5"])
        .assert()
        .success()
        .stdout(contains("\"following\": false"))
        .stdout(contains("\"reconciled\": false"));
    unfollow.assert();
}

#[test]
fn rejected_write_exits_with_server_message() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method("POST").path("/api/journals");
        then.status(422)
            .header("content-type", "application/json")
            .body(r#"{"message":"title must not be empty"}"#);
    });

    let dir = workdir();
    cli(&dir)
        .env("ATELIER_SITE_URL", server.base_url())
        .args(["journals", "create", "--author", "7", "--title", " "])
        .assert()
        .failure()
        .stderr(contains("title must not be empty"));
}
