#![allow(deprecated)] // cargo_bin is deprecated but still functional

use assert_cmd::Command;
use httpmock::Method::{GET, POST};
use httpmock::MockServer;
use predicates::str::{contains, starts_with};
use std::fs;
use std::net::TcpListener;
use tempfile::TempDir;

fn can_bind_localhost() -> bool {
    TcpListener::bind("127.0.0.1:0").is_ok()
}

#[test]
fn login_writes_client_config() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/api/token");
        then.status(200).json_body(serde_json::json!({
            "access_token": "issued-token",
            "token_type": "bearer",
            "expires_in": 43200
        }));
    });

    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("client.toml");
    let expected_url = server.base_url().trim_end_matches('/').to_string();

    Command::cargo_bin("certctl")
        .unwrap()
        .arg("login")
        .arg(server.base_url())
        .arg("--username")
        .arg("admin")
        .arg("--password-stdin")
        .arg("--client-config")
        .arg(&config_path)
        .env_remove("CERTFOLIO_SERVER")
        .env_remove("CERTFOLIO_TOKEN")
        .write_stdin("hunter22\n")
        .assert()
        .success()
        .stdout(contains("Logged in as 'admin'"));

    let contents = fs::read_to_string(&config_path).unwrap();
    let value: toml::Value = toml::from_str(&contents).unwrap();
    assert_eq!(value.get("server").and_then(|v| v.as_str()).unwrap(), expected_url);
    assert_eq!(value.get("token").and_then(|v| v.as_str()).unwrap(), "issued-token");
    assert_eq!(value.get("username").and_then(|v| v.as_str()).unwrap(), "admin");
}

#[test]
fn whoami_uses_saved_credential() {
    if !can_bind_localhost() {
        eprintln!("Skipping httpmock tests: cannot bind to localhost");
        return;
    }

    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(GET)
            .path("/api/me")
            .header("authorization", "Bearer saved-token");
        then.status(200).json_body(serde_json::json!({
            "id": 1,
            "username": "admin",
            "created_at": "2024-01-01T00:00:00Z"
        }));
    });

    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("client.toml");
    fs::write(
        &config_path,
        format!(
            "server = \"{}\"\ntoken = \"saved-token\"\n",
            server.base_url().trim_end_matches('/')
        ),
    )
    .unwrap();

    Command::cargo_bin("certctl")
        .unwrap()
        .arg("whoami")
        .arg("--client-config")
        .arg(&config_path)
        .env_remove("CERTFOLIO_SERVER")
        .env_remove("CERTFOLIO_TOKEN")
        .assert()
        .success()
        .stdout(contains("Username: admin"));

    mock.assert();
}

#[test]
fn login_rejects_missing_scheme() {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("client.toml");

    Command::cargo_bin("certctl")
        .unwrap()
        .arg("login")
        .arg("certs.example.com")
        .arg("--username")
        .arg("admin")
        .arg("--password")
        .arg("hunter22")
        .arg("--client-config")
        .arg(&config_path)
        .assert()
        .failure()
        .stderr(contains("server URL must start with http:// or https://"));
}

#[test]
fn delete_requires_login() {
    let temp = TempDir::new().unwrap();
    let config_path = temp.path().join("client.toml");

    Command::cargo_bin("certctl")
        .unwrap()
        .arg("delete")
        .arg("1")
        .arg("--server")
        .arg("http://localhost:8080")
        .arg("--client-config")
        .arg(&config_path)
        .env_remove("CERTFOLIO_TOKEN")
        .assert()
        .failure()
        .stderr(contains("not logged in"));
}

#[test]
fn hash_password_prints_encoded_hash() {
    Command::cargo_bin("certctl")
        .unwrap()
        .arg("hash-password")
        .write_stdin("hunter22\n")
        .assert()
        .success()
        .stdout(starts_with("$pbkdf2-sha256$i=600000$"));
}

#[test]
fn hash_password_rejects_empty_input() {
    Command::cargo_bin("certctl")
        .unwrap()
        .arg("hash-password")
        .write_stdin("\n")
        .assert()
        .failure()
        .stderr(contains("empty"));
}
