//! CLI Integration Tests
//!
//! These tests run the `wled` binary against a throwaway database and
//! config file. Devices are added through a one-shot HTTP responder on
//! localhost that answers like a WLED controller, so no real hardware or
//! multicast network is needed.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::thread;

use tempfile::TempDir;

const STATE_INFO: &str = r#"{"state":{"on":true,"bri":255,"seg":[{"col":[[255,0,0]]}]},"info":{"ver":"0.14.4","name":"Kitchen","mac":"a8032a6c11f0","leds":{"count":60},"arch":"esp32"}}"#;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        // mDNS off so nothing touches the network unless a test asks for it.
        std::fs::write(
            dir.path().join("config.toml"),
            "[discovery]\nmdns = false\n\n[refresh]\nrequest_timeout_secs = 2\n",
        )
        .unwrap();
        Self { dir }
    }

    fn config(&self) -> PathBuf {
        self.dir.path().join("config.toml")
    }

    fn database(&self) -> PathBuf {
        self.dir.path().join("devices.db")
    }

    fn run(&self, args: &[&str]) -> Output {
        run_with(&self.config(), &self.database(), args)
    }
}

fn run_with(config: &Path, database: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_wled"))
        .arg("--config")
        .arg(config)
        .arg("--database")
        .arg(database)
        .args(args)
        .env("NO_COLOR", "1")
        .env_remove("RUST_LOG")
        .output()
        .expect("Failed to run wled binary")
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Answer `requests` HTTP requests with the given JSON body.
fn serve_wled(body: &'static str, requests: usize) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let address = listener.local_addr().unwrap().to_string();

    thread::spawn(move || {
        for stream in listener.incoming().take(requests) {
            let Ok(mut stream) = stream else { continue };
            let mut request = Vec::new();
            let mut buf = [0u8; 1024];
            while !request.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => request.extend_from_slice(&buf[..n]),
                }
            }
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes());
        }
    });

    address
}

// =============================================================================
// Help, version and completions
// =============================================================================

#[test]
fn test_help_lists_commands() {
    let output = Command::new(env!("CARGO_BIN_EXE_wled"))
        .arg("--help")
        .output()
        .unwrap();
    assert!(output.status.success(), "Help should succeed");

    let text = stdout(&output);
    for command in ["list", "scan", "refresh", "add", "delete", "hide", "rename", "watch"] {
        assert!(text.contains(command), "Help should list {command}");
    }
}

#[test]
fn test_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_wled"))
        .arg("--version")
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_bash_completions() {
    let output = Command::new(env!("CARGO_BIN_EXE_wled"))
        .args(["completions", "bash"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert!(stdout(&output).contains("wled"));
}

// =============================================================================
// Registry commands without devices
// =============================================================================

#[test]
fn test_cached_list_of_empty_registry() {
    let ws = Workspace::new();

    let output = ws.run(&["list", "--cached", "--format", "json"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let value: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(value["online"], serde_json::json!([]));
    assert_eq!(value["offline"], serde_json::json!([]));

    let text = ws.run(&["list", "--cached"]);
    assert!(text.status.success());
    assert!(stdout(&text).contains("No devices known"));
}

#[test]
fn test_delete_unknown_device_fails() {
    let ws = Workspace::new();
    let output = ws.run(&["delete", "aabbccddeeff"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No device matches"));
}

#[test]
fn test_scan_without_sources_fails() {
    let ws = Workspace::new();
    let output = ws.run(&["scan"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("No discovery sources"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let ws = Workspace::new();
    std::fs::write(ws.config(), "[refresh]\ninterval_secs = 1\n").unwrap();
    let output = ws.run(&["list", "--cached"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("refresh.interval_secs"));
}

#[test]
fn test_watch_rejects_out_of_range_interval() {
    let ws = Workspace::new();
    for interval in ["1", "4000"] {
        let output = ws.run(&["watch", "--interval", interval]);
        assert!(!output.status.success());
        assert!(String::from_utf8_lossy(&output.stderr).contains("--interval"));
    }
}

#[test]
fn test_add_unreachable_address_fails() {
    let ws = Workspace::new();
    // Bind then drop to get a port nothing listens on.
    let port = TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port();
    let output = ws.run(&["add", &format!("127.0.0.1:{port}")]);
    assert!(!output.status.success());

    let list = ws.run(&["list", "--cached", "--format", "json"]);
    let value: serde_json::Value = serde_json::from_str(&stdout(&list)).unwrap();
    assert_eq!(value["offline"], serde_json::json!([]));
}

// =============================================================================
// Device lifecycle against a local responder
// =============================================================================

#[test]
fn test_add_rename_hide_delete() {
    let ws = Workspace::new();
    let address = serve_wled(STATE_INFO, 1);

    let added = ws.run(&["add", &address]);
    assert!(added.status.success(), "stderr: {}", String::from_utf8_lossy(&added.stderr));
    assert!(stdout(&added).contains("Kitchen"));

    // Fresh process: the device was persisted, reachability is not.
    let list = ws.run(&["list", "--cached", "--format", "json"]);
    let value: serde_json::Value = serde_json::from_str(&stdout(&list)).unwrap();
    let offline = value["offline"].as_array().unwrap();
    assert_eq!(offline.len(), 1);
    assert_eq!(offline[0]["id"], "a8032a6c11f0");
    assert_eq!(offline[0]["attributes"]["led_count"], 60);

    assert!(ws.run(&["rename", "kitchen", "Counter"]).status.success());
    let csv = ws.run(&["list", "--cached", "--format", "csv", "--no-header"]);
    assert!(stdout(&csv).starts_with("a8032a6c11f0,Counter,"));

    assert!(ws.run(&["hide", "counter"]).status.success());
    let hidden = ws.run(&["list", "--cached", "--format", "json"]);
    let value: serde_json::Value = serde_json::from_str(&stdout(&hidden)).unwrap();
    assert_eq!(value["offline"], serde_json::json!([]));
    assert_eq!(value["hidden"], 1);

    let shown = ws.run(&["list", "--cached", "--show-hidden", "--format", "json"]);
    let value: serde_json::Value = serde_json::from_str(&stdout(&shown)).unwrap();
    assert_eq!(value["offline"].as_array().unwrap().len(), 1);

    assert!(ws.run(&["delete", "a8032a6c11f0"]).status.success());
    assert!(!ws.run(&["delete", "a8032a6c11f0"]).status.success());
}

#[test]
fn test_refresh_reports_outcomes() {
    let ws = Workspace::new();
    let address = serve_wled(STATE_INFO, 2);
    assert!(ws.run(&["add", &address]).status.success());

    let output = ws.run(&["refresh", "--format", "json"]);
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_str(&stdout(&output)).unwrap();
    assert_eq!(value[0]["id"], "a8032a6c11f0");
    assert_eq!(value[0]["outcome"], "online");
}
