//! Tests that run the `maibot-launcher` binary.

use std::process::{Command, Stdio};
use tempfile::TempDir;

fn launcher() -> Command {
    Command::new(env!("CARGO_BIN_EXE_maibot-launcher"))
}

#[test]
fn test_help_lists_flags() {
    let output = launcher().arg("--help").output().unwrap();
    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    for flag in ["--config", "--data-dir", "--debug", "--log-json", "--log-filter", "--log-file", "--offline"] {
        assert!(help.contains(flag), "missing {} in help", flag);
    }
}

#[test]
fn test_version() {
    let output = launcher().arg("--version").output().unwrap();
    assert!(output.status.success());
    let version = String::from_utf8_lossy(&output.stdout);
    assert!(version.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_without_terminal_creates_store_and_exits() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("config.toml");
    let data = temp.path().join("data");

    let output = launcher()
        .arg("--config")
        .arg(&config)
        .arg("--data-dir")
        .arg(&data)
        .arg("--offline")
        .arg("--log-file")
        .stdin(Stdio::null())
        .output()
        .unwrap();

    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let stored = std::fs::read_to_string(&config).unwrap();
    assert!(stored.contains("current_config"));
    assert!(data.join("logs").join("launcher.log").is_file());
}
