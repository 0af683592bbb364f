//! Integration tests for the sounddetect binary.
//!
//! None of these open an audio device.

use std::process::Command;

fn sounddetect() -> Command {
    Command::new(env!("CARGO_BIN_EXE_sounddetect"))
}

#[test]
fn test_version() {
    let output = sounddetect()
        .arg("version")
        .output()
        .expect("Failed to run command");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("sounddetect "));
}

#[test]
fn test_run_rejects_invalid_window() {
    let dir = tempfile::tempdir().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(&config_path, "[capture]\nsample_rate = 48000\n").unwrap();

    let output = sounddetect()
        .args(["run", "--config"])
        .arg(&config_path)
        .args(["--window-ms", "0"])
        .output()
        .expect("Failed to run command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("window_duration_ms"), "stderr: {stderr}");
}

#[test]
fn test_run_reports_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("absent.toml");

    let output = sounddetect()
        .args(["run", "--config"])
        .arg(&missing)
        .output()
        .expect("Failed to run command");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("Failed to read config file"), "stderr: {stderr}");
}

#[test]
fn test_unknown_subcommand() {
    let output = sounddetect()
        .arg("record")
        .output()
        .expect("Failed to run command");

    assert!(!output.status.success());
}
