//! Integration tests for the hotlog CLI.

use std::fs;
use std::path::Path;
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

/// Helper to run hotlog in `dir` and return (stdout, stderr, exit_code).
fn run_in(dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_hotlog"))
        .args(args)
        .current_dir(dir)
        .output()
        .expect("Failed to run hotlog");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let exit_code = output.status.code().unwrap_or(-1);

    (stdout, stderr, exit_code)
}

fn write_config(dir: &Path, level: i64) {
    fs::write(
        dir.join("config.yaml"),
        format!(
            "logrotate:\n  filename: ./logs/app.log\n  maxsize: 5\n  maxbackups: 3\n  maxage: 7\n  compress: true\nlog:\n  level: {level}\n"
        ),
    )
    .expect("Failed to write config");
}

#[test]
fn test_init_command_creates_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("nested").join("config.yaml");

    let output = Command::new(env!("CARGO_BIN_EXE_hotlog"))
        .arg("init")
        .arg("--path")
        .arg(&config_path)
        .output()
        .expect("Failed to run init command");

    assert!(output.status.success(), "init command should succeed");
    assert!(config_path.exists(), "Config file should be created");

    let content = fs::read_to_string(&config_path).expect("Failed to read config");
    assert!(content.contains("logrotate:"), "Config should contain logrotate");
    assert!(content.contains("level: -1"), "Config should default to debug");
}

#[test]
fn test_help_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_hotlog"))
        .arg("--help")
        .output()
        .expect("Failed to run help command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "Help should succeed");
    assert!(stdout.contains("hotlog"), "Help should mention program name");
    assert!(stdout.contains("run"), "Help should mention run command");
    assert!(stdout.contains("check"), "Help should mention check command");
}

#[test]
fn test_version_command() {
    let output = Command::new(env!("CARGO_BIN_EXE_hotlog"))
        .arg("version")
        .output()
        .expect("Failed to run version command");

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(output.status.success(), "Version should succeed");
    assert!(stdout.contains("hotlog"), "Version should mention program name");
    assert!(stdout.contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_check_reports_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_config(temp_dir.path(), 1);

    let (stdout, stderr, exit_code) = run_in(temp_dir.path(), &["check"]);

    assert_eq!(exit_code, 0, "check should succeed: {}", stderr);
    assert!(stdout.contains("level: WARN"), "{}", stdout);
    assert!(stdout.contains("logrotate.maxsize: 5 MB"), "{}", stdout);
    assert!(stdout.contains("logrotate.maxbackups: 3"), "{}", stdout);
    assert!(stdout.contains("logrotate.compress: true"), "{}", stdout);
    assert!(stderr.contains("Configuration is valid."));
}

#[test]
fn test_check_json_output() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_config(temp_dir.path(), 2);

    let (stdout, stderr, exit_code) = run_in(temp_dir.path(), &["check", "--json", "-q"]);

    assert_eq!(exit_code, 0, "check should succeed: {}", stderr);
    let value: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");
    assert_eq!(value["log.level"], 2);
    assert_eq!(value["logrotate.filename"], "./logs/app.log");
    assert_eq!(value["logrotate.compress"], true);
    assert!(stderr.is_empty(), "quiet check prints nothing: {}", stderr);
}

#[test]
fn test_check_auto_creates_default_config() {
    let temp_dir = tempfile::tempdir().unwrap();

    let (stdout, stderr, exit_code) = run_in(temp_dir.path(), &["check"]);

    assert_eq!(exit_code, 0, "check should succeed: {}", stderr);
    assert!(temp_dir.path().join("config.yaml").exists());
    assert!(stdout.contains("level: DEBUG"), "{}", stdout);
    assert!(stdout.contains("logrotate.maxsize: 200 MB"), "{}", stdout);
}

#[test]
fn test_check_without_config_and_no_auto_create_fails() {
    let temp_dir = tempfile::tempdir().unwrap();

    let (_stdout, stderr, exit_code) = run_in(temp_dir.path(), &["check", "--no-auto-create"]);

    assert_ne!(exit_code, 0, "check should fail without a config file");
    assert!(stderr.contains("Fatal error config file"), "{}", stderr);
    assert!(stderr.contains("logrotate:"), "Error should show expected content");
    assert!(!temp_dir.path().join("config.yaml").exists());
}

#[test]
fn test_check_rejects_malformed_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(temp_dir.path().join("config.yaml"), "logrotate: [oops\n").unwrap();

    let (_stdout, stderr, exit_code) = run_in(temp_dir.path(), &["check"]);

    assert_ne!(exit_code, 0, "malformed config should fail");
    assert!(stderr.contains("Fatal error config file"), "{}", stderr);
}

#[test]
fn test_check_rejects_invalid_values() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(
        temp_dir.path().join("config.yaml"),
        "logrotate:\n  filename: app.log\n  maxsize: -3\nlog:\n  level: 0\n",
    )
    .unwrap();

    let (_stdout, stderr, exit_code) = run_in(temp_dir.path(), &["check"]);

    assert_ne!(exit_code, 0, "negative maxsize should fail");
    assert!(stderr.contains("logrotate.maxsize"), "{}", stderr);
}

#[test]
fn test_run_applies_level_change() {
    let temp_dir = tempfile::tempdir().unwrap();
    write_config(temp_dir.path(), -1);

    let child = Command::new(env!("CARGO_BIN_EXE_hotlog"))
        .arg("run")
        .current_dir(temp_dir.path())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("Failed to spawn hotlog");

    // Give the watcher time to start, then raise the level to error
    thread::sleep(Duration::from_millis(1500));
    write_config(temp_dir.path(), 2);
    thread::sleep(Duration::from_millis(1500));

    let mut child = child;
    child.kill().ok();
    let output = child.wait_with_output().expect("Failed to read output");
    let stdout = String::from_utf8_lossy(&output.stdout).to_string();

    let (before, after) = stdout
        .split_once("Config file changed:")
        .unwrap_or_else(|| panic!("reload should be reported: {}", stdout));

    for message in ["Info", "Debug", "Warn", "Error"] {
        assert!(before.contains(message), "{} logged at debug level: {}", message, before);
    }
    assert!(after.contains("Error"), "error still logged: {}", after);
    assert!(!after.contains("Warn"), "warn suppressed after change: {}", after);
    assert!(!after.contains("Debug"), "debug suppressed after change: {}", after);

    assert!(temp_dir.path().join("logs").join("app.log").exists());
}
