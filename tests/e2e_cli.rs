//! CLI end-to-end tests
//!
//! Tests for the convertforge command-line interface.

use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

/// Get a command for the convertforge binary
#[allow(deprecated)]
fn convertforge_cmd() -> Command {
    Command::cargo_bin("convertforge").unwrap()
}

fn write_config(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("config.toml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn test_cli_no_args_shows_help() {
    let mut cmd = convertforge_cmd();
    cmd.assert()
        .failure()
        .stderr(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_help_flag() {
    let mut cmd = convertforge_cmd();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("convertforge"))
        .stdout(predicate::str::contains("convert"))
        .stdout(predicate::str::contains("Usage"));
}

#[test]
fn test_cli_version_flag() {
    let mut cmd = convertforge_cmd();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("convertforge"));
}

#[test]
fn test_cli_version_command() {
    let mut cmd = convertforge_cmd();
    cmd.arg("version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_cli_formats_table() {
    let mut cmd = convertforge_cmd();
    cmd.arg("formats")
        .assert()
        .success()
        .stdout(predicate::str::contains("wkhtmltopdf"))
        .stdout(predicate::str::contains("pdftotext"))
        .stdout(predicate::str::contains(".wmv"));
}

#[test]
fn test_cli_formats_json() {
    let output = convertforge_cmd()
        .args(["formats", "--json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let entries: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
    assert!(entries
        .iter()
        .any(|e| e["target"] == "docx" && e["tool"] == "pandoc"));
    assert!(entries.iter().all(|e| e["timeout_secs"].as_u64().unwrap() > 0));
}

#[test]
fn test_cli_check_tools_command() {
    let mut cmd = convertforge_cmd();
    cmd.arg("check-tools")
        .assert()
        .success()
        .stdout(predicate::str::contains("ffmpeg"))
        .stdout(predicate::str::contains("libreoffice"));
}

#[test]
fn test_cli_validate_config() {
    let dir = tempdir().unwrap();
    let config = write_config(
        dir.path(),
        r#"
[server]
port = 8080

[conversion]
max_timeout_secs = 60
"#,
    );

    let mut cmd = convertforge_cmd();
    cmd.arg("validate")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration is valid"))
        .stdout(predicate::str::contains("0.0.0.0:8080"))
        .stdout(predicate::str::contains("Timeout cap: 60s"));
}

#[test]
fn test_cli_validate_rejects_bad_config() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), "[server]\nport = 0\n");

    let mut cmd = convertforge_cmd();
    cmd.arg("validate")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("port cannot be 0"));
}

#[test]
fn test_cli_validate_rejects_unknown_tool() {
    let dir = tempdir().unwrap();
    let config = write_config(dir.path(), "[tools]\ngimp = \"/usr/bin/gimp\"\n");

    let mut cmd = convertforge_cmd();
    cmd.args(["-c"])
        .arg(&config)
        .arg("validate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to parse config file"));
}

#[test]
fn test_cli_convert_missing_input() {
    let mut cmd = convertforge_cmd();
    cmd.args(["convert", "/nonexistent/report.pdf", "--to", "txt"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not exist"));
}

#[test]
fn test_cli_convert_unsupported_pair() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("song.mp3");
    fs::write(&input, b"ID3").unwrap();

    let mut cmd = convertforge_cmd();
    cmd.arg("convert")
        .arg(&input)
        .args(["--to", "pdf"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unsupported_conversion"))
        .stderr(predicate::str::contains("Cannot convert .mp3 to PDF"));
}

#[cfg(unix)]
#[test]
fn test_cli_convert_with_configured_tool() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let script = dir.path().join("fake-pdftotext");
    fs::write(
        &script,
        "#!/bin/sh\nfor last; do :; done\nprintf 'extracted text' > \"$last\"\n",
    )
    .unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let config = write_config(
        dir.path(),
        &format!("[tools]\npdftotext = {:?}\n", script.display().to_string()),
    );
    let input = dir.path().join("statement.pdf");
    fs::write(&input, b"%PDF-1.4").unwrap();

    let mut cmd = convertforge_cmd();
    cmd.arg("-c")
        .arg(&config)
        .arg("convert")
        .arg(&input)
        .args(["-t", "TXT"])
        .assert()
        .success()
        .stdout(predicate::str::contains("statement.txt"));

    let written = fs::read_to_string(dir.path().join("statement.txt")).unwrap();
    assert_eq!(written, "extracted text");
    // The input is left alone.
    assert!(input.exists());
}

#[cfg(unix)]
#[test]
fn test_cli_convert_reports_tool_failure() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempdir().unwrap();
    let script = dir.path().join("fake-magick");
    fs::write(&script, "#!/bin/sh\necho 'magick: no decode delegate' >&2\nexit 1\n").unwrap();
    fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

    let config = write_config(
        dir.path(),
        &format!("[tools]\nmagick = {:?}\n", script.display().to_string()),
    );
    let input = dir.path().join("scan.bmp");
    fs::write(&input, b"BM").unwrap();
    let output = dir.path().join("out/scan.png");

    let mut cmd = convertforge_cmd();
    cmd.arg("-c")
        .arg(&config)
        .arg("convert")
        .arg(&input)
        .args(["-t", "png", "-o"])
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("process_non_zero_exit"))
        .stderr(predicate::str::contains("no decode delegate"));

    assert!(!output.exists());
}
