//! CLI arg parsing tests for hostwatch (report)
use std::process::Command;

#[test]
fn test_help_mentions_short_and_long_flags() {
    let output = Command::new(env!("CARGO_BIN_EXE_hostwatch"))
        .arg("--help")
        .output()
        .expect("run hostwatch --help");
    assert!(output.status.success());
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&output.stdout),
        String::from_utf8_lossy(&output.stderr)
    );
    for flag in ["--data-dir", "-d", "--hours", "-H", "--subtype", "-s"] {
        assert!(text.contains(flag), "help text missing {flag}\n{text}");
    }
}

#[test]
fn test_flags_before_help_are_accepted() {
    let exe = env!("CARGO_BIN_EXE_hostwatch");
    let out = Command::new(exe)
        .args(["--hours", "6", "-s", "cpu", "temperature", "--help"])
        .output()
        .expect("run hostwatch");
    assert!(out.status.success(), "hostwatch --hours 6 … --help did not succeed");
    assert!(String::from_utf8_lossy(&out.stdout).contains("Usage:"));
}

#[test]
fn test_unknown_series_is_usage_error() {
    let out = Command::new(env!("CARGO_BIN_EXE_hostwatch"))
        .arg("swap")
        .output()
        .expect("run hostwatch");
    assert_eq!(out.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&out.stderr).contains("Unknown series 'swap'"));
}
