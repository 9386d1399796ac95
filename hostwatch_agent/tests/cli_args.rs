//! CLI arg handling for hostwatch_agent (daemon)
use assert_cmd::Command;

fn run(args: &[&str]) -> (Option<i32>, String) {
    let out = Command::cargo_bin("hostwatch_agent")
        .expect("agent binary")
        .args(args)
        .env_remove("HOSTWATCH_TELEGRAM_TOKEN")
        .output()
        .expect("run hostwatch_agent");
    let text = format!(
        "{}{}",
        String::from_utf8_lossy(&out.stdout),
        String::from_utf8_lossy(&out.stderr)
    );
    (out.status.code(), text)
}

#[test]
fn help_mentions_short_and_long_flags() {
    let (code, text) = run(&["--help"]);
    assert_eq!(code, Some(0));
    for flag in ["--config", "-c", "--data-dir", "-d", "--interface", "-i"] {
        assert!(text.contains(flag), "help text missing {flag}\n{text}");
    }
}

#[test]
fn flags_before_help_are_accepted() {
    let (code, text) = run(&["-d", "/tmp/hostwatch-test", "--interface=eth0", "--help"]);
    assert_eq!(code, Some(0));
    assert!(text.contains("Usage:"));
}

#[test]
fn unknown_flag_is_a_usage_error() {
    let (code, text) = run(&["--port", "3000"]);
    assert_eq!(code, Some(2));
    assert!(text.contains("Unexpected argument"), "{text}");
}

#[test]
fn missing_explicit_config_fails_fast() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.json");
    let (code, text) = run(&["--config", missing.to_str().unwrap()]);
    assert_ne!(code, Some(0));
    assert!(text.contains("nope.json"), "{text}");
}

#[test]
fn malformed_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let cfg = dir.path().join("agent.json");
    std::fs::write(&cfg, r#"{"check_interval_secs": "soon"}"#).unwrap();
    let (code, text) = run(&["-c", cfg.to_str().unwrap()]);
    assert_ne!(code, Some(0));
    assert!(text.contains("parsing"), "{text}");
}
