//! Report output over a history snapshot written the way the agent writes it.
use assert_cmd::Command;
use serde_json::json;

fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_millis() as i64
}

fn write_history(dir: &std::path::Path) {
    let now = now_ms();
    let recent = now - 10 * 60 * 1000;
    let stale = now - 48 * 60 * 60 * 1000;
    let snapshot = json!({
        "cpu": [
            {"timestamp": stale, "value": 99.0, "load1": 3.0, "load5": 2.0, "load15": 1.0},
            {"timestamp": recent, "value": 20.0, "load1": 0.1, "load5": 0.1, "load15": 0.1},
            {"timestamp": recent + 1, "value": 40.0, "load1": 0.1, "load5": 0.1, "load15": 0.1}
        ],
        "temperature": [
            {"timestamp": recent, "value": 50.0, "type": "cpu"},
            {"timestamp": recent, "value": 70.0, "type": "gpu"}
        ]
    });
    std::fs::write(
        dir.join("history.json"),
        serde_json::to_vec_pretty(&snapshot).unwrap(),
    )
    .unwrap();
}

fn report(dir: &std::path::Path, args: &[&str]) -> String {
    let out = Command::cargo_bin("hostwatch")
        .unwrap()
        .arg("--data-dir")
        .arg(dir)
        .args(args)
        .output()
        .unwrap();
    assert!(out.status.success());
    String::from_utf8_lossy(&out.stdout).into_owned()
}

#[test]
fn window_excludes_old_samples() {
    let dir = tempfile::tempdir().unwrap();
    write_history(dir.path());
    let text = report(dir.path(), &["-H", "1", "cpu"]);
    assert!(text.contains("CPU over 1h:"), "{text}");
    assert!(text.contains("max: 40.0%"), "{text}");
    assert!(text.contains("min: 20.0%"), "{text}");
    assert!(text.contains("avg: 30.0%"), "{text}");
    assert!(text.contains("points: 2"), "{text}");
}

#[test]
fn subtype_filter_and_missing_series() {
    let dir = tempfile::tempdir().unwrap();
    write_history(dir.path());
    let text = report(dir.path(), &["--subtype", "gpu", "temp", "disk"]);
    assert!(text.contains("TEMPERATURE over 24h:"), "{text}");
    assert!(text.contains("avg: 70.0°C"), "{text}");
    assert!(text.contains("DISK: no data for the last 24h"), "{text}");
    assert!(!text.contains("CPU"), "{text}");
}

#[test]
fn every_stored_point_counts_beyond_default_cap() {
    let dir = tempfile::tempdir().unwrap();
    let start = now_ms() - 60 * 60 * 1000;
    // older 2000 points hot, newest 1000 cool
    let cpu: Vec<_> = (0..3000i64)
        .map(|i| json!({"timestamp": start + i, "value": if i < 2000 { 90.0 } else { 10.0 }}))
        .collect();
    std::fs::write(
        dir.path().join("history.json"),
        serde_json::to_vec(&json!({ "cpu": cpu })).unwrap(),
    )
    .unwrap();
    let text = report(dir.path(), &["cpu"]);
    assert!(text.contains("points: 3000"), "{text}");
    assert!(text.contains("max: 90.0%"), "{text}");
    assert!(text.contains("min: 10.0%"), "{text}");
}

#[test]
fn empty_data_dir_reports_no_data() {
    let dir = tempfile::tempdir().unwrap();
    let text = report(dir.path(), &[]);
    for name in ["CPU", "MEMORY", "DISK", "TEMPERATURE", "NETWORK"] {
        assert!(
            text.contains(&format!("{name}: no data for the last 24h")),
            "{text}"
        );
    }
    // the report never creates a snapshot
    assert!(!dir.path().join("history.json").exists());
}
