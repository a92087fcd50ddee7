use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_config(dir: &tempfile::TempDir, extra: &str) -> PathBuf {
    let toml = format!(
        r#"
[simulation]
step_hz = 100000
slip_every_cycles = 2

{extra}
"#
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn last_json_line(stdout: &[u8]) -> serde_json::Value {
    let text = String::from_utf8_lossy(stdout);
    let line = text
        .lines()
        .rev()
        .find(|l| l.trim_start().starts_with('{'))
        .unwrap_or_else(|| panic!("no JSON line; stdout was: {text}"));
    serde_json::from_str(line).expect("valid JSON")
}

/// Summary of a short simulated run.
#[rstest]
fn run_summary_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    let out = Command::cargo_bin("sorter_cli")
        .unwrap()
        .arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("run")
        .arg("--sim")
        .arg("--cycles")
        .arg("6")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v = last_json_line(&out);

    assert!(v["timestamp"].as_u64().is_some());
    assert_eq!(v["backend"], "sim");
    assert_eq!(v["interrupted"], false);
    assert_eq!(v["cycles"], 6);
    assert!(v["ticks"].as_u64().unwrap() >= 4 * 200);
    assert_eq!(v["per_outlet"].as_array().unwrap().len(), 6);
    for key in [
        "objects",
        "drift_events",
        "zero_crossings",
        "dropped_events",
        "sensor_faults",
        "actuator_faults",
        "max_service_us",
        "mean_service_us",
    ] {
        assert!(v[key].as_u64().is_some(), "{key} should be a number");
    }
    // Slip every second cycle: at least one index pulse had to realign the count.
    assert!(v["drift_events"].as_u64().unwrap() >= 1);
}

#[rstest]
fn show_config_json_lists_outlets() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[queue]\nlength = 20\n");

    let out = Command::cargo_bin("sorter_cli")
        .unwrap()
        .arg("--json")
        .arg("--config")
        .arg(&cfg)
        .arg("show-config")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v = last_json_line(&out);
    assert_eq!(v["queue_length"], 20);
    assert_eq!(v["outlet_source"], "defaults");
    let outlets = v["outlets"].as_array().unwrap();
    assert_eq!(outlets.len(), 6);
    assert_eq!(outlets[0]["offset"], 1);
    assert_eq!(outlets[5]["offset"], 16);
}

#[rstest]
fn config_error_as_json() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[phases]\nscan_start = 0\noutlet_reset = 0\n");

    let out = Command::cargo_bin("sorter_cli")
        .unwrap()
        .arg("--json")
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .assert()
        .code(3)
        .get_output()
        .stdout
        .clone();
    let v = last_json_line(&out);
    assert_eq!(v["reason"], "Config");
    assert_eq!(v["exit_code"], 3);
    assert!(v["message"].as_str().unwrap().contains("must differ"));
}
