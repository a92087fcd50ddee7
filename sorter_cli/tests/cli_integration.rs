use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Fast simulated line with the default outlet table.
fn write_valid_config(dir: &tempfile::TempDir) -> PathBuf {
    let toml = r#"
[encoder]
steps_per_cycle = 200

[phases]
scan_start = 0
outlet_reset = 100
diameter_finalize = 150
outlet_commit = 180

[scanner]
weights = [1.0, 1.05, 1.1, 1.2]
min_valid_width = 4
units_per_mm = 2

[queue]
length = 19

[simulation]
step_hz = 100000
spear_min_mm = 10
spear_max_mm = 26
seed = 3
"#;
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["run", "--sim", "--cycles", "3"], 0, "Sorting complete after 3 cycles", "stdout")]
#[case(&["run", "--cycles", "many"], 2, "invalid value", "stderr")]
#[case(&["show-config"], 0, "outlets (defaults):", "stdout")]
#[case(&["self-check"], 0, "self-check ok", "stdout")]
#[case(&["save-outlets"], 3, "no store path", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let mut cmd = Command::cargo_bin("sorter_cli").unwrap();
    cmd.arg("--config").arg(&cfg).arg("--log-level").arg("error");
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    match stream {
        "stdout" => {
            assert.stdout(predicate::str::contains(needle));
        }
        "stderr" => {
            assert.stderr(predicate::str::contains(needle));
        }
        other => panic!("unknown stream: {other}"),
    }
}

#[rstest]
fn invalid_config_exits_with_config_code() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("bad.toml");
    fs::write(&cfg, "[queue]\nlength = 1\n").unwrap();

    Command::cargo_bin("sorter_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("show-config")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Invalid configuration"))
        .stderr(predicate::str::contains("queue.length"));
}

#[rstest]
fn outlet_offset_beyond_queue_is_rejected() {
    let dir = tempdir().unwrap();
    let cfg = dir.path().join("cfg.toml");
    fs::write(
        &cfg,
        "[queue]\nlength = 5\n\n[[outlets]]\nmin_mm = 0\nmax_mm = 255\noffset = 1\n\n[[outlets]]\nmin_mm = 10\nmax_mm = 20\noffset = 6\n",
    )
    .unwrap();

    Command::cargo_bin("sorter_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("run")
        .arg("--cycles")
        .arg("1")
        .assert()
        .code(3);
}

#[rstest]
fn cli_reports_bad_weights_header() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let bad_csv = dir.path().join("weights.csv");
    let mut f = fs::File::create(&bad_csv).unwrap();
    writeln!(f, "sensor,factor").unwrap();
    writeln!(f, "0,1.0").unwrap();

    Command::cargo_bin("sorter_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--weights")
        .arg(&bad_csv)
        .arg("self-check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid headers"));
}

#[rstest]
fn weights_csv_replaces_configured_weights() {
    let dir = tempdir().unwrap();
    let cfg = write_valid_config(&dir);

    let csv = dir.path().join("weights.csv");
    fs::write(&csv, "channel,weight\n1,1.0\n0,1.0\n2,1.0\n").unwrap();

    Command::cargo_bin("sorter_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--weights")
        .arg(&csv)
        .arg("show-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("weights=[1.0, 1.0, 1.0]"));
}

#[rstest]
fn saved_outlets_are_picked_up_from_the_store() {
    let dir = tempdir().unwrap();
    let store = dir.path().join("outlets.bin");
    let cfg = dir.path().join("cfg.toml");
    fs::write(
        &cfg,
        format!("[store]\npath = {:?}\n", store.display().to_string()),
    )
    .unwrap();

    Command::cargo_bin("sorter_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("save-outlets")
        .assert()
        .success()
        .stdout(predicate::str::contains("saved 6 outlets (defaults)"));

    assert_eq!(&fs::read(&store).unwrap()[..2], &[0xA5u8, 6]);

    Command::cargo_bin("sorter_cli")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("show-config")
        .assert()
        .success()
        .stdout(predicate::str::contains("outlets (store):"));
}
