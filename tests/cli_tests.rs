//! Command-line behavior of the `board-loadtest` binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("board-loadtest").unwrap();
    cmd.env_remove("BOARD_LOADTEST_URL").env("RUST_LOG", "error");
    cmd
}

#[test]
fn help_lists_subcommands() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("run"))
        .stdout(predicate::str::contains("init"));
}

#[test]
fn init_writes_config_and_refuses_overwrite() {
    let dir = tempfile::tempdir().unwrap();

    cli()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .success()
        .stderr(predicate::str::contains("Created"));

    let content = std::fs::read_to_string(dir.path().join(".loadtest/loadtest.toml")).unwrap();
    assert!(content.contains("constant_load"));

    cli()
        .current_dir(dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    cli()
        .current_dir(dir.path())
        .args(["init", "--force"])
        .assert()
        .success();
}

#[test]
fn run_rejects_missing_config_file() {
    let dir = tempfile::tempdir().unwrap();
    cli()
        .current_dir(dir.path())
        .args(["run", "--config", "nope.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Config file not found"));
}

#[test]
fn run_rejects_invalid_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(
        &path,
        r#"
[settings]
write_ratio = 3.0

[[scenario]]
name = "a"
executor = "constant-vus"
vus = 1
duration_secs = 1
"#,
    )
    .unwrap();

    cli()
        .current_dir(dir.path())
        .args(["run", "--no-report", "--config"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("write_ratio"));
}

#[test]
fn run_rejects_unknown_driver() {
    cli()
        .args(["run", "--driver", "sideways"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("sideways"));
}

#[test]
fn run_against_unreachable_server_fails_thresholds() {
    let dir = tempfile::tempdir().unwrap();
    cli()
        .current_dir(dir.path())
        .args([
            "run",
            "--url",
            "http://127.0.0.1:1",
            "--vus",
            "1",
            "--duration",
            "1",
            "--no-report",
            "--no-color",
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("http_req_failed"))
        .stderr(predicate::str::contains("thresholds failed"));

    assert!(!dir.path().join(".loadtest").exists());
}
