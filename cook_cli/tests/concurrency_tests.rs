//! Concurrency tests for cookalong.
//!
//! Several cooks finishing at once must not lose or interleave records in
//! the shared preparation log (file locking).

use assert_cmd::Command;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tempfile::TempDir;

fn cli(data_dir: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("cookalong"));
    cmd.env("XDG_CONFIG_HOME", data_dir.join("config"))
        .arg("--data-dir")
        .arg(data_dir);
    cmd
}

fn setup_test_dir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

#[test]
fn test_concurrent_sessions_are_all_logged() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    let handles: Vec<_> = (0..5)
        .map(|i| {
            let data_dir = data_dir.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(i * 5));
                cli(&data_dir)
                    .args(["cook", "masala_chai", "--lang", "none", "--auto-complete"])
                    .arg("--name")
                    .arg(format!("Cook {}", i))
                    .assert()
                    .success();
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Cook thread panicked");
    }

    let log_path = data_dir.join("logs/preparations.jsonl");
    let content = std::fs::read_to_string(&log_path).expect("Failed to read log");

    // Every line is a complete record: one start and one finish per session
    let mut started = 0;
    let mut finished = 0;
    for line in content.lines() {
        let value: serde_json::Value = serde_json::from_str(line).expect("Corrupted log line");
        match value["event"].as_str() {
            Some("started") => started += 1,
            Some("finished") => finished += 1,
            other => panic!("Unexpected event {:?}", other),
        }
    }
    assert_eq!(started, 5);
    assert_eq!(finished, 5);
}

#[test]
fn test_reads_while_writing() {
    let temp_dir = setup_test_dir();
    let data_dir = temp_dir.path().to_path_buf();

    let writer_dir = data_dir.clone();
    let writer = thread::spawn(move || {
        for _ in 0..3 {
            cli(&writer_dir)
                .args(["cook", "poha", "--name", "Asha", "--lang", "none", "--auto-complete"])
                .assert()
                .success();
        }
    });

    for _ in 0..3 {
        thread::sleep(Duration::from_millis(10));
        cli(&data_dir).arg("logs").assert().success();
    }

    writer.join().expect("Writer thread panicked");

    cli(&data_dir)
        .args(["logs", "summary", "--user", "Asha", "--recipe", "poha"])
        .assert()
        .success()
        .stdout(predicates::str::contains("3 times"));
}
