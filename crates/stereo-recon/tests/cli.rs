#![cfg(feature = "cli")]

use assert_cmd::Command;
use predicates::prelude::*;

fn bin() -> Command {
    Command::cargo_bin("stereo-recon").expect("binary built")
}

#[test]
fn help_lists_every_stage() {
    bin()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("calibrate"))
        .stdout(predicate::str::contains("rectify"))
        .stdout(predicate::str::contains("dense"))
        .stdout(predicate::str::contains("sparse"));
}

#[test]
fn calibrating_an_empty_directory_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("calibration.json");
    bin()
        .arg("calibrate")
        .arg(dir.path())
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no valid calibration pairs"));
    assert!(!out.exists());
}

#[test]
fn undecodable_capture_is_skipped() {
    let dir = tempfile::tempdir().expect("tempdir");
    std::fs::write(dir.path().join("broken.png"), b"not a png").expect("write");
    let out = dir.path().join("calibration.json");
    bin()
        .arg("calibrate")
        .arg(dir.path())
        .arg(&out)
        .assert()
        .failure()
        .stderr(predicate::str::contains("broken.png"))
        .stderr(predicate::str::contains("no valid calibration pairs"));
}

#[test]
fn unreadable_config_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    bin()
        .args(["sparse", "in.png", "calib.json", "out.txt", "--config"])
        .arg(dir.path().join("missing.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.json"));
}
