use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Write a memory-provider settings file into `dir` and return its path.
fn write_settings(dir: &Path) -> PathBuf {
    let tmp_dir = dir.join("tmp");
    let settings_path = dir.join("settings.json");
    let contents = format!(
        r#"{{"provider": "memory", "root": "storage", "tmp": {:?}}}"#,
        tmp_dir
    );
    fs::write(&settings_path, contents).unwrap();
    settings_path
}

#[test]
fn test_cli_version() {
    let mut cmd = Command::cargo_bin("depot").unwrap();
    cmd.arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("depot"));
}

#[test]
fn test_cli_help() {
    let mut cmd = Command::cargo_bin("depot").unwrap();
    cmd.arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Provider-backed remote file storage"));
}

#[test]
fn test_mkdir_prints_remote_path() {
    let temp_dir = TempDir::new().unwrap();
    let settings = write_settings(temp_dir.path());

    let mut cmd = Command::cargo_bin("depot").unwrap();
    cmd.arg("--settings")
        .arg(&settings)
        .arg("mkdir")
        .arg("myfolder")
        .assert()
        .success()
        .stdout(predicate::str::contains("/storage/myfolder"));
}

#[test]
fn test_store_small_file_prints_destination() {
    let temp_dir = TempDir::new().unwrap();
    let settings = write_settings(temp_dir.path());
    let input_file = temp_dir.path().join("hello.txt");
    fs::write(&input_file, "Test content").unwrap();

    let mut cmd = Command::cargo_bin("depot").unwrap();
    cmd.arg("--settings")
        .arg(&settings)
        .arg("store")
        .arg(&input_file)
        .assert()
        .success()
        .stdout(predicate::str::contains("/storage/hello.txt"));
}

#[test]
fn test_store_into_folder() {
    let temp_dir = TempDir::new().unwrap();
    let settings = write_settings(temp_dir.path());
    let input_file = temp_dir.path().join("hello.txt");
    fs::write(&input_file, "Test content").unwrap();

    let mut cmd = Command::cargo_bin("depot").unwrap();
    cmd.arg("--settings")
        .arg(&settings)
        .arg("store")
        .arg(&input_file)
        .arg("--folder")
        .arg("docs")
        .assert()
        .success()
        .stdout(predicate::str::contains("/storage/docs/hello.txt"));
}

#[test]
fn test_clean_empties_tmp_dir() {
    let temp_dir = TempDir::new().unwrap();
    let settings = write_settings(temp_dir.path());

    let tmp_dir = temp_dir.path().join("tmp");
    fs::create_dir_all(&tmp_dir).unwrap();
    fs::write(tmp_dir.join("stale.bin"), "leftover").unwrap();

    let mut cmd = Command::cargo_bin("depot").unwrap();
    cmd.arg("--settings")
        .arg(&settings)
        .arg("clean")
        .assert()
        .success();

    assert!(tmp_dir.exists());
    assert_eq!(fs::read_dir(&tmp_dir).unwrap().count(), 0);
}

#[test]
fn test_config_init_show_and_path() {
    let temp_dir = TempDir::new().unwrap();
    let settings = temp_dir.path().join("settings.json");

    // Init writes a template
    let mut cmd = Command::cargo_bin("depot").unwrap();
    cmd.arg("--settings")
        .arg(&settings)
        .arg("config")
        .arg("--init")
        .assert()
        .success();

    assert!(settings.exists());
    let contents = fs::read_to_string(&settings).unwrap();
    assert!(contents.contains("provider"));

    // Show prints the parsed settings
    let mut cmd = Command::cargo_bin("depot").unwrap();
    cmd.arg("--settings")
        .arg(&settings)
        .arg("config")
        .arg("--show")
        .assert()
        .success()
        .stdout(predicate::str::contains("my-bucket"));

    // Path prints the settings location
    let mut cmd = Command::cargo_bin("depot").unwrap();
    cmd.arg("--settings")
        .arg(&settings)
        .arg("config")
        .arg("--path")
        .assert()
        .success()
        .stdout(predicate::str::contains("settings.json"));
}

#[test]
fn test_wipe_requires_confirmation() {
    let temp_dir = TempDir::new().unwrap();
    let settings = write_settings(temp_dir.path());

    let mut cmd = Command::cargo_bin("depot").unwrap();
    cmd.arg("--settings")
        .arg(&settings)
        .arg("wipe")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--yes"));
}

#[test]
fn test_wipe_with_confirmation_reaches_backend() {
    let temp_dir = TempDir::new().unwrap();
    let settings = write_settings(temp_dir.path());

    // Each invocation gets a fresh memory backend, so the root holds
    // nothing and the backend reports it missing. The point is that
    // --yes gets past the confirmation guard and out to the backend.
    let mut cmd = Command::cargo_bin("depot").unwrap();
    cmd.arg("--settings")
        .arg(&settings)
        .arg("wipe")
        .arg("--yes")
        .assert()
        .failure()
        .code(4)
        .stderr(predicate::str::contains("not found"));
}
