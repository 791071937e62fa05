use std::fs;
use std::path::{Path, PathBuf};

use assert_fs::TempDir;
use assert_fs::prelude::*;
use clap::Parser;
use predicates::prelude::*;
use scour::cli::Cli;
use scour::commands;
use scour::error::{Result, ScrubError};
use scour::hashing::ChecksumAlgo;
use scour::store::MetaDb;

/// Helper to create a scrub target with a couple of files.
fn setup_data_dir(temp_dir: &TempDir) -> PathBuf {
    let data = temp_dir.path().join("data");
    fs::create_dir(&data).unwrap();
    fs::write(data.join("alpha.txt"), "alpha contents").unwrap();
    fs::write(data.join("beta.log"), "beta contents").unwrap();
    // canonicalized so record lookups match what the walker stores
    data.canonicalize().unwrap()
}

fn write_config(temp_dir: &TempDir, name: &str, body: &str) -> PathBuf {
    let path = temp_dir.path().join(name);
    fs::write(&path, body).unwrap();
    path
}

fn base_config(temp_dir: &TempDir, data: &Path) -> PathBuf {
    write_config(
        temp_dir,
        "scour.yaml",
        &format!(
            "storage:\n  path: \"{}\"\n  metadata:\n    db: \"{}\"\n",
            data.display(),
            temp_dir.path().join("meta.db").display()
        ),
    )
}

/// Helper to execute a command through the CLI parser, like the binary does.
fn execute_command(args: &[&str]) -> Result<()> {
    let owned: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
    commands::execute(&Cli::parse_from(owned))
}

fn open_store(temp_dir: &TempDir) -> MetaDb {
    MetaDb::open(
        &temp_dir.path().join("meta.db"),
        &temp_dir.path().join("meta.db.check"),
        ChecksumAlgo::Sha256,
        false,
    )
    .unwrap()
}

#[test]
fn test_scrub_creates_store_and_sidecar() {
    let temp_dir = TempDir::new().unwrap();
    let data = setup_data_dir(&temp_dir);
    let config = base_config(&temp_dir, &data);

    execute_command(&["scour", "-c", config.to_str().unwrap(), "scrub"]).unwrap();

    temp_dir.child("meta.db").assert(predicate::path::exists());
    temp_dir
        .child("meta.db.check")
        .assert(predicate::path::exists());

    let db = open_store(&temp_dir);
    let records = db.list_paths().unwrap();
    assert_eq!(records.len(), 2);
    for record in &records {
        assert!(record.clean, "{} should be clean", record.path.display());
        assert!(record.checksum.is_some());
        assert!(record.last_scrub.is_some());
    }
    db.close().unwrap();
}

#[test]
fn test_repeated_scrubs_converge() {
    let temp_dir = TempDir::new().unwrap();
    let data = setup_data_dir(&temp_dir);
    let config = base_config(&temp_dir, &data);
    let config = config.to_str().unwrap();

    execute_command(&["scour", "-c", config, "scrub"]).unwrap();

    let db = open_store(&temp_dir);
    let before = db.list_paths().unwrap();
    db.close().unwrap();

    execute_command(&["scour", "-c", config, "scrub"]).unwrap();

    let db = open_store(&temp_dir);
    let after = db.list_paths().unwrap();
    assert_eq!(before.len(), after.len());
    for (b, a) in before.iter().zip(after.iter()) {
        assert_eq!(b.path, a.path);
        assert_eq!(b.checksum, a.checksum, "unchanged files keep their checksum");
        assert!(a.clean);
        assert_eq!(a.generation, b.generation + 1);
    }
    db.close().unwrap();
}

#[test]
fn test_config_filter_excludes_paths() {
    let temp_dir = TempDir::new().unwrap();
    let data = setup_data_dir(&temp_dir);
    let config = write_config(
        &temp_dir,
        "scour.yaml",
        &format!(
            "storage:\n  path: \"{}\"\n  filter:\n    - \"-\\\\.log$\"\n  metadata:\n    db: \"{}\"\n",
            data.display(),
            temp_dir.path().join("meta.db").display()
        ),
    );

    execute_command(&["scour", "-c", config.to_str().unwrap(), "scrub"]).unwrap();

    let db = open_store(&temp_dir);
    let records = db.list_paths().unwrap();
    assert_eq!(records.len(), 1);
    assert!(records[0].path.ends_with("alpha.txt"));
    db.close().unwrap();
}

#[test]
fn test_scan_only_records_without_hashing() {
    let temp_dir = TempDir::new().unwrap();
    let data = setup_data_dir(&temp_dir);
    let config = base_config(&temp_dir, &data);

    execute_command(&[
        "scour",
        "-c",
        config.to_str().unwrap(),
        "scrub",
        "--scan-only",
    ])
    .unwrap();

    let db = open_store(&temp_dir);
    for record in db.list_paths().unwrap() {
        assert!(!record.clean);
        assert!(record.checksum.is_none());
    }
    db.close().unwrap();
}

#[test]
fn test_extra_paths_extend_the_roots() {
    let temp_dir = TempDir::new().unwrap();
    let data = setup_data_dir(&temp_dir);
    let config = base_config(&temp_dir, &data);

    let extra = temp_dir.path().join("extra");
    fs::create_dir(&extra).unwrap();
    fs::write(extra.join("gamma"), "gamma contents").unwrap();

    execute_command(&[
        "scour",
        "-c",
        config.to_str().unwrap(),
        "scrub",
        "--extra-paths",
        extra.to_str().unwrap(),
    ])
    .unwrap();

    let db = open_store(&temp_dir);
    let records = db.list_paths().unwrap();
    assert_eq!(records.len(), 3);
    assert!(records.iter().any(|r| r.path.ends_with("gamma")));
    db.close().unwrap();
}

#[test]
fn test_later_config_overrides_earlier() {
    let temp_dir = TempDir::new().unwrap();
    let data = setup_data_dir(&temp_dir);
    let base = base_config(&temp_dir, &data);
    let site = write_config(&temp_dir, "site.yaml", "operation:\n  checksum: sha512\n");

    execute_command(&[
        "scour",
        "-c",
        base.to_str().unwrap(),
        "-c",
        site.to_str().unwrap(),
        "scrub",
    ])
    .unwrap();

    let db = open_store(&temp_dir);
    for record in db.list_paths().unwrap() {
        assert_eq!(record.checksum.unwrap().len(), 64, "sha512 digests are 64 bytes");
    }
    db.close().unwrap();
}

#[test]
fn test_missing_db_setting_is_a_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let data = setup_data_dir(&temp_dir);
    let config = write_config(
        &temp_dir,
        "scour.yaml",
        &format!("storage:\n  path: \"{}\"\n", data.display()),
    );

    let result = execute_command(&["scour", "-c", config.to_str().unwrap(), "scrub"]);
    assert!(matches!(result, Err(ScrubError::Config { .. })));
}

#[test]
fn test_corrupted_store_fails_the_integrity_check() {
    let temp_dir = TempDir::new().unwrap();
    let data = setup_data_dir(&temp_dir);
    let config = base_config(&temp_dir, &data);
    let config = config.to_str().unwrap();

    execute_command(&["scour", "-c", config, "scrub"]).unwrap();

    // grow the database behind the sidecar's back
    let db_path = temp_dir.path().join("meta.db");
    let mut bytes = fs::read(&db_path).unwrap();
    bytes.extend_from_slice(b"tail corruption");
    fs::write(&db_path, bytes).unwrap();

    let result = execute_command(&["scour", "-c", config, "scrub"]);
    assert!(matches!(
        result,
        Err(ScrubError::IntegrityCheckFailed { .. })
    ));
}

#[test]
fn test_status_lists_recorded_paths() {
    let temp_dir = TempDir::new().unwrap();
    let data = setup_data_dir(&temp_dir);
    let config = base_config(&temp_dir, &data);
    let config = config.to_str().unwrap();

    execute_command(&["scour", "-c", config, "scrub"]).unwrap();

    // plain, verbose and filtered listings all succeed against a live store
    execute_command(&["scour", "-c", config, "status"]).unwrap();
    execute_command(&["scour", "-c", config, "status", "-v"]).unwrap();
    execute_command(&["scour", "-c", config, "status", "-c"]).unwrap();
    execute_command(&["scour", "-c", config, "status", "-d", "-u"]).unwrap();
}

#[test]
fn test_status_requires_a_valid_store() {
    let temp_dir = TempDir::new().unwrap();
    let config = write_config(&temp_dir, "scour.yaml", "storage:\n  path: /data\n");

    let result = execute_command(&["scour", "-c", config.to_str().unwrap(), "status"]);
    assert!(matches!(result, Err(ScrubError::Config { .. })));
}
