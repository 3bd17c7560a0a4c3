//! Config loading, error messages and per-host resolution.

use assert_fs::prelude::*;
use meshsync_core::{config, ChecksumId, CoreError};
use predicates::prelude::predicate;
use std::time::Duration;

const VALID: &str = r#"
connection:
  hostname: broker.lan
hosts:
  alpha:
    "remote:shared":
      path: /srv/shared
  beta:
    "remote:shared":
      path: /home/bob/shared
      debounce: 250
"#;

// ---------------------------------------------------------------------------
// 1. Load errors
// ---------------------------------------------------------------------------

#[test]
fn load_missing_config_returns_not_found() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let path = dir.path().join("config.yaml");
    let err = config::load_at(&path).unwrap_err();
    assert!(matches!(err, CoreError::ConfigNotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str(": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = config::load_at(file.path()).unwrap_err();
    assert!(matches!(err, CoreError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("config.yaml"));
}

#[test]
fn relative_folder_path_is_rejected() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str(
        "connection:\n  hostname: broker\nhosts:\n  alpha:\n    \"remote:x\":\n      path: relative/dir\n",
    )
    .expect("write");

    let err = config::load_at(file.path()).unwrap_err();
    assert!(matches!(err, CoreError::Invalid(_)), "got: {err}");
    assert!(err.to_string().contains("not absolute"));
}

#[test]
fn empty_hosts_is_rejected() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str("connection:\n  hostname: broker\nhosts: {}\n")
        .expect("write");

    let err = config::load_at(file.path()).unwrap_err();
    assert!(err.to_string().contains("no hosts configured"));
}

// ---------------------------------------------------------------------------
// 2. Resolution
// ---------------------------------------------------------------------------

#[test]
fn every_host_derives_the_same_checksum_for_a_shared_remote() {
    let dir = assert_fs::TempDir::new().expect("tempdir");
    let file = dir.child("config.yaml");
    file.write_str(VALID).expect("write");
    file.assert(predicate::str::contains("remote:shared"));

    let config = config::load_at(file.path()).expect("load");
    let alpha = config.folders_for("alpha").expect("alpha");
    let beta = config.folders_for("beta").expect("beta");

    assert_eq!(alpha[0].checksum, beta[0].checksum);
    assert_eq!(alpha[0].checksum, ChecksumId::from_remote("remote:shared"));
    assert_ne!(alpha[0].local, beta[0].local);
    assert_eq!(alpha[0].debounce, Duration::from_millis(3000));
    assert_eq!(beta[0].debounce, Duration::from_millis(250));
}
