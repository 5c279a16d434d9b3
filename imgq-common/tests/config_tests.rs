//! Unit tests for bootstrap configuration loading
//!
//! Tests cover:
//! - Explicit config file loading
//! - Explicit-but-missing file is an error
//! - Partial files fall through to defaults

use imgq_common::config::TomlConfig;
use imgq_common::{Error, Mode};
use std::io::Write;
use tempfile::NamedTempFile;

#[test]
fn test_load_explicit_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "mode = \"multi_user\"\nseed_path = \"seed.json\"").unwrap();

    let config = TomlConfig::load_or_default(Some(file.path())).unwrap();

    assert_eq!(config.mode, Some(Mode::MultiUser));
    assert_eq!(config.seed_path.unwrap().to_string_lossy(), "seed.json");
    assert!(config.bind_addr.is_none());
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_explicit_missing_file_is_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope.toml");

    let err = TomlConfig::load_or_default(Some(&missing)).unwrap_err();

    assert!(matches!(err, Error::Config(_)));
}

#[test]
fn test_unknown_mode_is_rejected() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "mode = \"round_robin\"").unwrap();

    assert!(TomlConfig::load(file.path()).is_err());
}
