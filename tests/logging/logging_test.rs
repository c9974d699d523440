//! Tests for `src/logging.rs`.

use entity_extraction::logging::{init_cli, init_production, LoggingGuard, LOG_FILE_PREFIX};

#[test]
fn logging_guard_is_send() {
    fn assert_send<T: Send>() {}
    assert_send::<LoggingGuard>();
}

#[test]
fn init_production_creates_logs_dir() {
    let tmp = tempfile::tempdir().expect("should create temp dir");
    let logs_dir = tmp.path().join("logs");
    assert!(!logs_dir.exists());

    // Only one global subscriber per process; a second install errors
    // after the directory has been created.
    let _result = init_production(&logs_dir);
    assert!(logs_dir.exists(), "logs directory should be created");
}

#[test]
fn init_cli_twice_is_harmless() {
    init_cli("warn");
    init_cli("debug");
}

#[test]
fn log_file_prefix_names_the_crate() {
    assert!(LOG_FILE_PREFIX.starts_with("entity-extraction"));
}
