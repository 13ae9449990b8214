//! Tests for the capture configuration surface.
//!
//! Validates serde round-trips, per-field defaults, and the builder
//! helpers.

use ringtail::{CaptureConfig, DEFAULT_MAX_SIZE};
use std::path::PathBuf;

// =============================================================================
// Defaults
// =============================================================================

#[test]
fn test_minimal_json_gets_defaults() {
    let config: CaptureConfig = serde_json::from_str(r#"{"path": "/var/log/app.ring"}"#).unwrap();

    assert_eq!(config.path, PathBuf::from("/var/log/app.ring"));
    assert_eq!(config.max_size, DEFAULT_MAX_SIZE);
    assert!(!config.include_stderr);
}

#[test]
fn test_explicit_fields_override_defaults() {
    let config: CaptureConfig = serde_json::from_str(
        r#"{"path": "/tmp/out.ring", "max_size": 1048576, "include_stderr": true}"#,
    )
    .unwrap();

    assert_eq!(config.max_size, 1048576);
    assert!(config.include_stderr);
}

#[test]
fn test_missing_path_is_rejected() {
    let result: Result<CaptureConfig, _> = serde_json::from_str(r#"{"max_size": 8192}"#);
    assert!(result.is_err(), "path is mandatory");
}

// =============================================================================
// Round Trip
// =============================================================================

#[test]
fn test_serde_round_trip() {
    let config = CaptureConfig::new("/var/log/app.ring")
        .with_max_size(1 << 20)
        .with_stderr(true);

    let json = serde_json::to_string(&config).unwrap();
    let back: CaptureConfig = serde_json::from_str(&json).unwrap();

    assert_eq!(back.path, config.path);
    assert_eq!(back.max_size, config.max_size);
    assert_eq!(back.include_stderr, config.include_stderr);
}

// =============================================================================
// Builders
// =============================================================================

#[test]
fn test_builder_defaults_match_serde_defaults() {
    let built = CaptureConfig::new("/tmp/x.ring");
    let parsed: CaptureConfig = serde_json::from_str(r#"{"path": "/tmp/x.ring"}"#).unwrap();

    assert_eq!(built.max_size, parsed.max_size);
    assert_eq!(built.include_stderr, parsed.include_stderr);
}
