//! Tests for error types.
//!
//! Validates display formatting and error category coverage.

use ringtail::Error;
use std::io;
use std::path::PathBuf;

fn io_error(message: &str) -> io::Error {
    io::Error::other(message.to_string())
}

// =============================================================================
// Lifecycle Error Tests
// =============================================================================

#[test]
fn test_already_initialized_display() {
    let msg = format!("{}", Error::AlreadyInitialized);
    assert!(msg.contains("already initialized"));
}

#[test]
fn test_terminated_display() {
    let msg = format!("{}", Error::Terminated);
    assert!(msg.contains("terminated"));
}

#[test]
fn test_file_closed_display() {
    let msg = format!("{}", Error::FileClosed);
    assert!(msg.contains("closed"));
}

// =============================================================================
// Backing File Error Tests
// =============================================================================

#[test]
fn test_open_display_includes_path() {
    let err = Error::Open {
        path: PathBuf::from("/var/log/app.ring"),
        source: io_error("permission denied"),
    };
    let msg = format!("{}", err);

    assert!(msg.contains("/var/log/app.ring"), "should include the path");
    assert!(msg.contains("permission denied"), "should include the cause");
}

#[test]
fn test_truncate_display_includes_cause() {
    let err = Error::Truncate {
        source: io_error("operation not supported"),
    };
    let msg = format!("{}", err);

    assert!(msg.contains("truncate"));
    assert!(msg.contains("operation not supported"));
}

#[test]
fn test_write_and_flush_displays() {
    let write = format!("{}", Error::Write { source: io_error("disk full") });
    assert!(write.contains("write"));
    assert!(write.contains("disk full"));

    let flush = format!("{}", Error::Flush { source: io_error("io error") });
    assert!(flush.contains("flush"));
}

// =============================================================================
// Wiring Error Tests
// =============================================================================

#[test]
fn test_redirect_display_names_stream() {
    let err = Error::Redirect {
        stream: "stderr",
        source: io_error("bad file descriptor"),
    };
    let msg = format!("{}", err);

    assert!(msg.contains("stderr"), "should name the stream");
}

#[test]
fn test_control_protocol_display_includes_reason() {
    let err = Error::ControlProtocol {
        reason: "wake byte without a queued event".to_string(),
    };
    let msg = format!("{}", err);

    assert!(msg.contains("framing"));
    assert!(msg.contains("wake byte without a queued event"));
}

#[test]
fn test_io_error_conversion() {
    let err: Error = io_error("boom").into();
    assert!(matches!(err, Error::Io(_)));
    assert!(format!("{}", err).contains("boom"));
}

// =============================================================================
// Source Chain Tests
// =============================================================================

#[test]
fn test_open_error_source_is_preserved() {
    use std::error::Error as _;

    let err = Error::Open {
        path: PathBuf::from("/nope"),
        source: io::Error::from_raw_os_error(2),
    };
    assert!(err.source().is_some(), "source chain should be preserved");
}
