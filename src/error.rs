//! Error types for the capture layer.

use std::io;
use std::path::PathBuf;

/// Result type alias for capture operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the capture layer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    /// A capture session is already active in this process.
    #[error("capture already initialized")]
    AlreadyInitialized,

    /// The session has been terminated.
    #[error("capture session terminated")]
    Terminated,

    /// The backing file has been closed.
    #[error("backing file is closed")]
    FileClosed,

    // =========================================================================
    // Backing File Errors
    // =========================================================================
    /// Opening or creating the backing file failed.
    #[error("failed to open output file {}: {source}", path.display())]
    Open { path: PathBuf, source: io::Error },

    /// Reading file metadata or seeking to end-of-file failed.
    #[error("failed to read output file metadata: {source}")]
    Metadata { source: io::Error },

    /// Collapsing blocks from the front of the backing file failed.
    ///
    /// Typically the filesystem or kernel does not support the collapse
    /// operation; the error is fatal to the consumer.
    #[error("failed to truncate output file: {source}")]
    Truncate { source: io::Error },

    /// Writing to the backing file failed.
    #[error("failed to write to output file: {source}")]
    Write { source: io::Error },

    /// Flushing the backing file (or stdout in interactive mode) failed.
    #[error("failed to flush output: {source}")]
    Flush { source: io::Error },

    // =========================================================================
    // Wiring Errors
    // =========================================================================
    /// Creating a capture or control pipe failed.
    #[error("failed to create pipe: {source}")]
    Pipe { source: io::Error },

    /// Saving or rerouting a standard stream failed.
    #[error("failed to redirect {stream}: {source}")]
    Redirect {
        stream: &'static str,
        source: io::Error,
    },

    /// Installing a fatal-signal handler failed.
    #[error("failed to install signal handler: {source}")]
    SignalInstall { source: io::Error },

    /// Spawning the consumer thread failed.
    #[error("failed to spawn capture thread: {source}")]
    ThreadSpawn { source: io::Error },

    // =========================================================================
    // Control Channel Errors
    // =========================================================================
    /// The control channel is closed or full.
    #[error("control channel unavailable")]
    ControlChannel,

    /// The control channel delivered a malformed event.
    ///
    /// The wake framing is one tag byte per queued event; any deviation
    /// implies a corrupted channel and stops the consumer.
    #[error("control channel framing error: {reason}")]
    ControlProtocol { reason: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}
