//! # Capture Redirector
//!
//! Reroutes the process's standard streams into the capture pipe. The
//! original descriptors are saved with `dup` before being overwritten
//! with `dup2`, and restored — best-effort, on every exit path — when the
//! redirect is dropped or explicitly restored.
//!
//! When stderr is included it shares the same pipe write end as stdout;
//! the two streams interleave in whatever order the kernel delivers.

use crate::error::{Error, Result};
use crate::syscall;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use tracing::debug;

/// Saved standard-stream descriptors with restore-on-drop semantics.
///
/// Restoration is idempotent: each saved descriptor is consumed on first
/// restore, and restoring a stream that was never captured is a no-op.
pub(crate) struct StdioRedirect {
    saved_stdout: Option<OwnedFd>,
    saved_stderr: Option<OwnedFd>,
}

impl StdioRedirect {
    /// Saves stdout (and stderr when requested) and overwrites them with
    /// `pipe_wr`. On partial failure, anything already rerouted is
    /// restored before the error is returned.
    pub fn install(pipe_wr: RawFd, include_stderr: bool) -> Result<Self> {
        let mut redirect = Self {
            saved_stdout: None,
            saved_stderr: None,
        };

        match Self::capture_stream(pipe_wr, libc::STDOUT_FILENO) {
            Ok(saved) => redirect.saved_stdout = Some(saved),
            Err(source) => {
                return Err(Error::Redirect {
                    stream: "stdout",
                    source,
                });
            }
        }

        if include_stderr {
            match Self::capture_stream(pipe_wr, libc::STDERR_FILENO) {
                Ok(saved) => redirect.saved_stderr = Some(saved),
                Err(source) => {
                    redirect.restore();
                    return Err(Error::Redirect {
                        stream: "stderr",
                        source,
                    });
                }
            }
        }

        debug!(include_stderr, "standard streams rerouted into capture pipe");
        Ok(redirect)
    }

    fn capture_stream(pipe_wr: RawFd, stream_fd: RawFd) -> io::Result<OwnedFd> {
        let saved = syscall::dup(stream_fd)?;
        syscall::dup2(pipe_wr, stream_fd)?;
        Ok(saved)
    }

    /// Puts the saved descriptors back. Best-effort: failures restoring a
    /// stream are ignored, and already-restored streams are skipped.
    pub fn restore(&mut self) {
        if let Some(saved) = self.saved_stdout.take() {
            let _ = syscall::dup2(saved.as_raw_fd(), libc::STDOUT_FILENO);
        }
        if let Some(saved) = self.saved_stderr.take() {
            let _ = syscall::dup2(saved.as_raw_fd(), libc::STDERR_FILENO);
        }
    }
}

impl Drop for StdioRedirect {
    fn drop(&mut self) {
        self.restore();
    }
}
