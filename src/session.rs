//! # Capture Session
//!
//! Process-wide lifecycle for output capture: wire the pipes, reroute
//! stdio, spawn the consumer, and tear everything down again. The
//! single-instance rule is enforced with one process-wide flag because
//! standard-stream redirection is inherently process-global, but all
//! state lives in an explicitly constructed [`CaptureSession`] rather
//! than in hidden globals.
//!
//! ```text
//!  host write ──► stdout/stderr (dup2'd) ──► capture pipe
//!                                               │ poll
//!                     control wake pipe ────────┤
//!                                               ▼
//!                                        consumer thread ──► BoundedFile
//! ```
//!
//! ## Interactive Mode
//!
//! When stdin is attached to a terminal the session initializes as a
//! success with no file, no pipes and no thread: capture is only
//! meaningful for redirected or piped invocations, and an interactive
//! user wants their output on the terminal.

use crate::bounded::BoundedFile;
use crate::constants::{DEFAULT_MAX_SIZE, TERM_ACK_TIMEOUT};
use crate::consumer::Consumer;
use crate::control::{self, ControlEvent, ControlSender};
use crate::crash::{self, CRASH_SHARED};
use crate::error::{Error, Result};
use crate::redirect::StdioRedirect;
use crate::syscall;
use serde::{Deserialize, Serialize};
use std::os::fd::{AsRawFd, RawFd};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

/// One live session per process; stdio redirection cannot be shared.
static SESSION_ACTIVE: AtomicBool = AtomicBool::new(false);

fn default_max_size() -> u64 {
    DEFAULT_MAX_SIZE
}

/// Capture configuration.
///
/// Serde-friendly so hosts can embed it in their own configuration
/// files; omitted fields fall back to the documented defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Destination path of the backing file.
    pub path: PathBuf,
    /// Maximum backing-file size in bytes. Coerced at open time to a
    /// block-aligned value of at least two logical blocks.
    #[serde(default = "default_max_size")]
    pub max_size: u64,
    /// Also capture standard error into the same file.
    #[serde(default)]
    pub include_stderr: bool,
}

impl CaptureConfig {
    /// Creates a configuration with default sizing, stdout only.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            max_size: DEFAULT_MAX_SIZE,
            include_stderr: false,
        }
    }

    /// Sets the maximum backing-file size.
    pub fn with_max_size(mut self, max_size: u64) -> Self {
        self.max_size = max_size;
        self
    }

    /// Includes standard error in the capture.
    pub fn with_stderr(mut self, include_stderr: bool) -> Self {
        self.include_stderr = include_stderr;
        self
    }
}

/// Live wiring of a capturing (non-interactive) session.
struct Capturing {
    handle: JoinHandle<BoundedFile>,
    control: ControlSender,
    /// Copy of the backing-file descriptor for flush; the file itself is
    /// owned by the consumer thread until it is joined.
    out_fd: RawFd,
}

/// An active capture of this process's output.
///
/// ## Lifecycle
///
/// Exactly one session may be live at a time. [`CaptureSession::term`]
/// performs the shutdown handshake and is idempotent; dropping the
/// session terminates it as well.
pub struct CaptureSession {
    inner: Option<Capturing>,
    interactive: bool,
    terminated: bool,
}

impl CaptureSession {
    /// Initializes capture of this process's standard output (and
    /// optionally standard error) into a bounded backing file.
    ///
    /// Rejects a second live session. When stdin is an interactive
    /// terminal this is a no-op success: no file is created and no
    /// thread is spawned. Otherwise it blocks until the consumer thread
    /// signals readiness.
    pub fn init(config: CaptureConfig) -> Result<Self> {
        if SESSION_ACTIVE.swap(true, Ordering::AcqRel) {
            warn!("capture already initialized");
            return Err(Error::AlreadyInitialized);
        }

        if syscall::isatty(libc::STDIN_FILENO) {
            info!("stdin is a terminal, capture skipped");
            return Ok(Self {
                inner: None,
                interactive: true,
                terminated: false,
            });
        }

        match Self::start(&config) {
            Ok(capturing) => Ok(Self {
                inner: Some(capturing),
                interactive: false,
                terminated: false,
            }),
            Err(error) => {
                SESSION_ACTIVE.store(false, Ordering::Release);
                Err(error)
            }
        }
    }

    fn start(config: &CaptureConfig) -> Result<Capturing> {
        crash::signals_register().inspect_err(|_| crash::signals_unregister())?;
        match Self::wire(config) {
            Ok(capturing) => Ok(capturing),
            Err(error) => {
                crash::signals_unregister();
                Err(error)
            }
        }
    }

    fn wire(config: &CaptureConfig) -> Result<Capturing> {
        let file = BoundedFile::open(&config.path, config.max_size)?;

        let (capture_rd, capture_wr) =
            syscall::pipe().map_err(|source| Error::Pipe { source })?;
        let (control, control_rx) = control::channel()?;

        // From here on, StdioRedirect's drop restores the originals on
        // every error path.
        let redirect = StdioRedirect::install(capture_wr.as_raw_fd(), config.include_stderr)?;

        let out_fd = file.raw_fd().ok_or(Error::FileClosed)?;
        CRASH_SHARED.arm(
            out_fd,
            capture_rd.as_raw_fd(),
            file.size(),
            file.max_size(),
            file.block_size(),
        );

        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let consumer = Consumer {
            file,
            capture_rd,
            control: control_rx,
            redirect,
            ready: ready_tx,
        };

        let handle = match consumer.spawn() {
            Ok(handle) => handle,
            Err(error) => {
                CRASH_SHARED.disarm();
                return Err(error);
            }
        };

        // The dup2'd stream descriptors are now the pipe's write ends;
        // the original descriptor is redundant.
        drop(capture_wr);

        // Block until the consumer is in its wait loop. An error here
        // means the thread died before signaling; term sorts that out.
        let _ = ready_rx.recv();

        info!("capture initialized");
        Ok(Capturing {
            handle,
            control,
            out_fd,
        })
    }

    /// True when this session skipped capture because stdin is a
    /// terminal.
    pub fn is_interactive(&self) -> bool {
        self.interactive
    }

    /// Asks the consumer to stop after one final best-effort drain of
    /// the capture pipe, without waiting for an acknowledgment. Intended
    /// ahead of a clean process shutdown; call [`CaptureSession::term`]
    /// afterwards to flush and close the file. No-op in interactive
    /// mode.
    pub fn quit(&self) -> Result<()> {
        if self.terminated {
            return Err(Error::Terminated);
        }
        match &self.inner {
            Some(capturing) => capturing.control.send(ControlEvent::Quit),
            None => Ok(()),
        }
    }

    /// Synchronously forces captured output to stable storage: the
    /// backing file in capture mode, the real stdout descriptor in
    /// interactive mode (descriptors that do not support fsync, such as
    /// ttys, surface the OS error).
    pub fn flush(&self) -> Result<()> {
        if self.terminated {
            return Err(Error::Terminated);
        }
        let fd = match &self.inner {
            Some(capturing) => capturing.out_fd,
            None => libc::STDOUT_FILENO,
        };
        syscall::fsync(fd).map_err(|source| Error::Flush { source })
    }

    /// Terminates the session: shutdown handshake with the consumer,
    /// final flush, file close, stdio restored, handlers unregistered.
    /// No-op when already terminated; also runs on drop.
    pub fn term(&mut self) {
        if self.terminated {
            return;
        }
        self.terminated = true;

        if let Some(capturing) = self.inner.take() {
            Self::shutdown(capturing);
        }

        crash::signals_unregister();
        SESSION_ACTIVE.store(false, Ordering::Release);
        info!("capture terminated");
    }

    fn shutdown(capturing: Capturing) {
        let Capturing {
            handle,
            control,
            out_fd,
        } = capturing;

        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        let acked = match control.send(ControlEvent::Terminate { ack: Some(ack_tx) }) {
            Ok(()) => match ack_rx.recv_timeout(TERM_ACK_TIMEOUT) {
                Ok(()) => true,
                // The ack token was dropped unsent: the consumer is on
                // its way out and can be joined.
                Err(mpsc::RecvTimeoutError::Disconnected) => true,
                Err(mpsc::RecvTimeoutError::Timeout) => {
                    warn!("no terminate acknowledgment, leaving capture thread detached");
                    false
                }
            },
            Err(_) => {
                // Consumer already stopped on its own; join directly.
                debug!("capture thread already stopped");
                true
            }
        };

        CRASH_SHARED.disarm();

        if acked {
            match handle.join() {
                Ok(mut file) => {
                    if let Err(error) = file.flush() {
                        warn!(%error, "final flush failed");
                    }
                    file.close();
                }
                Err(_) => warn!("capture thread panicked"),
            }
        } else {
            // The thread still owns the file; sync what we can and leave
            // the descriptor to it.
            let _ = syscall::fsync(out_fd);
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.term();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CaptureConfig::new("/tmp/capture.log");
        assert_eq!(config.max_size, DEFAULT_MAX_SIZE);
        assert!(!config.include_stderr);
    }

    #[test]
    fn test_config_builders() {
        let config = CaptureConfig::new("/tmp/capture.log")
            .with_max_size(1 << 20)
            .with_stderr(true);
        assert_eq!(config.max_size, 1 << 20);
        assert!(config.include_stderr);
    }
}
