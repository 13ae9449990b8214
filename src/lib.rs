//! # ringtail
//!
//! **Bounded ring-file capture of process output with crash-safe flush**
//!
//! This crate reroutes a process's standard output (and optionally
//! standard error) into a fixed-capacity backing file that never grows
//! past a configured maximum: when an append would overflow it, whole
//! logical blocks are collapsed off the **front** of the file with
//! `fallocate(FALLOC_FL_COLLAPSE_RANGE)`, so the file is always a sliding
//! window of the most recent output. Long-running or crashing processes
//! can be logged without unbounded disk consumption, and the last window
//! of output survives even an abnormal termination.
//!
//! # Architecture Overview
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                            ringtail                              │
//! ├──────────────────────────────────────────────────────────────────┤
//! │   host write ──► stdout/stderr ──► capture pipe ─┐               │
//! │                  (dup2'd, saved)                 │ poll          │
//! │   term()/quit ──► control channel ───────────────┤               │
//! │                  (typed events + wake pipe)      ▼               │
//! │                                          consumer thread         │
//! │                                                  │ append        │
//! │                                                  ▼               │
//! │                                           BoundedFile            │
//! │                                    collapse oldest blocks,       │
//! │                                    write newest at the end       │
//! ├──────────────────────────────────────────────────────────────────┤
//! │  fatal signal (SEGV, ABRT, …)                                    │
//! │    └─► crash handler: drain pipe ─► append ─► fsync ─► re-raise  │
//! └──────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Crash Safety
//!
//! Handlers are installed for every signal whose default action is a
//! core dump (quit, illegal instruction, abort, floating-point
//! exception, segmentation fault, bus error, bad system call). The
//! handler is restricted to async-signal-safe operations: it drains the
//! capture pipe once (non-blocking, static buffer), appends directly to
//! the backing file, syncs it, then restores the original disposition
//! and re-raises — the crash is never swallowed.
//!
//! # On-Disk Layout
//!
//! The backing file is a flat byte stream with no header, index, or
//! metadata: its content is exactly the most recent window of output,
//! oldest first, and its length never exceeds the configured maximum.
//! Re-opening an existing file resumes the window instead of replacing
//! it.
//!
//! # Platform Support
//!
//! Linux only: the truncation primitive is
//! `fallocate(FALLOC_FL_COLLAPSE_RANGE)`, which also requires a
//! filesystem that supports collapse ranges (ext4, xfs). An unsupported
//! filesystem surfaces as a fatal append error, not a silent fallback.
//!
//! # Example
//!
//! ```rust,ignore
//! use ringtail::{CaptureConfig, CaptureSession};
//!
//! fn main() -> ringtail::Result<()> {
//!     let config = CaptureConfig::new("/var/log/app.ring")
//!         .with_max_size(1 << 20)
//!         .with_stderr(true);
//!     let mut session = CaptureSession::init(config)?;
//!
//!     // ... everything printed here lands in the ring file ...
//!
//!     session.term();
//!     Ok(())
//! }
//! ```

pub mod bounded;
pub mod constants;
pub mod error;
pub mod session;

mod consumer;
mod control;
mod crash;
mod redirect;
mod syscall;

// Re-exports
pub use bounded::BoundedFile;
pub use constants::*;
pub use error::{Error, Result};
pub use session::{CaptureConfig, CaptureSession};
