//! # Event-Multiplexed Consumer
//!
//! The dedicated thread that drains captured output into the bounded
//! file. Each loop iteration blocks in a two-descriptor poll — capture
//! pipe and control wake pipe, no timeout — and services whichever side
//! is ready. Control events are handled before data in the same
//! iteration, mirroring the termination handshake: a terminate is
//! acknowledged first, then the capture side still gets one drain in that
//! final iteration, so bytes racing the shutdown have one chance to land.
//! Loss at that exact boundary remains possible and is accepted.
//!
//! ## Failure Semantics
//!
//! Everything fatal stops the loop rather than retrying: a failed append
//! indicates an unrecoverable storage condition, a malformed control
//! event indicates channel corruption, and a failed poll indicates a
//! corrupted descriptor set. The host process keeps running either way —
//! its output simply stops being captured once the originals are
//! restored.

use crate::bounded::BoundedFile;
use crate::constants::{CONSUMER_THREAD_NAME, READ_BUF_SIZE};
use crate::control::{ControlEvent, ControlReceiver};
use crate::crash::CRASH_SHARED;
use crate::error::{Error, Result};
use crate::redirect::StdioRedirect;
use crate::syscall;
use std::os::fd::{AsRawFd, OwnedFd};
use std::sync::mpsc::SyncSender;
use std::thread::JoinHandle;
use tracing::{debug, error};

/// State owned exclusively by the consumer thread.
pub(crate) struct Consumer {
    pub file: BoundedFile,
    pub capture_rd: OwnedFd,
    pub control: ControlReceiver,
    pub redirect: StdioRedirect,
    pub ready: SyncSender<()>,
}

impl Consumer {
    /// Moves the consumer onto its own named thread. The thread signals
    /// `ready` exactly once before entering the wait loop and hands the
    /// bounded file back through the join so the terminator can flush
    /// and close it.
    pub fn spawn(self) -> Result<JoinHandle<BoundedFile>> {
        std::thread::Builder::new()
            .name(CONSUMER_THREAD_NAME.to_string())
            .spawn(move || self.run())
            .map_err(|source| Error::ThreadSpawn { source })
    }

    fn run(mut self) -> BoundedFile {
        let _ = self.ready.send(());
        let mut buf = [0u8; READ_BUF_SIZE];

        let mut running = true;
        while running {
            let (capture_ready, control_ready) = match syscall::poll2(
                self.capture_rd.as_raw_fd(),
                self.control.as_raw_fd(),
            ) {
                Ok(ready) => ready,
                Err(error) => {
                    error!(%error, "multiplexed wait failed, stopping capture");
                    break;
                }
            };

            if control_ready {
                match self.control.recv_ready() {
                    Ok(ControlEvent::Terminate { ack }) => {
                        debug!("terminate event received");
                        if let Some(ack) = ack {
                            let _ = ack.send(());
                        }
                        running = false;
                    }
                    Ok(ControlEvent::Quit) => {
                        debug!("quit event received");
                        // The one best-effort drain is the last read this
                        // loop performs.
                        self.drain_once(&mut buf);
                        break;
                    }
                    Err(error) => {
                        error!(%error, "control event receive failed, stopping capture");
                        break;
                    }
                }
            }

            if capture_ready && !self.forward(&mut buf) {
                break;
            }
        }

        self.redirect.restore();
        debug!("capture thread exiting");
        self.file
    }

    /// Moves one buffer's worth of captured bytes into the bounded file.
    /// Returns false when the loop must stop: producer closed its end,
    /// read error, or fatal storage error.
    fn forward(&mut self, buf: &mut [u8; READ_BUF_SIZE]) -> bool {
        match syscall::read(self.capture_rd.as_raw_fd(), buf) {
            Ok(0) => {
                debug!("capture pipe closed by producer");
                false
            }
            Ok(count) => match self.file.append(&buf[..count]) {
                Ok(_) => {
                    CRASH_SHARED.publish_size(self.file.size());
                    true
                }
                Err(error) => {
                    error!(%error, "append failed, stopping capture");
                    false
                }
            },
            Err(error) => {
                error!(%error, "capture read failed, stopping capture");
                false
            }
        }
    }

    /// One best-effort non-blocking drain, used on the quit path. A
    /// would-block result or any failure is silently accepted.
    fn drain_once(&mut self, buf: &mut [u8; READ_BUF_SIZE]) {
        if syscall::set_nonblocking(self.capture_rd.as_raw_fd()).is_err() {
            return;
        }
        if let Ok(count) = syscall::read(self.capture_rd.as_raw_fd(), buf) {
            if count > 0 && self.file.append(&buf[..count]).is_ok() {
                CRASH_SHARED.publish_size(self.file.size());
            }
        }
    }
}
