//! # Control Channel
//!
//! Carries lifecycle events to the consumer thread, separate from the
//! captured data. A bounded in-memory queue holds the typed events; a
//! companion wake pipe makes them observable to the consumer's
//! two-descriptor poll. Each send enqueues one event and writes that
//! event's one-byte tag to the pipe, so the framing invariant is exactly
//! one queued event per readable tag byte — any deviation (short read,
//! unknown tag, tag without an event) is a protocol error that stops the
//! consumer.

use crate::constants::CONTROL_QUEUE_DEPTH;
use crate::error::{Error, Result};
use crate::syscall;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::sync::mpsc::{Receiver, SyncSender, TryRecvError, sync_channel};

const TAG_TERMINATE: u8 = 0;
const TAG_QUIT: u8 = 1;

/// Lifecycle event delivered to the consumer thread.
pub(crate) enum ControlEvent {
    /// Stop the consumer. The acknowledgment token, when present, is
    /// signaled before the loop stops so the terminator can bound its
    /// wait.
    Terminate { ack: Option<SyncSender<()>> },
    /// Stop after one final best-effort drain of the capture pipe.
    Quit,
}

impl ControlEvent {
    fn tag(&self) -> u8 {
        match self {
            Self::Terminate { .. } => TAG_TERMINATE,
            Self::Quit => TAG_QUIT,
        }
    }
}

/// Sending half, held by the session.
pub(crate) struct ControlSender {
    events: SyncSender<ControlEvent>,
    wake_wr: OwnedFd,
}

impl ControlSender {
    /// Enqueues `event` and wakes the consumer's poll.
    ///
    /// Fails when the consumer is gone (queue disconnected or wake pipe
    /// closed) or the bounded queue is full.
    pub fn send(&self, event: ControlEvent) -> Result<()> {
        let tag = event.tag();
        self.events
            .try_send(event)
            .map_err(|_| Error::ControlChannel)?;
        syscall::write(self.wake_wr.as_raw_fd(), &[tag]).map_err(|_| Error::ControlChannel)?;
        Ok(())
    }
}

/// Receiving half, owned by the consumer thread.
pub(crate) struct ControlReceiver {
    events: Receiver<ControlEvent>,
    wake_rd: OwnedFd,
}

impl ControlReceiver {
    /// Descriptor to include in the multiplexed wait.
    pub fn as_raw_fd(&self) -> RawFd {
        self.wake_rd.as_raw_fd()
    }

    /// Consumes one readiness notification: reads exactly one tag byte
    /// and takes the matching queued event.
    pub fn recv_ready(&self) -> Result<ControlEvent> {
        let mut tag = [0u8; 1];
        let n = syscall::read(self.wake_rd.as_raw_fd(), &mut tag).map_err(|e| {
            Error::ControlProtocol {
                reason: format!("wake read failed: {e}"),
            }
        })?;
        if n == 0 {
            return Err(Error::ControlProtocol {
                reason: "wake pipe closed".to_string(),
            });
        }

        let event = match self.events.try_recv() {
            Ok(event) => event,
            Err(TryRecvError::Empty) => {
                return Err(Error::ControlProtocol {
                    reason: "wake byte without a queued event".to_string(),
                });
            }
            Err(TryRecvError::Disconnected) => {
                return Err(Error::ControlProtocol {
                    reason: "event queue disconnected".to_string(),
                });
            }
        };

        if event.tag() != tag[0] {
            return Err(Error::ControlProtocol {
                reason: format!("tag {} does not match queued event", tag[0]),
            });
        }
        Ok(event)
    }
}

/// Creates a connected sender/receiver pair.
pub(crate) fn channel() -> Result<(ControlSender, ControlReceiver)> {
    let (events_tx, events_rx) = sync_channel(CONTROL_QUEUE_DEPTH);
    let (wake_rd, wake_wr) = syscall::pipe().map_err(|source| Error::Pipe { source })?;
    Ok((
        ControlSender {
            events: events_tx,
            wake_wr,
        },
        ControlReceiver {
            events: events_rx,
            wake_rd,
        },
    ))
}
