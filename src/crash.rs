//! # Crash Flush Handler
//!
//! Best-effort persistence of captured output when the host process is
//! about to die from a fatal signal. Handlers are installed for every
//! signal whose default action is abnormal termination with a core dump;
//! each handler drains whatever is still sitting in the capture pipe,
//! appends it to the backing file, syncs, then restores the signal's
//! saved disposition and re-raises it — the crash is never swallowed.
//!
//! ## Signal-Context Rules
//!
//! Everything reachable from [`crash_handler`] is restricted to syscalls
//! and lock-free atomics: no allocation, no logging, no locks. The
//! handler talks to the rest of the crate only through [`CrashShared`],
//! whose fields the consumer thread publishes with release stores. The
//! consumer may be the thread that crashed, so the handler bypasses it
//! entirely and appends directly via [`crate::bounded::append_raw`].
//!
//! ## Reentrancy
//!
//! A second fatal signal (including one raised by the flush itself) finds
//! the entry gate closed and goes straight to restore-and-reraise, so
//! repeated crashes stay idempotent and cannot recurse.

use crate::bounded::append_raw;
use crate::constants::READ_BUF_SIZE;
use crate::error::{Error, Result};
use crate::syscall;
use std::cell::UnsafeCell;
use std::io;
use std::mem::MaybeUninit;
use std::os::fd::RawFd;
use std::ptr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};

/// Fatal signals covered: default action is a core dump / abnormal
/// termination. Deliberately excludes clean-shutdown signals (TERM, INT).
const FATAL_SIGNALS: [libc::c_int; SIGNAL_QTY] = [
    libc::SIGQUIT,
    libc::SIGILL,
    libc::SIGABRT,
    libc::SIGFPE,
    libc::SIGSEGV,
    libc::SIGBUS,
    libc::SIGSYS,
];

const SIGNAL_QTY: usize = 7;

// =============================================================================
// Shared State
// =============================================================================

/// Lock-free bridge between the capture session and the signal context.
///
/// Armed by the session once the file and pipes exist; the consumer
/// publishes the current file size after every append. All accesses are
/// best-effort concurrent by design: a fatal signal means the process
/// will not continue normal execution after the handler returns.
pub(crate) struct CrashShared {
    armed: AtomicBool,
    fd_output: AtomicI32,
    fd_capture: AtomicI32,
    size_cur: AtomicU64,
    size_max: AtomicU64,
    block_size: AtomicU64,
}

impl CrashShared {
    const fn new() -> Self {
        Self {
            armed: AtomicBool::new(false),
            fd_output: AtomicI32::new(-1),
            fd_capture: AtomicI32::new(-1),
            size_cur: AtomicU64::new(0),
            size_max: AtomicU64::new(0),
            block_size: AtomicU64::new(0),
        }
    }

    /// Publishes the descriptors and sizes, then opens for business.
    pub fn arm(&self, fd_output: RawFd, fd_capture: RawFd, size: u64, max_size: u64, block_size: u64) {
        self.fd_output.store(fd_output, Ordering::Release);
        self.fd_capture.store(fd_capture, Ordering::Release);
        self.size_cur.store(size, Ordering::Release);
        self.size_max.store(max_size, Ordering::Release);
        self.block_size.store(block_size, Ordering::Release);
        self.armed.store(true, Ordering::Release);
    }

    /// Closes the bridge; a handler racing this sees stale-but-harmless
    /// descriptors at worst (`EBADF` is swallowed on the crash path).
    pub fn disarm(&self) {
        self.armed.store(false, Ordering::Release);
        self.fd_output.store(-1, Ordering::Release);
        self.fd_capture.store(-1, Ordering::Release);
    }

    /// Consumer-side size publication after each successful append.
    pub fn publish_size(&self, size: u64) {
        self.size_cur.store(size, Ordering::Release);
    }
}

pub(crate) static CRASH_SHARED: CrashShared = CrashShared::new();

// =============================================================================
// Handler Registry
// =============================================================================

/// Saved previous dispositions, written at registration (normal context)
/// and read in the handler to hand the signal back.
struct PrevActions(UnsafeCell<[MaybeUninit<libc::sigaction>; SIGNAL_QTY]>);

// SAFETY: slots are written only while the matching INSTALLED flag is
// false and read only while it is true; the flag transitions order the
// accesses.
unsafe impl Sync for PrevActions {}

impl PrevActions {
    fn slot(&self, index: usize) -> *mut libc::sigaction {
        // SAFETY: index is always < SIGNAL_QTY; pointer arithmetic only,
        // no reference is formed.
        unsafe {
            self.0
                .get()
                .cast::<MaybeUninit<libc::sigaction>>()
                .add(index)
                .cast()
        }
    }
}

const UNINIT_ACTION: MaybeUninit<libc::sigaction> = MaybeUninit::uninit();
static PREV_ACTIONS: PrevActions = PrevActions(UnsafeCell::new([UNINIT_ACTION; SIGNAL_QTY]));

static INSTALLED: [AtomicBool; SIGNAL_QTY] = [const { AtomicBool::new(false) }; SIGNAL_QTY];

/// Entry gate: set by the first fatal signal and never cleared, so later
/// signals skip the flush.
static IN_HANDLER: AtomicBool = AtomicBool::new(false);

/// Static drain buffer; the signal context cannot allocate one.
struct CrashBuf(UnsafeCell<[u8; READ_BUF_SIZE]>);

// SAFETY: touched only inside the IN_HANDLER gate, which admits exactly
// one winner.
unsafe impl Sync for CrashBuf {}

static CRASH_BUF: CrashBuf = CrashBuf(UnsafeCell::new([0u8; READ_BUF_SIZE]));

/// Installs the handler for every fatal signal, saving the previous
/// dispositions. On failure the caller is expected to run
/// [`signals_unregister`] to undo the partial installation.
pub(crate) fn signals_register() -> Result<()> {
    for (index, &signum) in FATAL_SIGNALS.iter().enumerate() {
        // SAFETY: zeroed sigaction is the documented baseline; only the
        // handler field is populated, matching a plain sa_handler setup.
        let mut action: libc::sigaction = unsafe { std::mem::zeroed() };
        action.sa_sigaction = crash_handler as extern "C" fn(libc::c_int) as libc::sighandler_t;

        // SAFETY: action is fully initialized and the previous action is
        // stored into static storage owned by this module.
        let rc = unsafe { libc::sigaction(signum, &action, PREV_ACTIONS.slot(index)) };
        if rc != 0 {
            return Err(Error::SignalInstall {
                source: io::Error::last_os_error(),
            });
        }
        INSTALLED[index].store(true, Ordering::Release);
    }
    Ok(())
}

/// Restores every saved disposition. Safe to call at any time, including
/// after a partial registration; uninstalled slots are skipped.
pub(crate) fn signals_unregister() {
    for (index, &signum) in FATAL_SIGNALS.iter().enumerate() {
        if INSTALLED[index].swap(false, Ordering::AcqRel) {
            // SAFETY: restores the action saved at registration.
            unsafe {
                libc::sigaction(signum, PREV_ACTIONS.slot(index), ptr::null_mut());
            }
        }
    }
}

// =============================================================================
// Handler
// =============================================================================

extern "C" fn crash_handler(signum: libc::c_int) {
    if IN_HANDLER
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
    {
        flush_on_crash();
    }

    if let Some(index) = FATAL_SIGNALS.iter().position(|&s| s == signum) {
        if INSTALLED[index].swap(false, Ordering::AcqRel) {
            // SAFETY: restores the disposition saved at registration so
            // the re-raise terminates the process exactly as it would
            // have without this handler.
            unsafe {
                libc::sigaction(signum, PREV_ACTIONS.slot(index), ptr::null_mut());
            }
        }
    }

    // SAFETY: re-delivery with the original disposition; raise is
    // async-signal-safe.
    unsafe {
        libc::raise(signum);
    }
}

/// Drains any unread captured bytes straight into the backing file and
/// forces it to stable storage. Errors are deliberately unreported: there
/// is no safe way to report them from here.
fn flush_on_crash() {
    if !CRASH_SHARED.armed.load(Ordering::Acquire) {
        return;
    }
    let fd_output = CRASH_SHARED.fd_output.load(Ordering::Acquire);
    if fd_output < 0 {
        return;
    }

    let fd_capture = CRASH_SHARED.fd_capture.load(Ordering::Acquire);
    if fd_capture >= 0 && syscall::set_nonblocking(fd_capture).is_ok() {
        // SAFETY: inside the IN_HANDLER gate, this is the only reference.
        let buf = unsafe { &mut *CRASH_BUF.0.get() };
        if let Ok(count) = syscall::read(fd_capture, buf) {
            if count > 0 {
                let size = CRASH_SHARED.size_cur.load(Ordering::Acquire);
                let max_size = CRASH_SHARED.size_max.load(Ordering::Acquire);
                let block_size = CRASH_SHARED.block_size.load(Ordering::Acquire);
                if let Ok(done) = append_raw(fd_output, size, max_size, block_size, &buf[..count])
                {
                    CRASH_SHARED.publish_size(done.size);
                }
            }
        }
    }

    let _ = syscall::fsync(fd_output);
}
