//! # Syscall Retry Layer
//!
//! One-line wrappers over the raw syscalls the capture layer uses, each
//! retrying transparently when interrupted by a signal (`EINTR`). Every
//! wrapper operates on raw descriptors and returns `io::Result`, leaving
//! error classification to the caller.
//!
//! ## Signal Safety
//!
//! The subset reachable from the crash handler — [`read`], [`write`],
//! [`lseek_end`], [`fallocate`], [`fsync`], [`set_nonblocking`] — performs
//! only the syscall plus `io::Error::from_raw_os_error`, which does not
//! allocate. Nothing here takes a lock.

use std::ffi::CString;
use std::io;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

/// Converts a negative syscall return into the current `errno`.
///
/// `last_os_error` stores the raw errno without allocating, so this is
/// usable from the crash handler.
fn last_errno() -> io::Error {
    io::Error::last_os_error()
}

/// Returns true when the error is an interrupted-syscall error.
fn interrupted(err: &io::Error) -> bool {
    err.raw_os_error() == Some(libc::EINTR)
}

/// Opens `path`, retrying on interruption.
pub(crate) fn open(path: &Path, flags: libc::c_int, mode: libc::mode_t) -> io::Result<OwnedFd> {
    let cpath = CString::new(path.as_os_str().as_bytes())
        .map_err(|_| io::Error::from(io::ErrorKind::InvalidInput))?;
    loop {
        // SAFETY: cpath is a valid NUL-terminated string for the call.
        let rc = unsafe { libc::open(cpath.as_ptr(), flags, mode as libc::c_uint) };
        if rc >= 0 {
            // SAFETY: rc is a freshly opened descriptor we own.
            return Ok(unsafe { OwnedFd::from_raw_fd(rc) });
        }
        let err = last_errno();
        if !interrupted(&err) {
            return Err(err);
        }
    }
}

/// Closes a raw descriptor, retrying on interruption.
pub(crate) fn close(fd: RawFd) -> io::Result<()> {
    loop {
        // SAFETY: the caller owns fd; a failed close still invalidates it
        // on Linux, but the retry mirrors the rest of the layer.
        let rc = unsafe { libc::close(fd) };
        if rc == 0 {
            return Ok(());
        }
        let err = last_errno();
        if !interrupted(&err) {
            return Err(err);
        }
    }
}

/// Reads into `buf`, retrying on interruption.
pub(crate) fn read(fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        // SAFETY: buf is valid for buf.len() writable bytes.
        let rc = unsafe { libc::read(fd, buf.as_mut_ptr().cast(), buf.len()) };
        if rc >= 0 {
            return Ok(rc as usize);
        }
        let err = last_errno();
        if !interrupted(&err) {
            return Err(err);
        }
    }
}

/// Writes `buf`, retrying on interruption. May write fewer bytes than given.
pub(crate) fn write(fd: RawFd, buf: &[u8]) -> io::Result<usize> {
    loop {
        // SAFETY: buf is valid for buf.len() readable bytes.
        let rc = unsafe { libc::write(fd, buf.as_ptr().cast(), buf.len()) };
        if rc >= 0 {
            return Ok(rc as usize);
        }
        let err = last_errno();
        if !interrupted(&err) {
            return Err(err);
        }
    }
}

/// Stats an open descriptor, retrying on interruption.
pub(crate) fn fstat(fd: RawFd) -> io::Result<libc::stat> {
    let mut st = std::mem::MaybeUninit::<libc::stat>::uninit();
    loop {
        // SAFETY: st points at writable storage for one stat record.
        let rc = unsafe { libc::fstat(fd, st.as_mut_ptr()) };
        if rc == 0 {
            // SAFETY: fstat succeeded and fully initialized st.
            return Ok(unsafe { st.assume_init() });
        }
        let err = last_errno();
        if !interrupted(&err) {
            return Err(err);
        }
    }
}

/// Repositions the descriptor to end-of-file, returning the new offset.
pub(crate) fn lseek_end(fd: RawFd) -> io::Result<u64> {
    loop {
        // SAFETY: plain seek on an open descriptor.
        let rc = unsafe { libc::lseek(fd, 0, libc::SEEK_END) };
        if rc >= 0 {
            return Ok(rc as u64);
        }
        let err = last_errno();
        if !interrupted(&err) {
            return Err(err);
        }
    }
}

/// Manipulates file space, retrying on interruption.
pub(crate) fn fallocate(
    fd: RawFd,
    mode: libc::c_int,
    offset: u64,
    len: u64,
) -> io::Result<()> {
    loop {
        // SAFETY: plain space manipulation on an open descriptor.
        let rc = unsafe { libc::fallocate(fd, mode, offset as libc::off_t, len as libc::off_t) };
        if rc == 0 {
            return Ok(());
        }
        let err = last_errno();
        if !interrupted(&err) {
            return Err(err);
        }
    }
}

/// Forces file data and metadata to stable storage.
pub(crate) fn fsync(fd: RawFd) -> io::Result<()> {
    loop {
        // SAFETY: plain sync on an open descriptor.
        let rc = unsafe { libc::fsync(fd) };
        if rc == 0 {
            return Ok(());
        }
        let err = last_errno();
        if !interrupted(&err) {
            return Err(err);
        }
    }
}

/// Creates a unidirectional pipe, returning `(read_end, write_end)`.
pub(crate) fn pipe() -> io::Result<(OwnedFd, OwnedFd)> {
    let mut fds = [0 as libc::c_int; 2];
    // SAFETY: fds points at storage for the two descriptors.
    let rc = unsafe { libc::pipe(fds.as_mut_ptr()) };
    if rc != 0 {
        return Err(last_errno());
    }
    // SAFETY: both descriptors were just created and are owned here.
    Ok(unsafe { (OwnedFd::from_raw_fd(fds[0]), OwnedFd::from_raw_fd(fds[1])) })
}

/// Duplicates a descriptor into a new owned one.
pub(crate) fn dup(fd: RawFd) -> io::Result<OwnedFd> {
    loop {
        // SAFETY: duplicating an open descriptor.
        let rc = unsafe { libc::dup(fd) };
        if rc >= 0 {
            // SAFETY: rc is a fresh descriptor we own.
            return Ok(unsafe { OwnedFd::from_raw_fd(rc) });
        }
        let err = last_errno();
        if !interrupted(&err) {
            return Err(err);
        }
    }
}

/// Duplicates `src` over `dst`, closing whatever `dst` referred to.
pub(crate) fn dup2(src: RawFd, dst: RawFd) -> io::Result<()> {
    loop {
        // SAFETY: both descriptors are under the caller's control.
        let rc = unsafe { libc::dup2(src, dst) };
        if rc >= 0 {
            return Ok(());
        }
        let err = last_errno();
        if !interrupted(&err) {
            return Err(err);
        }
    }
}

/// Puts a descriptor into non-blocking mode.
pub(crate) fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: querying flags of an open descriptor.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL, 0) };
    if flags < 0 {
        return Err(last_errno());
    }
    // SAFETY: setting flags of an open descriptor.
    let rc = unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) };
    if rc < 0 {
        return Err(last_errno());
    }
    Ok(())
}

/// Returns true when the descriptor refers to a terminal.
pub(crate) fn isatty(fd: RawFd) -> bool {
    // SAFETY: isatty only inspects the descriptor.
    unsafe { libc::isatty(fd) == 1 }
}

/// Blocks until either descriptor is readable (no timeout), returning
/// `(first_ready, second_ready)`. Hang-ups and errors on a descriptor
/// count as readable so the caller observes EOF through its own read.
pub(crate) fn poll2(first: RawFd, second: RawFd) -> io::Result<(bool, bool)> {
    let mut fds = [
        libc::pollfd {
            fd: first,
            events: libc::POLLIN,
            revents: 0,
        },
        libc::pollfd {
            fd: second,
            events: libc::POLLIN,
            revents: 0,
        },
    ];
    loop {
        // SAFETY: fds points at two valid pollfd records.
        let rc = unsafe { libc::poll(fds.as_mut_ptr(), 2, -1) };
        if rc >= 0 {
            break;
        }
        let err = last_errno();
        if !interrupted(&err) {
            return Err(err);
        }
    }
    let ready =
        |revents: libc::c_short| revents & (libc::POLLIN | libc::POLLHUP | libc::POLLERR) != 0;
    Ok((ready(fds[0].revents), ready(fds[1].revents)))
}
