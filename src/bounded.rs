//! # Bounded File Manager
//!
//! Owns the backing file and keeps it inside a configured maximum size by
//! collapsing whole logical blocks from the **front** of the file before
//! each append that would overflow it. The collapse
//! (`fallocate(FALLOC_FL_COLLAPSE_RANGE)`) physically removes the oldest
//! bytes and shifts the remainder toward offset zero, so the file is a
//! true sliding window of the most recent output without ever rewriting
//! the surviving data.
//!
//! ## Why collapse instead of rewrite
//!
//! Removing the leading blocks is O(removed region) rather than O(file
//! size), and the window always starts on a block boundary — the
//! space-reclamation primitive operates at block granularity.
//!
//! ## Resume
//!
//! Opening an existing file picks up its current length from `fstat` +
//! seek-to-end, so a restarted host keeps appending to the same window.
//!
//! ## Crash Path
//!
//! The whole append algorithm lives in [`append_raw`], a free function
//! over raw values that performs only syscalls — the signal handler calls
//! it directly with state taken from atomics, bypassing this struct.

use crate::constants::{FALLBACK_BLOCK_SIZE, clamp_max_size};
use crate::error::{Error, Result};
use crate::syscall;
use std::io;
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};
use std::path::Path;
use tracing::{debug, info, warn};

/// Fixed-capacity backing file with oldest-block eviction.
///
/// ## Invariants
///
/// - `size <= max_size` after every successful append.
/// - `max_size` is a positive multiple of `block_size`, at least two
///   blocks (coerced at open time, never rejected).
/// - `size` tracks the on-disk length, including after a failed write
///   that followed a successful collapse.
///
/// ## Thread Safety
///
/// Appends take `&mut self`; the file is owned by a single writer. The
/// crash path never touches this struct.
pub struct BoundedFile {
    fd: Option<OwnedFd>,
    block_size: u64,
    size: u64,
    max_size: u64,
}

impl BoundedFile {
    /// Opens (creating if absent) the backing file at `path`.
    ///
    /// Reads the logical block size and current length from the file
    /// metadata so a pre-existing file is resumed rather than replaced.
    /// `max_size` is coerced to a block-aligned, two-block minimum.
    pub fn open(path: &Path, max_size: u64) -> Result<Self> {
        let fd = syscall::open(path, libc::O_RDWR | libc::O_CREAT, 0o644).map_err(|source| {
            Error::Open {
                path: path.to_path_buf(),
                source,
            }
        })?;

        let st = syscall::fstat(fd.as_raw_fd()).map_err(|source| Error::Metadata { source })?;
        let block_size = if st.st_blksize > 0 {
            st.st_blksize as u64
        } else {
            FALLBACK_BLOCK_SIZE
        };

        let size = syscall::lseek_end(fd.as_raw_fd()).map_err(|source| Error::Metadata { source })?;

        let effective = clamp_max_size(max_size, block_size);
        if effective != max_size {
            warn!(
                requested = max_size,
                effective,
                block_size,
                "maximum file size coerced to a block-aligned two-block minimum"
            );
        }

        info!(
            path = %path.display(),
            block_size,
            current_size = size,
            max_size = effective,
            "output file opened"
        );

        Ok(Self {
            fd: Some(fd),
            block_size,
            size,
            max_size: effective,
        })
    }

    /// Appends `data` at end-of-file, evicting leading blocks first when
    /// the write would push the file past its maximum.
    ///
    /// Returns the number of bytes actually written; a partial write is
    /// success, not an error. Errors are fatal to the caller: a failed
    /// collapse leaves the tracked size unchanged, while a failed write
    /// after a successful collapse leaves it at the post-collapse value so
    /// it still matches the on-disk length.
    pub fn append(&mut self, data: &[u8]) -> Result<usize> {
        let fd = self.raw_fd().ok_or(Error::FileClosed)?;
        let blocks = blocks_to_collapse(self.size, data.len() as u64, self.max_size, self.block_size);
        match append_raw(fd, self.size, self.max_size, self.block_size, data) {
            Ok(done) => {
                if blocks > 0 {
                    debug!(
                        from = self.size,
                        to = done.size,
                        blocks,
                        "truncated output file"
                    );
                }
                self.size = done.size;
                Ok(done.written)
            }
            Err((step, size)) => {
                self.size = size;
                Err(match step {
                    RawAppendError::Collapse(source) => Error::Truncate { source },
                    RawAppendError::Seek(source) => Error::Metadata { source },
                    RawAppendError::Write(source) => Error::Write { source },
                })
            }
        }
    }

    /// Forces file contents to stable storage.
    pub fn flush(&self) -> Result<()> {
        let fd = self.raw_fd().ok_or(Error::FileClosed)?;
        syscall::fsync(fd).map_err(|source| Error::Flush { source })
    }

    /// Releases the descriptor. Safe to call multiple times.
    pub fn close(&mut self) {
        if let Some(fd) = self.fd.take() {
            let _ = syscall::close(fd.into_raw_fd());
        }
    }

    /// Current on-disk length in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Effective maximum length in bytes (post-coercion).
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Logical block size the eviction operates at.
    pub fn block_size(&self) -> u64 {
        self.block_size
    }

    /// Raw descriptor, while the file is open.
    pub(crate) fn raw_fd(&self) -> Option<RawFd> {
        self.fd.as_ref().map(|fd| fd.as_raw_fd())
    }
}

impl Drop for BoundedFile {
    fn drop(&mut self) {
        self.close();
    }
}

/// Whole blocks to collapse from the file start so that `size + incoming`
/// fits inside `max_size`. Zero when the append already fits.
pub(crate) fn blocks_to_collapse(size: u64, incoming: u64, max_size: u64, block_size: u64) -> u64 {
    if size + incoming <= max_size {
        return 0;
    }
    (size + incoming - max_size).div_ceil(block_size)
}

/// Outcome of a raw append: bytes written and the resulting file length.
pub(crate) struct RawAppend {
    pub written: usize,
    pub size: u64,
}

/// Which step of a raw append failed.
pub(crate) enum RawAppendError {
    Collapse(io::Error),
    Seek(io::Error),
    Write(io::Error),
}

/// Append algorithm over raw values: collapse leading blocks if needed,
/// re-seek to the (shifted) end, write.
///
/// Async-signal-safe: syscalls only, no allocation, no locks. The error
/// side carries the size as of the failed step so the caller's tracked
/// length keeps matching the file.
pub(crate) fn append_raw(
    fd: RawFd,
    size: u64,
    max_size: u64,
    block_size: u64,
    data: &[u8],
) -> std::result::Result<RawAppend, (RawAppendError, u64)> {
    let mut size = size;
    let blocks = blocks_to_collapse(size, data.len() as u64, max_size, block_size);
    if blocks > 0 {
        let evicted = blocks * block_size;
        syscall::fallocate(fd, libc::FALLOC_FL_COLLAPSE_RANGE, 0, evicted)
            .map_err(|e| (RawAppendError::Collapse(e), size))?;
        size -= evicted.min(size);

        // The collapse shortened the file underneath the open offset.
        syscall::lseek_end(fd).map_err(|e| (RawAppendError::Seek(e), size))?;
    }

    let written = syscall::write(fd, data).map_err(|e| (RawAppendError::Write(e), size))?;
    Ok(RawAppend {
        written,
        size: size + written as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_collapse_when_append_fits() {
        assert_eq!(blocks_to_collapse(0, 4096, 8192, 4096), 0);
        assert_eq!(blocks_to_collapse(4096, 4096, 8192, 4096), 0);
        assert_eq!(blocks_to_collapse(8191, 1, 8192, 4096), 0);
    }

    #[test]
    fn test_collapse_rounds_up_to_whole_blocks() {
        // One byte over the limit still costs a whole block.
        assert_eq!(blocks_to_collapse(8192, 1, 8192, 4096), 1);
        assert_eq!(blocks_to_collapse(5000, 5000, 8192, 4096), 1);
        assert_eq!(blocks_to_collapse(8192, 4097, 8192, 4096), 2);
    }

    #[test]
    fn test_collapse_scales_with_block_size() {
        assert_eq!(blocks_to_collapse(1024, 1024, 1024, 512), 2);
        assert_eq!(blocks_to_collapse(1024, 1, 1024, 512), 1);
    }
}
