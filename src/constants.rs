//! # Capture Constants
//!
//! Defines the size bounds, timeouts, and channel depths for the capture
//! layer. These constants are the **single source of truth** for the
//! invariants the bounded file and the consumer thread rely on.
//!
//! ## Sizing Rationale
//!
//! The backing file is trimmed in whole logical blocks, so the configured
//! maximum must leave room for at least one full block of incoming data on
//! top of one trimmable block — hence the two-block floor. A maximum below
//! that would make a single buffer-sized append require collapsing the
//! entire file, which the kernel rejects.
//!
//! ## Cross-References
//!
//! - [`crate::bounded`]: uses the block fallback and the coercion helper
//! - [`crate::consumer`]: uses the read buffer size
//! - [`crate::session`]: uses the default maximum and the ack timeout

use std::time::Duration;

// =============================================================================
// File Sizing
// =============================================================================

/// Logical block size assumed when the filesystem reports none (bytes).
///
/// `fstat` normally supplies the real preferred block size; this fallback
/// matches the common 4 KiB sector and keeps the collapse alignment valid
/// on filesystems that report a zero `st_blksize`.
pub const FALLBACK_BLOCK_SIZE: u64 = 4096;

/// Minimum number of logical blocks the backing file may be limited to.
///
/// One block of headroom for incoming data plus one trimmable block. A
/// requested maximum below `MIN_BLOCKS` blocks is raised, not rejected.
pub const MIN_BLOCKS: u64 = 2;

/// Default maximum backing-file size when the host does not configure one.
pub const DEFAULT_MAX_SIZE: u64 = 4 * FALLBACK_BLOCK_SIZE;

// =============================================================================
// Consumer Thread
// =============================================================================

/// Size of the capture read buffer (bytes).
///
/// One pipe read per loop iteration moves at most this much; the crash
/// handler uses a static buffer of the same size for its final drain.
pub const READ_BUF_SIZE: usize = 4096;

/// Name assigned to the consumer thread.
pub const CONSUMER_THREAD_NAME: &str = "ringtail-capture";

/// Depth of the bounded control-event queue.
///
/// Control traffic is one terminate or quit event per session lifetime;
/// the depth only needs to absorb a redundant sender racing a shutdown.
pub const CONTROL_QUEUE_DEPTH: usize = 8;

/// How long `term` waits for the consumer to acknowledge a terminate
/// event before giving up on joining it.
pub const TERM_ACK_TIMEOUT: Duration = Duration::from_secs(5);

// =============================================================================
// Coercion
// =============================================================================

/// Coerces a requested maximum file size to a usable one.
///
/// Rounds down to a whole multiple of `block_size`, then raises the result
/// to the [`MIN_BLOCKS`] floor. Never fails: invalid values are corrected,
/// not rejected.
pub fn clamp_max_size(requested: u64, block_size: u64) -> u64 {
    let aligned = requested - (requested % block_size);
    aligned.max(MIN_BLOCKS * block_size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_aligned_value_unchanged() {
        assert_eq!(clamp_max_size(4 * 4096, 4096), 4 * 4096);
    }

    #[test]
    fn test_clamp_rounds_down_to_block_multiple() {
        assert_eq!(clamp_max_size(3 * 4096 + 17, 4096), 3 * 4096);
    }

    #[test]
    fn test_clamp_raises_to_two_block_floor() {
        assert_eq!(clamp_max_size(100, 4096), 2 * 4096);
        assert_eq!(clamp_max_size(0, 4096), 2 * 4096);
        assert_eq!(clamp_max_size(4096, 4096), 2 * 4096);
    }

    #[test]
    fn test_clamp_respects_reported_block_size() {
        assert_eq!(clamp_max_size(100, 512), 1024);
        assert_eq!(clamp_max_size(1536, 512), 1536);
    }
}
