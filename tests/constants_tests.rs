//! Tests for capture constants.
//!
//! Validates that the sizing bounds hold together and that maximum-size
//! coercion produces usable values.

use ringtail::{
    DEFAULT_MAX_SIZE, FALLBACK_BLOCK_SIZE, MIN_BLOCKS, READ_BUF_SIZE, TERM_ACK_TIMEOUT,
    clamp_max_size,
};
use std::time::Duration;

// =============================================================================
// Sizing Bound Tests
// =============================================================================

#[test]
fn test_fallback_block_size_is_sector_shaped() {
    assert!(FALLBACK_BLOCK_SIZE.is_power_of_two());
    assert!(FALLBACK_BLOCK_SIZE >= 512, "below any real sector size");
}

#[test]
fn test_minimum_leaves_room_for_one_buffer_plus_one_block() {
    // One read buffer must fit beside a trimmable block, otherwise a
    // single append could require collapsing the whole file.
    assert!(MIN_BLOCKS >= 2);
    assert!(MIN_BLOCKS * FALLBACK_BLOCK_SIZE >= READ_BUF_SIZE as u64 + FALLBACK_BLOCK_SIZE);
}

#[test]
fn test_default_max_is_block_aligned_and_above_floor() {
    assert_eq!(DEFAULT_MAX_SIZE % FALLBACK_BLOCK_SIZE, 0);
    assert!(DEFAULT_MAX_SIZE >= MIN_BLOCKS * FALLBACK_BLOCK_SIZE);
}

#[test]
fn test_ack_timeout_is_bounded() {
    assert!(TERM_ACK_TIMEOUT >= Duration::from_secs(1));
    assert!(TERM_ACK_TIMEOUT <= Duration::from_secs(60));
}

// =============================================================================
// Coercion Tests
// =============================================================================

#[test]
fn test_tiny_request_yields_two_blocks() {
    // Requesting 100 bytes on a 4096-byte block system yields 8192.
    assert_eq!(clamp_max_size(100, 4096), 8192);
}

#[test]
fn test_unaligned_request_rounds_down() {
    assert_eq!(clamp_max_size(10_000, 4096), 8192);
    assert_eq!(clamp_max_size(4 * 4096 + 4095, 4096), 4 * 4096);
}

#[test]
fn test_aligned_request_is_kept() {
    assert_eq!(clamp_max_size(16 * 4096, 4096), 16 * 4096);
}
