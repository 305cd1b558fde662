//! Debug fill patterns
//!
//! Written only while debugging is enabled, so stale or overrun bytes are
//! recognisable in a memory dump.

/// Fresh page bytes that were never handed out
pub const UNALLOCATED_PATTERN: u8 = 0xAA;

/// Object bytes right after `allocate`
pub const ALLOCATED_PATTERN: u8 = 0xBB;

/// Object bytes right after `free`
pub const FREED_PATTERN: u8 = 0xCC;

/// Guard bytes on both sides of every object
pub const PAD_PATTERN: u8 = 0xDD;

/// Fill `len` bytes at `ptr` with `pattern`
///
/// # Safety
/// `ptr` must be valid for writes of `len` bytes.
#[inline(always)]
pub unsafe fn fill(ptr: *mut u8, pattern: u8, len: usize) {
    // SAFETY: Caller guarantees ptr is valid for len bytes
    unsafe { std::ptr::write_bytes(ptr, pattern, len) };
}

/// Returns true if all `len` bytes at `ptr` equal `pattern`
///
/// # Safety
/// `ptr` must be valid for reads of `len` bytes.
#[inline(always)]
pub unsafe fn verify(ptr: *const u8, pattern: u8, len: usize) -> bool {
    // SAFETY: Caller guarantees ptr is valid for len bytes
    let bytes = unsafe { std::slice::from_raw_parts(ptr, len) };
    bytes.iter().all(|&b| b == pattern)
}
