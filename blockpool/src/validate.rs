//! Block integrity checks
//!
//! All predicates take the object address of a block, the same address that
//! `allocate` hands out.

use std::ptr::NonNull;

use log::warn;

use crate::error::{PoolError, Result};
use crate::free_list::FreeList;
use crate::layout::BlockLayout;
use crate::page::PageList;
use crate::patterns::{PAD_PATTERN, verify};

/// Returns true if any pad byte on either side of `object` was overwritten
///
/// # Safety
/// `object` must be the object address of a block inside a live page.
pub unsafe fn is_corrupted(layout: &BlockLayout, object: NonNull<u8>) -> bool {
    let pad = layout.pad_bytes;
    if pad == 0 {
        return false;
    }

    // SAFETY: Caller guarantees both pad regions lie inside the page
    unsafe {
        let left = object.as_ptr().sub(pad);
        let right = object.as_ptr().add(layout.object_size);
        !verify(left, PAD_PATTERN, pad) || !verify(right, PAD_PATTERN, pad)
    }
}

/// Returns true if `addr` is already on the free list
pub fn is_free(free_list: &FreeList, addr: usize) -> bool {
    free_list.contains(addr)
}

/// Finds the page and block index `addr` belongs to
///
/// The address must lie inside a page and exactly on the object start of one
/// of its blocks. Pages never overlap, so at most one page can contain it.
pub fn locate(
    layout: &BlockLayout,
    pages: &PageList,
    addr: usize,
) -> Option<(NonNull<u8>, usize)> {
    let page = pages.find(addr)?;
    let index = layout.object_index(page.as_ptr() as usize, addr)?;
    Some((page, index))
}

/// Checks run on `free` while debugging is enabled
///
/// The boundary check runs first because the padding of an address outside
/// every page cannot be read. Padding is only checked when pads are
/// configured.
pub fn check_free(
    layout: &BlockLayout,
    pages: &PageList,
    free_list: &FreeList,
    object: NonNull<u8>,
) -> Result<()> {
    let address = object.as_ptr() as usize;

    if locate(layout, pages, address).is_none() {
        warn!("Bad boundary: {:#x} is not a block of this pool", address);
        return Err(PoolError::BadBoundary { address });
    }

    // SAFETY: locate proved object is a block inside a live page
    if layout.pad_bytes > 0 && unsafe { is_corrupted(layout, object) } {
        warn!("Corrupted padding around block {:#x}", address);
        return Err(PoolError::CorruptedBlock { address });
    }

    if is_free(free_list, address) {
        warn!("Multiple free of block {:#x}", address);
        return Err(PoolError::MultipleFree { address });
    }

    Ok(())
}
