use std::ptr::NonNull;

use crate::error::Result;
use crate::free_list::FreeList;
use crate::header::{HeaderManager, Transition};
use crate::layout::BlockLayout;
use crate::patterns::{PAD_PATTERN, fill};

/// Carves a fresh page into blocks and threads them onto the free list
///
/// Blocks are visited in ascending address order, so the last block of the
/// page ends up at the head of the free list. Both pad regions of every
/// block are filled with [`PAD_PATTERN`] whether or not debugging is on, so
/// padding can be checked after debugging is switched on later.
///
/// # Safety
/// `page` must be a live page of `layout.page_size` bytes whose blocks are
/// not on any free list yet.
pub unsafe fn segment_page(
    page: NonNull<u8>,
    layout: &BlockLayout,
    headers: &mut HeaderManager,
    free_list: &mut FreeList,
) -> Result<()> {
    let base = page.as_ptr();

    for index in 0..layout.objects_per_page {
        let offsets = layout.offsets(index);

        // SAFETY: all offsets lie within the page per the layout
        let object = unsafe { NonNull::new_unchecked(base.add(offsets.object)) };

        if layout.pad_bytes > 0 {
            // SAFETY: both pad regions lie within the page
            unsafe {
                fill(base.add(offsets.left_pad), PAD_PATTERN, layout.pad_bytes);
                fill(base.add(offsets.right_pad), PAD_PATTERN, layout.pad_bytes);
            }
        }

        // SAFETY: object is a block of this page
        unsafe { headers.write(object, Transition::Init, 0, None)? };
        // SAFETY: object is a fresh block, at least a link wide
        unsafe { free_list.push(object) };
    }

    Ok(())
}
