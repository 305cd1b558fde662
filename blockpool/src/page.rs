use std::{alloc::Layout, marker::PhantomData, ptr::NonNull};

use log::debug;

use crate::error::{PoolError, Result};
use crate::patterns::{UNALLOCATED_PATTERN, fill};

/// Singly linked list of raw pages, newest first
///
/// The first pointer-sized slot of every page holds the address of the next
/// page. Pages are never moved or released individually; the whole list is
/// released on drop.
pub struct PageList {
    head: *mut u8,
    layout: Layout,
    len: usize,
}

impl PageList {
    pub fn new(page_size: usize) -> Result<Self> {
        let layout = Layout::from_size_align(page_size, std::mem::align_of::<*mut u8>())
            .map_err(|_| PoolError::InvalidConfig("page size exceeds the address space"))?;

        Ok(Self {
            head: std::ptr::null_mut(),
            layout,
            len: 0,
        })
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    #[inline(always)]
    pub fn head(&self) -> Option<NonNull<u8>> {
        NonNull::new(self.head)
    }

    #[inline(always)]
    pub fn page_size(&self) -> usize {
        self.layout.size()
    }

    /// Allocates a zeroed page and makes it the new head
    ///
    /// With `debug` set, every byte of the page is filled with
    /// [`UNALLOCATED_PATTERN`] before the link is written.
    pub fn new_page(&mut self, max_pages: usize, debug: bool) -> Result<NonNull<u8>> {
        #[cfg(feature = "tracy")]
        let _span = tracy_client::span!("PageList::new_page");

        if self.len >= max_pages {
            return Err(PoolError::OutOfPages { max_pages });
        }

        // SAFETY: layout has a non-zero size, it always includes the link
        let page = NonNull::new(unsafe { std::alloc::alloc_zeroed(self.layout) })
            .ok_or(PoolError::OutOfMemory)?;

        if debug {
            // SAFETY: page was just allocated with layout.size() bytes
            unsafe { fill(page.as_ptr(), UNALLOCATED_PATTERN, self.layout.size()) };
        }

        // SAFETY: page is aligned for a pointer and at least pointer-sized
        unsafe { page.cast::<*mut u8>().write(self.head) };

        self.head = page.as_ptr();
        self.len += 1;

        debug!(
            "New page {:p} ({} bytes), {} pages in use",
            page,
            self.page_size(),
            self.len
        );

        Ok(page)
    }

    pub fn iter(&self) -> Pages<'_> {
        Pages {
            next: self.head,
            _marker: PhantomData,
        }
    }

    /// Base address of the page whose byte range contains `addr`
    pub fn find(&self, addr: usize) -> Option<NonNull<u8>> {
        self.iter().find(|page| {
            let base = page.as_ptr() as usize;
            addr >= base && addr < base + self.layout.size()
        })
    }
}

impl Drop for PageList {
    fn drop(&mut self) {
        let mut current = self.head;
        while !current.is_null() {
            // SAFETY: every page in the list starts with a valid link
            let next = unsafe { *(current as *const *mut u8) };
            // SAFETY: current was allocated with self.layout in new_page
            unsafe { std::alloc::dealloc(current, self.layout) };
            current = next;
        }

        self.head = std::ptr::null_mut();
        self.len = 0;
    }
}

pub struct Pages<'a> {
    next: *mut u8,
    _marker: PhantomData<&'a PageList>,
}

impl Iterator for Pages<'_> {
    type Item = NonNull<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        let page = NonNull::new(self.next)?;
        // SAFETY: pages stay alive while the list is borrowed
        self.next = unsafe { *(page.as_ptr() as *const *mut u8) };
        Some(page)
    }
}
