//! Page and block layout arithmetic
//!
//! Every address inside a page is derived here. A page looks like:
//!
//! ```text
//! page_base
//!   ├─ next page link             (LINK_SIZE)
//!   ├─ block 0  [header][pad][object][pad]
//!   ├─ block 1  [header][pad][object][pad]
//!   └─ ...      objects_per_page blocks of block_size bytes
//! ```
//!
//! Addresses handed to clients always point at the object region, so most
//! helpers take or return object addresses.

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};

/// Size of the page-list link at the front of each page and of the free-list
/// link threaded through free objects
pub const LINK_SIZE: usize = std::mem::size_of::<usize>();

/// Byte offsets of one block, relative to the page base
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockOffsets {
    pub header: usize,
    pub left_pad: usize,
    pub object: usize,
    pub right_pad: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockLayout {
    pub object_size: usize,
    pub pad_bytes: usize,
    pub header_size: usize,
    pub objects_per_page: usize,
    pub block_size: usize,
    pub page_size: usize,
}

impl BlockLayout {
    pub fn new(object_size: usize, config: &PoolConfig) -> Result<Self> {
        let pad_bytes = config.pad_bytes;
        let header_size = config.header.size;
        let objects_per_page = config.objects_per_page;

        let block_size = Self::block_size_for(object_size, pad_bytes, header_size)
            .ok_or(PoolError::InvalidConfig("block size overflows"))?;
        let page_size = Self::page_size_for(block_size, objects_per_page)
            .ok_or(PoolError::InvalidConfig("page size overflows"))?;

        Ok(Self {
            object_size,
            pad_bytes,
            header_size,
            objects_per_page,
            block_size,
            page_size,
        })
    }

    /// `object_size + 2 * pad_bytes + header_size`
    #[inline(always)]
    pub const fn block_size_for(
        object_size: usize,
        pad_bytes: usize,
        header_size: usize,
    ) -> Option<usize> {
        match pad_bytes.checked_mul(2) {
            Some(pads) => match object_size.checked_add(pads) {
                Some(size) => size.checked_add(header_size),
                None => None,
            },
            None => None,
        }
    }

    /// `LINK_SIZE + block_size * objects_per_page`
    #[inline(always)]
    pub const fn page_size_for(block_size: usize, objects_per_page: usize) -> Option<usize> {
        match block_size.checked_mul(objects_per_page) {
            Some(blocks) => blocks.checked_add(LINK_SIZE),
            None => None,
        }
    }

    #[inline(always)]
    pub const fn block_offset(&self, index: usize) -> usize {
        LINK_SIZE + index * self.block_size
    }

    /// Offset of the object region of block `index` from the page base
    #[inline(always)]
    pub const fn object_offset(&self, index: usize) -> usize {
        self.block_offset(index) + self.header_size + self.pad_bytes
    }

    /// Distance from an object address back to its header
    #[inline(always)]
    pub const fn header_back_offset(&self) -> usize {
        self.header_size + self.pad_bytes
    }

    pub const fn offsets(&self, index: usize) -> BlockOffsets {
        let header = self.block_offset(index);
        let left_pad = header + self.header_size;
        let object = left_pad + self.pad_bytes;
        let right_pad = object + self.object_size;
        let end = right_pad + self.pad_bytes;

        BlockOffsets {
            header,
            left_pad,
            object,
            right_pad,
            end,
        }
    }

    #[inline(always)]
    pub const fn object_addr(&self, page_base: usize, index: usize) -> usize {
        page_base + self.object_offset(index)
    }

    /// Maps an address to its block index within the page at `page_base`
    ///
    /// Returns `None` unless the address lies inside the page and exactly on
    /// the object start of one of its blocks.
    pub fn object_index(&self, page_base: usize, addr: usize) -> Option<usize> {
        let first = page_base + self.object_offset(0);
        let page_end = page_base + self.page_size;

        if addr < first || addr >= page_end {
            return None;
        }

        let delta = addr - first;
        if delta % self.block_size != 0 {
            return None;
        }

        let index = delta / self.block_size;
        debug_assert!(
            index < self.objects_per_page,
            "Block index out of bounds index: {} objects per page: {}",
            index,
            self.objects_per_page
        );

        Some(index)
    }
}
