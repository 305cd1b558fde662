use std::{alloc::Layout, ptr::NonNull};

use log::{debug, trace, warn};

use crate::config::PoolConfig;
use crate::error::{PoolError, Result};
use crate::free_list::{FreeBlocks, FreeList};
use crate::header::{BlockHeader, ExternalBlockInfo, HeaderManager, Transition};
use crate::layout::BlockLayout;
use crate::page::{PageList, Pages};
use crate::patterns::{ALLOCATED_PATTERN, FREED_PATTERN, fill};
use crate::segment::segment_page;
use crate::stats::PoolStats;
use crate::validate;

/// Fixed-size object allocator backed by a list of pages
///
/// Objects come from an intrusive free list; when it runs dry a new page is
/// allocated (up to `max_pages`) and carved into `objects_per_page` blocks.
/// The most recently freed object is handed out first.
///
/// With `use_system_allocator` set the pool is bypassed and every request
/// goes straight to the global allocator; only the allocation counters are
/// maintained in that mode.
///
/// Not thread-safe. Wrap the whole allocator in a lock if it must be shared.
pub struct ObjectAllocator {
    config: PoolConfig,
    layout: BlockLayout,
    stats: PoolStats,
    pages: PageList,
    free_list: FreeList,
    headers: HeaderManager,
    system_layout: Layout,
}

impl ObjectAllocator {
    /// Builds an allocator for objects of `object_size` bytes
    ///
    /// In pooling mode the first page is allocated eagerly.
    pub fn new(object_size: usize, config: PoolConfig) -> Result<Self> {
        config.validate(object_size)?;

        let layout = BlockLayout::new(object_size, &config)?;
        let system_layout = Layout::array::<u8>(object_size)
            .map_err(|_| PoolError::InvalidConfig("object size exceeds the address space"))?;

        let mut allocator = Self {
            stats: PoolStats::new(object_size, layout.page_size),
            pages: PageList::new(layout.page_size)?,
            free_list: FreeList::new(),
            headers: HeaderManager::new(config.header, &layout),
            layout,
            system_layout,
            config,
        };

        debug!(
            "Object pool: object size {}, block size {}, page size {}, {} per page, max {} pages, header {:?}, pads {}, debug {}",
            object_size,
            layout.block_size,
            layout.page_size,
            allocator.config.objects_per_page,
            allocator.config.max_pages,
            allocator.config.header.kind,
            allocator.config.pad_bytes,
            allocator.config.debug,
        );

        if !allocator.config.use_system_allocator {
            allocator.grow()?;
        }

        Ok(allocator)
    }

    /// Hands out one object
    ///
    /// `label` is stored only by the external header variant.
    pub fn allocate(&mut self, label: Option<&str>) -> Result<NonNull<u8>> {
        #[cfg(feature = "tracy")]
        let _span = tracy_client::span!("ObjectAllocator::allocate");

        if self.config.use_system_allocator {
            return self.allocate_system();
        }

        if self.free_list.is_empty() {
            self.grow()?;
        }

        let object = self.free_list.head().ok_or(PoolError::OutOfMemory)?;
        let alloc_num = self.stats.allocations.wrapping_add(1);

        // SAFETY: object is a block of one of our pages
        unsafe {
            self.headers
                .write(object, Transition::Allocated, alloc_num, label)?
        };

        self.free_list.pop();
        self.stats.record_allocation();
        debug_assert_eq!(self.free_list.len(), self.stats.free_objects);

        if self.config.debug {
            // SAFETY: object spans object_size bytes inside its page
            unsafe { fill(object.as_ptr(), ALLOCATED_PATTERN, self.layout.object_size) };
        }

        trace!("Allocated {:p} (#{})", object, alloc_num);

        Ok(object)
    }

    /// Returns an object to the pool
    ///
    /// While debugging is enabled the address is validated first and any
    /// failure leaves the pool untouched: `BadBoundary` for addresses that
    /// are not a block of this pool, `CorruptedBlock` when the padding was
    /// overwritten, `MultipleFree` when the block is already free.
    ///
    /// # Safety
    /// With debugging disabled `object` must have come from `allocate` on
    /// this allocator and must not have been freed since. With debugging
    /// enabled any address may be passed.
    pub unsafe fn free(&mut self, object: NonNull<u8>) -> Result<()> {
        #[cfg(feature = "tracy")]
        let _span = tracy_client::span!("ObjectAllocator::free");

        if self.config.use_system_allocator {
            // SAFETY: Caller guarantees object came from allocate_system
            unsafe { std::alloc::dealloc(object.as_ptr(), self.system_layout) };
            self.stats.deallocations = self.stats.deallocations.wrapping_add(1);
            return Ok(());
        }

        if self.config.debug {
            validate::check_free(&self.layout, &self.pages, &self.free_list, object)?;
        }

        // SAFETY: validated above, or guaranteed by the caller
        unsafe { self.headers.write(object, Transition::Freed, 0, None)? };

        if self.config.debug {
            // SAFETY: object spans object_size bytes inside its page
            unsafe { fill(object.as_ptr(), FREED_PATTERN, self.layout.object_size) };
        }

        // SAFETY: object is an allocated block, not on the list
        unsafe { self.free_list.push(object) };
        self.stats.record_deallocation();

        trace!("Freed {:p}", object);

        Ok(())
    }

    /// Calls `callback` with the address and size of every block whose
    /// header reports it in use, and returns how many there were
    ///
    /// Without a header nothing tracks in-use state and 0 is returned.
    pub fn dump_memory_in_use<F>(&self, mut callback: F) -> usize
    where
        F: FnMut(NonNull<u8>, usize),
    {
        if !self.headers.tracks_in_use() {
            return 0;
        }

        let mut count = 0;
        for object in self.blocks() {
            // SAFETY: blocks() yields blocks of live pages
            if unsafe { self.headers.in_use(object) } {
                callback(object, self.layout.object_size);
                count += 1;
            }
        }

        count
    }

    /// Calls `callback` for every block whose padding was overwritten and
    /// returns how many there were
    ///
    /// Works with or without a header; returns 0 when no pads are configured.
    pub fn validate_pages<F>(&self, mut callback: F) -> usize
    where
        F: FnMut(NonNull<u8>, usize),
    {
        #[cfg(feature = "tracy")]
        let _span = tracy_client::span!("ObjectAllocator::validate_pages");

        if self.layout.pad_bytes == 0 {
            return 0;
        }

        let mut count = 0;
        for object in self.blocks() {
            // SAFETY: blocks() yields blocks of live pages
            if unsafe { validate::is_corrupted(&self.layout, object) } {
                warn!("Block {:p} has corrupted padding", object);
                callback(object, self.layout.object_size);
                count += 1;
            }
        }

        count
    }

    /// Releasing empty pages is not supported; always returns 0
    pub fn free_empty_pages(&mut self) -> usize {
        0
    }

    /// Whether empty-page release and alignment are supported
    pub fn implemented_extra_credit() -> bool {
        false
    }

    pub fn set_debug_state(&mut self, state: bool) {
        self.config.debug = state;
    }

    /// Head of the free list
    pub fn free_list(&self) -> Option<NonNull<u8>> {
        self.free_list.head()
    }

    /// Most recently created page
    pub fn page_list(&self) -> Option<NonNull<u8>> {
        self.pages.head()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    pub fn stats(&self) -> &PoolStats {
        &self.stats
    }

    pub fn layout(&self) -> &BlockLayout {
        &self.layout
    }

    pub fn object_size(&self) -> usize {
        self.layout.object_size
    }

    pub fn pages(&self) -> Pages<'_> {
        self.pages.iter()
    }

    pub fn free_blocks(&self) -> FreeBlocks<'_> {
        self.free_list.iter()
    }

    /// Decoded header of the block at `object`
    ///
    /// `None` if no header is configured or `object` is not a block of this
    /// pool.
    pub fn header_of(&self, object: NonNull<u8>) -> Option<BlockHeader> {
        validate::locate(&self.layout, &self.pages, object.as_ptr() as usize)?;
        // SAFETY: locate proved object is a block of a live page
        unsafe { self.headers.read(object) }
    }

    /// Out-of-line record of an allocated block (external header variant)
    pub fn external_info(&self, object: NonNull<u8>) -> Option<&ExternalBlockInfo> {
        self.headers.external_record(object)
    }

    fn grow(&mut self) -> Result<()> {
        // Header storage is reserved before the page exists so a failure
        // leaves no unsegmented page behind.
        if self.pages.len() < self.config.max_pages {
            let blocks = (self.pages.len() + 1).saturating_mul(self.layout.objects_per_page);
            self.headers.reserve(blocks)?;
        }

        let page = self.pages.new_page(self.config.max_pages, self.config.debug)?;

        // SAFETY: page is fresh and sized by self.layout
        unsafe { segment_page(page, &self.layout, &mut self.headers, &mut self.free_list)? };

        self.stats.pages_in_use += 1;
        self.stats.free_objects += self.layout.objects_per_page;
        debug_assert_eq!(self.pages.len(), self.stats.pages_in_use);

        Ok(())
    }

    fn allocate_system(&mut self) -> Result<NonNull<u8>> {
        // SAFETY: system_layout has a non-zero size, checked in PoolConfig::validate
        let object = NonNull::new(unsafe { std::alloc::alloc(self.system_layout) })
            .ok_or(PoolError::OutOfMemory)?;

        self.stats.allocations = self.stats.allocations.wrapping_add(1);
        self.stats.most_objects += 1;

        Ok(object)
    }

    fn blocks(&self) -> impl Iterator<Item = NonNull<u8>> + '_ {
        let layout = self.layout;
        self.pages.iter().flat_map(move |page| {
            (0..layout.objects_per_page).map(move |index| {
                // SAFETY: object offsets lie within the page
                unsafe { page.add(layout.object_offset(index)) }
            })
        })
    }
}

impl Drop for ObjectAllocator {
    fn drop(&mut self) {
        if self.stats.objects_in_use > 0 {
            warn!(
                "Dropping object pool with {} objects still in use ({} external records)",
                self.stats.objects_in_use,
                self.headers.live_records()
            );
        }

        if !self.pages.is_empty() {
            debug!(
                "Releasing object pool: {} pages, {} allocations, {} deallocations",
                self.pages.len(),
                self.stats.allocations,
                self.stats.deallocations
            );
        }
    }
}
