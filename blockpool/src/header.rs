//! Per-block header metadata
//!
//! The header sits in front of the left padding of every block. Its byte
//! layout depends on the configured variant:
//!
//! ```text
//! Basic     [alloc_num: u32][in_use: u8]
//! Extended  [reserved: additional][use_count: u16][alloc_num: u32][in_use: u8]
//! External  [record key: usize]
//! ```
//!
//! Integers are stored unaligned in native byte order. External records are
//! held by value in a table keyed by object address. The header slot holds
//! that key while a record is alive and zero otherwise, so a raw memory dump
//! still shows which blocks carry one.

use std::ptr::NonNull;

use byteorder::{ByteOrder, NativeEndian};
use rustc_hash::FxHashMap;

use crate::config::{ALLOC_NUM_SIZE, HeaderConfig, HeaderKind, USE_COUNT_SIZE};
use crate::error::Result;
use crate::layout::BlockLayout;

/// Header state change applied by [`HeaderManager::write`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First initialisation while a fresh page is segmented
    Init,
    Allocated,
    Freed,
}

/// Out-of-line metadata for the external header variant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalBlockInfo {
    pub in_use: bool,
    pub alloc_num: u32,
    pub label: Option<String>,
}

/// Decoded view of one block header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockHeader {
    pub kind: HeaderKind,
    pub alloc_num: u32,
    pub in_use: bool,
    /// Extended headers only
    pub use_count: Option<u16>,
    /// External headers only
    pub label: Option<String>,
}

pub struct HeaderManager {
    config: HeaderConfig,
    back_offset: usize,
    records: FxHashMap<usize, ExternalBlockInfo>,
}

impl HeaderManager {
    pub fn new(config: HeaderConfig, layout: &BlockLayout) -> Self {
        debug_assert_eq!(config.size, layout.header_size);

        Self {
            config,
            back_offset: layout.header_back_offset(),
            records: FxHashMap::default(),
        }
    }

    #[inline(always)]
    pub fn kind(&self) -> HeaderKind {
        self.config.kind
    }

    /// True when the variant records whether a block is in use
    #[inline(always)]
    pub fn tracks_in_use(&self) -> bool {
        !self.config.is_none()
    }

    /// External records currently alive
    pub fn live_records(&self) -> usize {
        self.records.len()
    }

    /// Makes room for external records of `blocks` blocks in total
    ///
    /// Inserting a record never allocates afterwards, as long as no more
    /// than `blocks` records are alive.
    pub fn reserve(&mut self, blocks: usize) -> Result<()> {
        if self.config.kind == HeaderKind::External {
            let additional = blocks.saturating_sub(self.records.len());
            self.records.try_reserve(additional)?;
        }

        Ok(())
    }

    /// # Safety
    /// `object` must be the object address of a block inside a live page.
    #[inline(always)]
    unsafe fn bytes(&self, object: NonNull<u8>) -> &[u8] {
        // SAFETY: Caller guarantees the header precedes object inside a page
        unsafe {
            let start = object.as_ptr().sub(self.back_offset);
            std::slice::from_raw_parts(start, self.config.size)
        }
    }

    /// # Safety
    /// `object` must be the object address of a block inside a live page.
    #[inline(always)]
    unsafe fn bytes_mut(&mut self, object: NonNull<u8>) -> &mut [u8] {
        // SAFETY: Caller guarantees the header precedes object inside a page
        unsafe {
            let start = object.as_ptr().sub(self.back_offset);
            std::slice::from_raw_parts_mut(start, self.config.size)
        }
    }

    /// Applies `transition` to the header of the block at `object`
    ///
    /// `alloc_num` and `label` are only used for [`Transition::Allocated`].
    /// Fails with `OutOfMemory` when the label of an external record cannot
    /// be allocated; the header is left untouched in that case. Record slots
    /// themselves come from [`HeaderManager::reserve`].
    ///
    /// # Safety
    /// `object` must be the object address of a block inside a live page.
    pub unsafe fn write(
        &mut self,
        object: NonNull<u8>,
        transition: Transition,
        alloc_num: u32,
        label: Option<&str>,
    ) -> Result<()> {
        match self.config.kind {
            HeaderKind::None => {}
            HeaderKind::Basic => {
                // SAFETY: forwarded from caller
                let bytes = unsafe { self.bytes_mut(object) };
                bytes.fill(0);

                if transition == Transition::Allocated {
                    NativeEndian::write_u32(&mut bytes[..ALLOC_NUM_SIZE], alloc_num);
                    bytes[ALLOC_NUM_SIZE] = 1;
                }
            }
            HeaderKind::Extended => {
                let counter = self.config.additional;
                let number = counter + USE_COUNT_SIZE;
                let flag = number + ALLOC_NUM_SIZE;
                // SAFETY: forwarded from caller
                let bytes = unsafe { self.bytes_mut(object) };

                match transition {
                    Transition::Init => bytes.fill(0),
                    Transition::Allocated => {
                        bytes[..counter].fill(0);
                        let uses = NativeEndian::read_u16(&bytes[counter..number]);
                        NativeEndian::write_u16(&mut bytes[counter..number], uses.wrapping_add(1));
                        NativeEndian::write_u32(&mut bytes[number..flag], alloc_num);
                        bytes[flag] = 1;
                    }
                    // Use counter and reserved bytes survive a free.
                    Transition::Freed => bytes[number..].fill(0),
                }
            }
            HeaderKind::External => {
                let key = object.as_ptr() as usize;

                match transition {
                    Transition::Init => {
                        // SAFETY: forwarded from caller
                        unsafe { self.bytes_mut(object) }.fill(0);
                    }
                    Transition::Allocated => {
                        let label = match label {
                            Some(label) => {
                                let mut owned = String::new();
                                owned.try_reserve_exact(label.len())?;
                                owned.push_str(label);
                                Some(owned)
                            }
                            None => None,
                        };

                        debug_assert!(self.records.len() < self.records.capacity());

                        // SAFETY: forwarded from caller
                        unsafe { self.bytes_mut(object) }.copy_from_slice(&key.to_ne_bytes());
                        self.records.insert(
                            key,
                            ExternalBlockInfo {
                                in_use: true,
                                alloc_num,
                                label,
                            },
                        );
                    }
                    Transition::Freed => {
                        self.records.remove(&key);
                        // SAFETY: forwarded from caller
                        unsafe { self.bytes_mut(object) }.fill(0);
                    }
                }
            }
        }

        Ok(())
    }

    /// Reads the in-use flag of the block at `object`
    ///
    /// Always false when no header is configured.
    ///
    /// # Safety
    /// `object` must be the object address of a block inside a live page.
    pub unsafe fn in_use(&self, object: NonNull<u8>) -> bool {
        match self.config.kind {
            HeaderKind::None => false,
            HeaderKind::Basic | HeaderKind::Extended => {
                // SAFETY: forwarded from caller
                let bytes = unsafe { self.bytes(object) };
                bytes[bytes.len() - 1] != 0
            }
            HeaderKind::External => self
                .records
                .get(&(object.as_ptr() as usize))
                .is_some_and(|record| record.in_use),
        }
    }

    /// Decodes the header of the block at `object`
    ///
    /// # Safety
    /// `object` must be the object address of a block inside a live page.
    pub unsafe fn read(&self, object: NonNull<u8>) -> Option<BlockHeader> {
        let kind = self.kind();

        match kind {
            HeaderKind::None => None,
            HeaderKind::Basic => {
                // SAFETY: forwarded from caller
                let bytes = unsafe { self.bytes(object) };
                Some(BlockHeader {
                    kind,
                    alloc_num: NativeEndian::read_u32(&bytes[..ALLOC_NUM_SIZE]),
                    in_use: bytes[ALLOC_NUM_SIZE] != 0,
                    use_count: None,
                    label: None,
                })
            }
            HeaderKind::Extended => {
                // SAFETY: forwarded from caller
                let bytes = unsafe { self.bytes(object) };
                let counter = self.config.additional;
                let number = counter + USE_COUNT_SIZE;
                let flag = number + ALLOC_NUM_SIZE;

                Some(BlockHeader {
                    kind,
                    alloc_num: NativeEndian::read_u32(&bytes[number..flag]),
                    in_use: bytes[flag] != 0,
                    use_count: Some(NativeEndian::read_u16(&bytes[counter..number])),
                    label: None,
                })
            }
            HeaderKind::External => {
                let record = self.records.get(&(object.as_ptr() as usize));
                Some(BlockHeader {
                    kind,
                    alloc_num: record.map_or(0, |record| record.alloc_num),
                    in_use: record.is_some_and(|record| record.in_use),
                    use_count: None,
                    label: record.and_then(|record| record.label.clone()),
                })
            }
        }
    }

    /// Out-of-line record of the block at `object`, if one is alive
    pub fn external_record(&self, object: NonNull<u8>) -> Option<&ExternalBlockInfo> {
        self.records.get(&(object.as_ptr() as usize))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::layout::LINK_SIZE;

    /// One-block page backed by a Vec, header at the front
    struct Fixture {
        page: Vec<u8>,
        layout: BlockLayout,
        manager: HeaderManager,
    }

    impl Fixture {
        fn new(header: HeaderConfig, pad_bytes: usize) -> Self {
            let config = PoolConfig::default()
                .with_header(header)
                .with_pad_bytes(pad_bytes)
                .with_objects_per_page(1);
            let layout = BlockLayout::new(16, &config).unwrap();
            let mut manager = HeaderManager::new(header, &layout);
            manager.reserve(1).unwrap();

            Self {
                page: vec![0xFF; layout.page_size],
                layout,
                manager,
            }
        }

        fn object(&mut self) -> NonNull<u8> {
            let offset = self.layout.object_offset(0);
            NonNull::new(unsafe { self.page.as_mut_ptr().add(offset) }).unwrap()
        }

        fn header_bytes(&self) -> &[u8] {
            let start = LINK_SIZE;
            &self.page[start..start + self.layout.header_size]
        }

        fn write(&mut self, transition: Transition, alloc_num: u32, label: Option<&str>) {
            let object = self.object();
            unsafe { self.manager.write(object, transition, alloc_num, label) }.unwrap();
        }

        fn read(&mut self) -> Option<BlockHeader> {
            let object = self.object();
            unsafe { self.manager.read(object) }
        }

        fn in_use(&mut self) -> bool {
            let object = self.object();
            unsafe { self.manager.in_use(object) }
        }
    }

    #[test]
    fn test_none_is_noop() {
        let mut fixture = Fixture::new(HeaderConfig::none(), 0);
        fixture.write(Transition::Allocated, 1, None);

        assert!(!fixture.in_use());
        assert_eq!(fixture.read(), None);
        assert!(!fixture.manager.tracks_in_use());
    }

    #[test]
    fn test_basic_lifecycle() {
        let mut fixture = Fixture::new(HeaderConfig::basic(), 2);

        fixture.write(Transition::Init, 0, None);
        assert!(fixture.header_bytes().iter().all(|&b| b == 0));

        fixture.write(Transition::Allocated, 7, None);
        assert!(fixture.in_use());
        let mut expected = [0u8; 5];
        NativeEndian::write_u32(&mut expected[..4], 7);
        expected[4] = 1;
        assert_eq!(fixture.header_bytes(), &expected);

        fixture.write(Transition::Freed, 0, None);
        assert!(!fixture.in_use());
        assert!(fixture.header_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_extended_use_counter_survives_free() {
        let mut fixture = Fixture::new(HeaderConfig::extended(3), 1);
        fixture.write(Transition::Init, 0, None);

        for round in 1..=4u32 {
            fixture.write(Transition::Allocated, round * 10, None);
            let header = fixture.read().unwrap();
            assert!(header.in_use);
            assert_eq!(header.use_count, Some(round as u16));
            assert_eq!(header.alloc_num, round * 10);

            fixture.write(Transition::Freed, 0, None);
            let header = fixture.read().unwrap();
            assert!(!header.in_use);
            assert_eq!(header.alloc_num, 0);
            assert_eq!(header.use_count, Some(round as u16));
        }
    }

    #[test]
    fn test_extended_reserved_bytes_only_cleared_on_allocate() {
        let mut fixture = Fixture::new(HeaderConfig::extended(2), 0);
        fixture.write(Transition::Init, 0, None);

        // Client scribbles into its reserved bytes while the block is free.
        fixture.page[LINK_SIZE] = 0x42;
        fixture.page[LINK_SIZE + 1] = 0x43;

        fixture.write(Transition::Freed, 0, None);
        assert_eq!(&fixture.header_bytes()[..2], &[0x42, 0x43]);

        fixture.write(Transition::Allocated, 1, None);
        assert_eq!(&fixture.header_bytes()[..2], &[0, 0]);
    }

    #[test]
    fn test_external_record_lifecycle() {
        let mut fixture = Fixture::new(HeaderConfig::external(), 0);
        fixture.write(Transition::Init, 0, None);
        assert!(fixture.header_bytes().iter().all(|&b| b == 0));
        assert!(!fixture.in_use());

        fixture.write(Transition::Allocated, 3, Some("player"));
        assert!(fixture.in_use());
        assert_eq!(fixture.manager.live_records(), 1);

        let object = fixture.object();
        let record = fixture.manager.external_record(object).unwrap();
        assert_eq!(record.label.as_deref(), Some("player"));
        assert_eq!(record.alloc_num, 3);

        let key = object.as_ptr() as usize;
        assert_eq!(fixture.header_bytes(), &key.to_ne_bytes());

        let header = fixture.read().unwrap();
        assert_eq!(header.label.as_deref(), Some("player"));

        fixture.write(Transition::Freed, 0, None);
        assert!(!fixture.in_use());
        assert_eq!(fixture.manager.live_records(), 0);
        assert!(fixture.header_bytes().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_external_without_label() {
        let mut fixture = Fixture::new(HeaderConfig::external(), 4);
        fixture.write(Transition::Init, 0, None);
        fixture.write(Transition::Allocated, 9, None);

        let header = fixture.read().unwrap();
        assert!(header.in_use);
        assert_eq!(header.alloc_num, 9);
        assert_eq!(header.label, None);
    }

    #[test]
    fn test_reserve_covers_every_block() {
        let config = PoolConfig::default()
            .with_header(HeaderConfig::external())
            .with_objects_per_page(8);
        let layout = BlockLayout::new(16, &config).unwrap();
        let mut page = vec![0u8; layout.page_size];
        let mut manager = HeaderManager::new(config.header, &layout);

        manager.reserve(8).unwrap();
        let capacity = manager.records.capacity();
        assert!(capacity >= 8);

        let base = page.as_mut_ptr() as usize;
        for index in 0..8 {
            let object = NonNull::new(layout.object_addr(base, index) as *mut u8).unwrap();
            unsafe { manager.write(object, Transition::Allocated, index as u32, None) }.unwrap();
        }

        assert_eq!(manager.live_records(), 8);
        assert_eq!(manager.records.capacity(), capacity);
    }

    #[test]
    fn test_reserve_is_noop_for_inline_headers() {
        let config = PoolConfig::default().with_header(HeaderConfig::basic());
        let layout = BlockLayout::new(16, &config).unwrap();
        let mut manager = HeaderManager::new(config.header, &layout);

        manager.reserve(64).unwrap();
        assert_eq!(manager.records.capacity(), 0);
    }
}
