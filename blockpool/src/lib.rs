//! Fixed-size object pool
//!
//! Hands out objects of one size from pre-allocated pages and can check every
//! free for buffer overruns, double frees and stray pointers.
//!
//! ```text
//! ObjectAllocator
//!   ├─→ PageList     page 2 → page 1 → page 0
//!   ├─→ FreeList     obj ─→ obj ─→ obj   (links live inside free objects)
//!   ├─→ HeaderManager  none | basic | extended | external
//!   └─→ PoolStats
//! ```
//!
//! # Usage
//!
//! ```
//! use blockpool::{HeaderConfig, ObjectAllocator, PoolConfig};
//!
//! let config = PoolConfig::default()
//!     .with_objects_per_page(16)
//!     .with_debug(true)
//!     .with_pad_bytes(4)
//!     .with_header(HeaderConfig::basic());
//!
//! let mut pool = ObjectAllocator::new(32, config).unwrap();
//! let object = pool.allocate(None).unwrap();
//! assert_eq!(pool.dump_memory_in_use(|_, _| {}), 1);
//!
//! unsafe { pool.free(object) }.unwrap();
//! assert!(unsafe { pool.free(object) }.is_err());
//! ```

#![deny(unsafe_op_in_unsafe_fn)]

mod allocator;
mod config;
mod error;
mod free_list;
mod header;
mod layout;
mod page;
pub mod patterns;
mod segment;
mod stats;
mod validate;

pub use allocator::ObjectAllocator;
pub use config::{
    BASIC_HEADER_SIZE, DEFAULT_MAX_PAGES, DEFAULT_OBJECTS_PER_PAGE, EXTENDED_HEADER_SIZE,
    EXTERNAL_HEADER_SIZE, HeaderConfig, HeaderKind, PoolConfig,
};
pub use error::{ErrorCode, PoolError, Result};
pub use free_list::FreeBlocks;
pub use header::{BlockHeader, ExternalBlockInfo};
pub use layout::{BlockLayout, BlockOffsets, LINK_SIZE};
pub use page::Pages;
pub use stats::PoolStats;
