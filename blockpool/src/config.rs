//! Pool configuration and header variants

use crate::error::{PoolError, Result};

pub const DEFAULT_OBJECTS_PER_PAGE: usize = 4;
pub const DEFAULT_MAX_PAGES: usize = 3;

/// Allocation sequence number width inside basic and extended headers
pub const ALLOC_NUM_SIZE: usize = std::mem::size_of::<u32>();
/// Use counter width inside extended headers
pub const USE_COUNT_SIZE: usize = std::mem::size_of::<u16>();
/// In-use flag width
pub const FLAG_SIZE: usize = 1;

pub const BASIC_HEADER_SIZE: usize = ALLOC_NUM_SIZE + FLAG_SIZE;
pub const EXTENDED_HEADER_SIZE: usize = USE_COUNT_SIZE + ALLOC_NUM_SIZE + FLAG_SIZE;
pub const EXTERNAL_HEADER_SIZE: usize = std::mem::size_of::<usize>();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HeaderKind {
    #[default]
    None,
    Basic,
    Extended,
    External,
}

/// Per-block header description
///
/// `size` is the full byte size of the header region in front of the left
/// padding. For [`HeaderKind::Extended`] it includes `additional` user bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HeaderConfig {
    pub kind: HeaderKind,
    pub size: usize,
    pub additional: usize,
}

impl HeaderConfig {
    pub const fn none() -> Self {
        Self {
            kind: HeaderKind::None,
            size: 0,
            additional: 0,
        }
    }

    pub const fn basic() -> Self {
        Self {
            kind: HeaderKind::Basic,
            size: BASIC_HEADER_SIZE,
            additional: 0,
        }
    }

    /// Extended header with `additional` user-reserved bytes at its front
    pub const fn extended(additional: usize) -> Self {
        Self {
            kind: HeaderKind::Extended,
            size: additional + EXTENDED_HEADER_SIZE,
            additional,
        }
    }

    pub const fn external() -> Self {
        Self {
            kind: HeaderKind::External,
            size: EXTERNAL_HEADER_SIZE,
            additional: 0,
        }
    }

    pub const fn is_none(&self) -> bool {
        matches!(self.kind, HeaderKind::None)
    }

    fn expected_size(&self) -> usize {
        match self.kind {
            HeaderKind::None => 0,
            HeaderKind::Basic => BASIC_HEADER_SIZE,
            HeaderKind::Extended => self.additional + EXTENDED_HEADER_SIZE,
            HeaderKind::External => EXTERNAL_HEADER_SIZE,
        }
    }
}

/// Allocator configuration
///
/// Fixed for the allocator's lifetime, apart from the debug flag which can be
/// toggled through `ObjectAllocator::set_debug_state`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoolConfig {
    /// Forward every request to the system allocator instead of pooling
    pub use_system_allocator: bool,
    pub objects_per_page: usize,
    pub max_pages: usize,
    /// Fill patterns, padding checks and free-time validation
    pub debug: bool,
    /// Guard bytes on each side of the object
    pub pad_bytes: usize,
    pub header: HeaderConfig,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            use_system_allocator: false,
            objects_per_page: DEFAULT_OBJECTS_PER_PAGE,
            max_pages: DEFAULT_MAX_PAGES,
            debug: false,
            pad_bytes: 0,
            header: HeaderConfig::none(),
        }
    }
}

impl PoolConfig {
    pub fn with_system_allocator(mut self, enabled: bool) -> Self {
        self.use_system_allocator = enabled;
        self
    }

    pub fn with_objects_per_page(mut self, objects_per_page: usize) -> Self {
        self.objects_per_page = objects_per_page;
        self
    }

    pub fn with_max_pages(mut self, max_pages: usize) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_pad_bytes(mut self, pad_bytes: usize) -> Self {
        self.pad_bytes = pad_bytes;
        self
    }

    pub fn with_header(mut self, header: HeaderConfig) -> Self {
        self.header = header;
        self
    }

    /// Rejects configurations the pool cannot lay out
    pub fn validate(&self, object_size: usize) -> Result<()> {
        if object_size == 0 {
            return Err(PoolError::InvalidConfig("object size must be non-zero"));
        }

        if self.use_system_allocator {
            return Ok(());
        }

        if self.objects_per_page == 0 {
            return Err(PoolError::InvalidConfig(
                "objects per page must be non-zero",
            ));
        }

        if object_size < std::mem::size_of::<usize>() {
            return Err(PoolError::InvalidConfig(
                "object size must hold a free-list link",
            ));
        }

        if self.header.size != self.header.expected_size() {
            return Err(PoolError::InvalidConfig(
                "header size does not match its variant",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_sizes() {
        assert_eq!(HeaderConfig::none().size, 0);
        assert_eq!(HeaderConfig::basic().size, 5);
        assert_eq!(HeaderConfig::extended(0).size, 7);
        assert_eq!(HeaderConfig::extended(4).size, 11);
        assert_eq!(
            HeaderConfig::external().size,
            std::mem::size_of::<usize>()
        );
    }

    #[test]
    fn test_defaults() {
        let config = PoolConfig::default();
        assert!(!config.use_system_allocator);
        assert_eq!(config.objects_per_page, DEFAULT_OBJECTS_PER_PAGE);
        assert_eq!(config.max_pages, DEFAULT_MAX_PAGES);
        assert!(!config.debug);
        assert_eq!(config.pad_bytes, 0);
        assert!(config.header.is_none());
    }

    #[test]
    fn test_validate_rejects_degenerate() {
        let config = PoolConfig::default();
        assert!(config.validate(0).is_err());
        assert!(config.validate(1).is_err());
        assert!(config.validate(16).is_ok());

        let empty_pages = PoolConfig::default().with_objects_per_page(0);
        assert_eq!(
            empty_pages.validate(16),
            Err(PoolError::InvalidConfig("objects per page must be non-zero"))
        );

        let mut bad_header = PoolConfig::default().with_header(HeaderConfig::basic());
        bad_header.header.size = 3;
        assert!(bad_header.validate(16).is_err());
    }

    #[test]
    fn test_validate_system_allocator_allows_small_objects() {
        let config = PoolConfig::default()
            .with_system_allocator(true)
            .with_objects_per_page(0);
        assert!(config.validate(1).is_ok());
    }
}
