//! Error types for the object pool

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PoolError>;

/// Errors raised by the object pool
///
/// Validation errors (`CorruptedBlock`, `MultipleFree`, `BadBoundary`) are only
/// produced while debugging is enabled. They abort the operation but leave the
/// pool usable.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// The system allocator refused a page, an object or a header record
    #[error("out of memory")]
    OutOfMemory,
    /// The configured page ceiling has been reached
    #[error("out of pages: limit of {max_pages} pages reached")]
    OutOfPages { max_pages: usize },
    /// A pad byte around the object no longer holds the pad pattern
    #[error("corrupted block at {address:#x}: padding was overwritten")]
    CorruptedBlock { address: usize },
    /// The object is already on the free list
    #[error("multiple free of block at {address:#x}")]
    MultipleFree { address: usize },
    /// The address is outside every page or not on a block boundary
    #[error("bad boundary: {address:#x} is not a block inside any page")]
    BadBoundary { address: usize },
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

/// Stable classification of [`PoolError`] values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoMemory,
    NoPages,
    BadBoundary,
    MultipleFree,
    CorruptedBlock,
    InvalidConfig,
}

impl PoolError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::OutOfMemory => ErrorCode::NoMemory,
            Self::OutOfPages { .. } => ErrorCode::NoPages,
            Self::CorruptedBlock { .. } => ErrorCode::CorruptedBlock,
            Self::MultipleFree { .. } => ErrorCode::MultipleFree,
            Self::BadBoundary { .. } => ErrorCode::BadBoundary,
            Self::InvalidConfig(_) => ErrorCode::InvalidConfig,
        }
    }

    /// True for errors produced by the debug validator on `free`
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::CorruptedBlock { .. } | Self::MultipleFree { .. } | Self::BadBoundary { .. }
        )
    }
}

impl From<std::collections::TryReserveError> for PoolError {
    fn from(_: std::collections::TryReserveError) -> Self {
        PoolError::OutOfMemory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(PoolError::OutOfMemory.code(), ErrorCode::NoMemory);
        assert_eq!(
            PoolError::OutOfPages { max_pages: 3 }.code(),
            ErrorCode::NoPages
        );
        assert_eq!(
            PoolError::MultipleFree { address: 0x10 }.code(),
            ErrorCode::MultipleFree
        );
        assert!(PoolError::BadBoundary { address: 0 }.is_validation());
        assert!(!PoolError::OutOfMemory.is_validation());
    }

    #[test]
    fn test_error_display() {
        let err = PoolError::CorruptedBlock { address: 0x1000 };
        assert_eq!(
            err.to_string(),
            "corrupted block at 0x1000: padding was overwritten"
        );
        assert_eq!(
            PoolError::OutOfPages { max_pages: 2 }.to_string(),
            "out of pages: limit of 2 pages reached"
        );
    }

    #[test]
    fn test_try_reserve_maps_to_out_of_memory() {
        let mut v: Vec<u8> = Vec::new();
        let err = v.try_reserve(usize::MAX).unwrap_err();
        assert_eq!(PoolError::from(err), PoolError::OutOfMemory);
    }
}
