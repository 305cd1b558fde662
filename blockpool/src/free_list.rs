use std::{marker::PhantomData, ptr::NonNull};

/// Intrusive LIFO list of free objects
///
/// The first pointer-sized bytes of every free object hold the address of
/// the next free object. Objects are not pointer-aligned in general, so the
/// link is always accessed unaligned.
pub struct FreeList {
    head: *mut u8,
    len: usize,
}

impl FreeList {
    pub const fn new() -> Self {
        Self {
            head: std::ptr::null_mut(),
            len: 0,
        }
    }

    #[inline(always)]
    pub fn head(&self) -> Option<NonNull<u8>> {
        NonNull::new(self.head)
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.head.is_null()
    }

    /// Makes `object` the new head
    ///
    /// # Safety
    /// `object` must be valid for writes of a pointer, must not already be on
    /// the list, and its first pointer-sized bytes belong to the list until
    /// it is popped again.
    #[inline(always)]
    pub unsafe fn push(&mut self, object: NonNull<u8>) {
        // SAFETY: Caller guarantees object is writable for a link
        unsafe { object.as_ptr().cast::<*mut u8>().write_unaligned(self.head) };
        self.head = object.as_ptr();
        self.len += 1;
    }

    /// Detaches the head object
    #[inline(always)]
    pub fn pop(&mut self) -> Option<NonNull<u8>> {
        let object = NonNull::new(self.head)?;
        // SAFETY: objects on the list carry a valid link (see push)
        self.head = unsafe { object.as_ptr().cast::<*mut u8>().read_unaligned() };
        self.len -= 1;
        Some(object)
    }

    /// Walks the list looking for `addr`
    pub fn contains(&self, addr: usize) -> bool {
        self.iter().any(|object| object.as_ptr() as usize == addr)
    }

    pub fn iter(&self) -> FreeBlocks<'_> {
        FreeBlocks {
            next: self.head,
            _marker: PhantomData,
        }
    }
}

impl Default for FreeList {
    fn default() -> Self {
        Self::new()
    }
}

pub struct FreeBlocks<'a> {
    next: *mut u8,
    _marker: PhantomData<&'a FreeList>,
}

impl Iterator for FreeBlocks<'_> {
    type Item = NonNull<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        let object = NonNull::new(self.next)?;
        // SAFETY: objects on the list carry a valid link
        self.next = unsafe { object.as_ptr().cast::<*mut u8>().read_unaligned() };
        Some(object)
    }
}
