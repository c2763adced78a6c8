//! Raw memory regions that rings are laid out in.

use core::mem::{align_of, size_of};

/// A borrowed view of a contiguous block of memory.
///
/// `Region` is just a pointer and a length. It does not own the memory and
/// does not keep it alive; whoever produced it (a [`HeapRegion`], an mmap)
/// must outlive every ring built on top of it.
#[derive(Debug, Clone, Copy)]
pub struct Region {
    base: *mut u8,
    len: usize,
}

// SAFETY: Region is a plain address range. Synchronization of the bytes it
// points at is the responsibility of the structures placed inside it.
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Build a region from a raw base pointer and length.
    ///
    /// # Safety
    ///
    /// `base` must be valid for reads and writes of `len` bytes for as long
    /// as the region (or anything built from it) is used.
    pub unsafe fn from_raw(base: *mut u8, len: usize) -> Self {
        Self { base, len }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.base
    }

    /// Pointer to the byte at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset` is past the end of the region.
    #[inline]
    pub fn offset(&self, offset: usize) -> *mut u8 {
        assert!(offset <= self.len, "offset out of bounds");
        // SAFETY: bounds checked above.
        unsafe { self.base.add(offset) }
    }

    /// Reference to a `T` stored at `offset`.
    ///
    /// # Safety
    ///
    /// The bytes at `offset` must hold a valid `T`, and no `&mut` to the same
    /// location may be live.
    #[inline]
    pub unsafe fn get<T>(&self, offset: usize) -> &T {
        self.check::<T>(offset);
        unsafe { &*(self.base.add(offset) as *const T) }
    }

    /// Mutable reference to a `T` stored at `offset`.
    ///
    /// # Safety
    ///
    /// The caller must have exclusive access to the bytes at `offset`.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut<T>(&self, offset: usize) -> &mut T {
        self.check::<T>(offset);
        unsafe { &mut *(self.base.add(offset) as *mut T) }
    }

    #[inline]
    fn check<T>(&self, offset: usize) {
        assert!(
            offset
                .checked_add(size_of::<T>())
                .is_some_and(|end| end <= self.len),
            "region too small"
        );
        assert!(
            (self.base as usize + offset).is_multiple_of(align_of::<T>()),
            "misaligned access"
        );
    }
}

#[cfg(any(test, feature = "alloc"))]
pub use heap::HeapRegion;

#[cfg(any(test, feature = "alloc"))]
mod heap {
    use alloc::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};
    use core::ptr::NonNull;

    use super::Region;

    /// Cache-line alignment for heap-backed regions.
    const REGION_ALIGN: usize = 64;

    /// A zeroed, 64-byte aligned heap allocation that owns its memory.
    pub struct HeapRegion {
        ptr: NonNull<u8>,
        layout: Layout,
    }

    // SAFETY: HeapRegion uniquely owns its allocation.
    unsafe impl Send for HeapRegion {}
    unsafe impl Sync for HeapRegion {}

    impl HeapRegion {
        /// Allocate `size` zeroed bytes, aborting on allocation failure.
        pub fn new_zeroed(size: usize) -> Self {
            let layout = Layout::from_size_align(size.max(1), REGION_ALIGN)
                .unwrap_or_else(|_| panic!("invalid region size {size}"));
            match Self::try_new_zeroed(size) {
                Some(region) => region,
                None => handle_alloc_error(layout),
            }
        }

        /// Allocate `size` zeroed bytes, returning `None` if the allocator
        /// refuses or the size is zero or unrepresentable.
        pub fn try_new_zeroed(size: usize) -> Option<Self> {
            if size == 0 {
                return None;
            }
            let layout = Layout::from_size_align(size, REGION_ALIGN).ok()?;
            // SAFETY: layout has non-zero size.
            let ptr = NonNull::new(unsafe { alloc_zeroed(layout) })?;
            Some(Self { ptr, layout })
        }

        pub fn len(&self) -> usize {
            self.layout.size()
        }

        pub fn is_empty(&self) -> bool {
            self.layout.size() == 0
        }

        /// A borrowed view of the allocation.
        pub fn region(&self) -> Region {
            // SAFETY: the allocation is valid for `len` bytes while self lives.
            unsafe { Region::from_raw(self.ptr.as_ptr(), self.layout.size()) }
        }
    }

    impl Drop for HeapRegion {
        fn drop(&mut self) {
            // SAFETY: ptr was allocated with this layout.
            unsafe { dealloc(self.ptr.as_ptr(), self.layout) }
        }
    }
}
