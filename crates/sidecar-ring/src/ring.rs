use core::fmt;
use core::mem::size_of;
use core::ptr;

use crate::region::Region;
use crate::sync::{AtomicU64, Ordering};

/// Size in bytes of [`ByteRingHeader`]; ring data starts right after it.
pub const RING_HEADER_SIZE: usize = size_of::<ByteRingHeader>();

/// Byte ring header (192 bytes, cache-line separated cursors).
#[repr(C)]
pub struct ByteRingHeader {
    /// Write cursor (written by producer, read by consumer).
    pub head: AtomicU64,
    _pad1: [u8; 56],

    /// Read cursor (written by consumer, read by producer).
    pub tail: AtomicU64,
    _pad2: [u8; 56],

    /// Ring capacity in bytes (immutable after init).
    pub capacity: u32,
    _pad3: [u8; 60],
}

#[cfg(not(feature = "loom"))]
const _: () = assert!(size_of::<ByteRingHeader>() == 192);

impl ByteRingHeader {
    /// Initialize a header in place.
    ///
    /// Fields are written without reading or dropping whatever the memory
    /// held before, so this is fine on freshly mapped pages.
    ///
    /// # Safety
    ///
    /// `this` must be valid for writes of `size_of::<ByteRingHeader>()` bytes,
    /// suitably aligned, and not concurrently accessed.
    pub unsafe fn init(this: *mut Self, capacity: u32) {
        assert!(capacity > 0, "capacity must be non-zero");
        unsafe {
            ptr::addr_of_mut!((*this).head).write(AtomicU64::new(0));
            ptr::addr_of_mut!((*this)._pad1).write([0; 56]);
            ptr::addr_of_mut!((*this).tail).write(AtomicU64::new(0));
            ptr::addr_of_mut!((*this)._pad2).write([0; 56]);
            ptr::addr_of_mut!((*this).capacity).write(capacity);
            ptr::addr_of_mut!((*this)._pad3).write([0; 60]);
        }
    }

    /// Bytes currently readable, as seen from either side.
    ///
    /// `head` is loaded before `tail`: the consumer can only move `tail` up to
    /// a `head` that was already published, so the difference never exceeds
    /// the capacity. A `tail` that overtook our stale `head` reads as empty.
    #[inline]
    pub fn len(&self) -> u64 {
        let head = self.head.load(Ordering::Acquire);
        let tail = self.tail.load(Ordering::Acquire);
        head.saturating_sub(tail).min(self.capacity as u64)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A wait-free SPSC byte ring over raw pointers.
///
/// Exactly one producer may call [`write`](Self::write) and exactly one
/// consumer may call [`read`](Self::read), possibly from different threads or
/// processes. Both may call the `available_*` queries at any time.
///
/// The capacity is captured when the view is created and never re-read from
/// shared memory, so a misbehaving peer scribbling over the header cannot make
/// this side copy outside the data area.
#[derive(Debug, Clone, Copy)]
pub struct ByteRingRaw {
    header: *mut ByteRingHeader,
    data: *mut u8,
    capacity: u32,
}

// SAFETY: cursors are atomics with single-writer discipline; data bytes are
// only touched by the side that currently owns that part of the ring.
unsafe impl Send for ByteRingRaw {}
unsafe impl Sync for ByteRingRaw {}

impl ByteRingRaw {
    /// Create a ring view from raw pointers to an initialized header and its
    /// data area.
    ///
    /// # Safety
    ///
    /// `header` must point to an initialized [`ByteRingHeader`] and `data` to
    /// at least `header.capacity` bytes, both valid for the lifetime of the
    /// view.
    pub unsafe fn from_raw(header: *mut ByteRingHeader, data: *mut u8) -> Self {
        let capacity = unsafe { (*header).capacity };
        assert!(capacity > 0, "invalid ring capacity");
        Self {
            header,
            data,
            capacity,
        }
    }

    #[inline]
    fn header(&self) -> &ByteRingHeader {
        unsafe { &*self.header }
    }

    #[inline]
    fn physical(&self, cursor: u64) -> usize {
        let capacity = self.capacity as u64;
        if self.capacity.is_power_of_two() {
            (cursor & (capacity - 1)) as usize
        } else {
            (cursor % capacity) as usize
        }
    }

    /// Append up to `data.len()` bytes, returning how many were written.
    ///
    /// Returns 0 when the ring is full or `data` is empty. Never blocks.
    pub fn write(&self, data: &[u8]) -> u32 {
        if data.is_empty() {
            return 0;
        }

        let header = self.header();
        let capacity = self.capacity as u64;
        let head = header.head.load(Ordering::Relaxed);
        let tail = header.tail.load(Ordering::Acquire);

        let used = head.wrapping_sub(tail).min(capacity);
        let n = (data.len() as u64).min(capacity - used) as usize;
        if n == 0 {
            return 0;
        }

        let pos = self.physical(head);
        let first = n.min(self.capacity as usize - pos);
        // SAFETY: pos + first <= capacity and n - first < capacity; the bytes
        // in [head, head + n) belong to the producer until head is published.
        unsafe {
            ptr::copy_nonoverlapping(data.as_ptr(), self.data.add(pos), first);
            ptr::copy_nonoverlapping(data.as_ptr().add(first), self.data, n - first);
        }

        header
            .head
            .store(head.wrapping_add(n as u64), Ordering::Release);
        n as u32
    }

    /// Copy up to `dest.len()` bytes out of the ring, returning how many were
    /// read.
    ///
    /// Returns 0 when the ring is empty or `dest` is empty. Never blocks.
    pub fn read(&self, dest: &mut [u8]) -> u32 {
        if dest.is_empty() {
            return 0;
        }

        let header = self.header();
        let capacity = self.capacity as u64;
        let tail = header.tail.load(Ordering::Relaxed);
        let head = header.head.load(Ordering::Acquire);

        let available = head.saturating_sub(tail).min(capacity);
        let n = (dest.len() as u64).min(available) as usize;
        if n == 0 {
            return 0;
        }

        let pos = self.physical(tail);
        let first = n.min(self.capacity as usize - pos);
        // SAFETY: same bounds as write; the bytes in [tail, tail + n) were
        // published by the producer's Release store we just Acquired.
        unsafe {
            ptr::copy_nonoverlapping(self.data.add(pos), dest.as_mut_ptr(), first);
            ptr::copy_nonoverlapping(self.data, dest.as_mut_ptr().add(first), n - first);
        }

        header
            .tail
            .store(tail.wrapping_add(n as u64), Ordering::Release);
        n as u32
    }

    /// Snapshot of readable bytes. Advisory only: it may be stale on return.
    #[inline]
    pub fn available_to_read(&self) -> u32 {
        self.header().len().min(self.capacity as u64) as u32
    }

    /// Snapshot of writable bytes. Always `capacity - available_to_read()`
    /// for the same snapshot.
    #[inline]
    pub fn available_to_write(&self) -> u32 {
        self.capacity - self.available_to_read()
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.available_to_read() == 0
    }

    /// Returns a status snapshot of head/tail.
    pub fn status(&self) -> RingStatus {
        let header = self.header();
        let head = header.head.load(Ordering::Acquire);
        let tail = header.tail.load(Ordering::Acquire);
        RingStatus {
            head,
            tail,
            capacity: self.capacity,
            len: head.saturating_sub(tail).min(self.capacity as u64) as u32,
        }
    }
}

/// A byte ring placed at an offset inside a [`Region`].
#[derive(Debug, Clone, Copy)]
pub struct ByteRing {
    raw: ByteRingRaw,
}

impl ByteRing {
    /// Initialize a new ring in the region.
    ///
    /// # Safety
    ///
    /// The region must be writable and exclusively owned during
    /// initialization, and must outlive the returned ring.
    pub unsafe fn init(region: Region, header_offset: usize, capacity: u32) -> Self {
        assert!(capacity > 0, "capacity must be non-zero");
        assert!(
            header_offset.is_multiple_of(64),
            "header_offset must be 64-byte aligned"
        );
        let required = Self::required_size(header_offset, capacity);
        assert!(required <= region.len(), "region too small for ring");

        unsafe {
            let header = region.offset(header_offset) as *mut ByteRingHeader;
            ByteRingHeader::init(header, capacity);
            Self::attach(region, header_offset)
        }
    }

    /// Attach to an existing ring in the region.
    ///
    /// # Safety
    ///
    /// The region must contain an initialized ring header at `header_offset`
    /// and must outlive the returned ring.
    pub unsafe fn attach(region: Region, header_offset: usize) -> Self {
        assert!(
            header_offset.is_multiple_of(64),
            "header_offset must be 64-byte aligned"
        );
        let header = unsafe { region.get::<ByteRingHeader>(header_offset) };
        let capacity = header.capacity;
        assert!(capacity > 0, "invalid ring capacity");
        let required = Self::required_size(header_offset, capacity);
        assert!(required <= region.len(), "region too small for ring");

        let raw = unsafe {
            ByteRingRaw::from_raw(
                region.offset(header_offset) as *mut ByteRingHeader,
                region.offset(header_offset + RING_HEADER_SIZE),
            )
        };
        Self { raw }
    }

    /// Bytes a region needs to hold a ring of `capacity` at `header_offset`.
    pub const fn required_size(header_offset: usize, capacity: u32) -> usize {
        header_offset + RING_HEADER_SIZE + capacity as usize
    }

    #[inline]
    pub fn write(&self, data: &[u8]) -> u32 {
        self.raw.write(data)
    }

    #[inline]
    pub fn read(&self, dest: &mut [u8]) -> u32 {
        self.raw.read(dest)
    }

    #[inline]
    pub fn available_to_read(&self) -> u32 {
        self.raw.available_to_read()
    }

    #[inline]
    pub fn available_to_write(&self) -> u32 {
        self.raw.available_to_write()
    }

    #[inline]
    pub fn capacity(&self) -> u32 {
        self.raw.capacity()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn status(&self) -> RingStatus {
        self.raw.status()
    }
}

/// Anything that can lend out a [`ByteRing`] whose backing memory it keeps
/// alive.
///
/// Lets consumers such as a worker loop hold an `Arc` of a heap ring or of a
/// shared-memory view without caring which one it is.
pub trait AsByteRing: Send + Sync + 'static {
    fn byte_ring(&self) -> &ByteRing;
}

/// Status snapshot of a ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RingStatus {
    pub head: u64,
    pub tail: u64,
    pub capacity: u32,
    pub len: u32,
}

impl fmt::Display for RingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "head={} tail={} len={}/{}",
            self.head, self.tail, self.len, self.capacity
        )
    }
}

#[cfg(any(test, feature = "alloc"))]
pub use owned::RingBuffer;

#[cfg(any(test, feature = "alloc"))]
mod owned {
    use super::{AsByteRing, ByteRing, RING_HEADER_SIZE, RingStatus};
    use crate::error::RingError;
    use crate::region::HeapRegion;

    /// A byte ring that owns its heap storage.
    pub struct RingBuffer {
        ring: ByteRing,
        _storage: HeapRegion,
    }

    impl RingBuffer {
        /// Allocate a ring of `capacity` bytes with `head == tail == 0`.
        pub fn create(capacity: u32) -> Result<Self, RingError> {
            if capacity == 0 {
                return Err(RingError::InvalidArgument("capacity must be non-zero"));
            }
            let size = RING_HEADER_SIZE
                .checked_add(capacity as usize)
                .ok_or(RingError::AllocationError {
                    size: usize::MAX,
                })?;
            let storage =
                HeapRegion::try_new_zeroed(size).ok_or(RingError::AllocationError { size })?;
            // SAFETY: freshly allocated, exclusively owned, and kept alive by
            // `_storage` for as long as `ring` exists.
            let ring = unsafe { ByteRing::init(storage.region(), 0, capacity) };
            Ok(Self {
                ring,
                _storage: storage,
            })
        }

        #[inline]
        pub fn write(&self, data: &[u8]) -> u32 {
            self.ring.write(data)
        }

        #[inline]
        pub fn read(&self, dest: &mut [u8]) -> u32 {
            self.ring.read(dest)
        }

        #[inline]
        pub fn available_to_read(&self) -> u32 {
            self.ring.available_to_read()
        }

        #[inline]
        pub fn available_to_write(&self) -> u32 {
            self.ring.available_to_write()
        }

        #[inline]
        pub fn capacity(&self) -> u32 {
            self.ring.capacity()
        }

        #[inline]
        pub fn is_empty(&self) -> bool {
            self.ring.is_empty()
        }

        pub fn status(&self) -> RingStatus {
            self.ring.status()
        }
    }

    impl AsByteRing for RingBuffer {
        fn byte_ring(&self) -> &ByteRing {
            &self.ring
        }
    }

    impl core::fmt::Debug for RingBuffer {
        fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
            f.debug_struct("RingBuffer")
                .field("status", &self.status())
                .finish_non_exhaustive()
        }
    }
}

impl AsByteRing for ByteRing {
    fn byte_ring(&self) -> &ByteRing {
        self
    }
}
