//! Named shared memory regions.
//!
//! - `SharedRegion::create`: called by the host; allocates and zero-fills a
//!   new POSIX shm object and writes the headers
//! - `SharedRegion::open`: called by the sidecar; attaches to an existing
//!   object and recovers the capacity from its header

use std::ffi::CString;
use std::fs::File;
use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd};
use std::sync::Arc;

use sidecar_ring::{AsByteRing, ByteRing, ByteRingHeader, Region, RingStatus};

use crate::RegionError;
use crate::layout::{RING_OFFSET, RegionHeader, region_size};

/// Longest accepted name, excluding the leading `/`.
const MAX_NAME_LEN: usize = 250;

/// One process-local mapping of a shared region.
struct Mapping {
    /// Base address of the mapping.
    base_addr: *mut u8,
    /// Size of the mapping.
    size: usize,
    /// The shm object (kept open for the lifetime of the mapping).
    _file: File,
}

// SAFETY: Mapping is Send + Sync because the ring inside is synchronized via
// atomics, and the header is immutable after creation.
unsafe impl Send for Mapping {}
unsafe impl Sync for Mapping {}

impl Mapping {
    fn map(file: File, size: usize) -> io::Result<Self> {
        let base_addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                file.as_raw_fd(),
                0,
            )
        };

        if base_addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }

        Ok(Self {
            base_addr: base_addr as *mut u8,
            size,
            _file: file,
        })
    }

    fn region(&self) -> Region {
        // SAFETY: the mapping is valid for `size` bytes until munmap in Drop.
        unsafe { Region::from_raw(self.base_addr, self.size) }
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // SAFETY: base_addr and size were valid when created.
        unsafe {
            libc::munmap(self.base_addr as *mut libc::c_void, self.size);
        }
    }
}

/// A named block of shared memory holding a region header and a byte ring.
///
/// The creator is responsible for removing the name on [`close`]; openers
/// only drop their local mapping. Mappings that are still referenced by a
/// [`SharedRing`] stay valid until the last view is dropped.
///
/// [`close`]: SharedRegion::close
pub struct SharedRegion {
    /// Name as passed to the OS, always with a leading `/`.
    name: String,
    /// Owned, NUL-terminated copy of `name` handed to `shm_open`/`shm_unlink`.
    c_name: CString,
    capacity: u32,
    mapping: Option<Arc<Mapping>>,
    creator: bool,
}

impl SharedRegion {
    /// Create a new region named `name` with a ring of `capacity` bytes.
    ///
    /// Fails with [`RegionError::NameCollision`] if the name is taken.
    pub fn create(name: &str, capacity: u32) -> Result<Self, RegionError> {
        if capacity == 0 {
            return Err(RegionError::InvalidArgument(
                "capacity must be non-zero".into(),
            ));
        }
        let (name, c_name) = shm_name(name)?;
        let size = region_size(capacity).ok_or_else(|| {
            RegionError::InvalidArgument(format!("capacity {} is too large", capacity))
        })?;

        let fd = unsafe {
            libc::shm_open(
                c_name.as_ptr(),
                libc::O_CREAT | libc::O_EXCL | libc::O_RDWR,
                0o600,
            )
        };
        if fd < 0 {
            let err = io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(libc::EEXIST) => RegionError::NameCollision(name),
                Some(libc::EINVAL) | Some(libc::ENAMETOOLONG) => {
                    RegionError::InvalidArgument(format!("invalid region name {}: {}", name, err))
                }
                _ => RegionError::AllocationError(err),
            });
        }
        // SAFETY: shm_open returned a fresh descriptor we now own.
        let file = File::from(unsafe { OwnedFd::from_raw_fd(fd) });

        // From here on the name exists; remove it again if we bail out.
        let unlink_guard = UnlinkGuard {
            c_name: &c_name,
            armed: true,
        };

        // A fresh shm object is zero-filled when it grows.
        file.set_len(size as u64)
            .map_err(RegionError::AllocationError)?;

        let mapping = Mapping::map(file, size).map_err(RegionError::AllocationError)?;
        let region = mapping.region();

        // SAFETY: we created the object and nobody can have mapped a header
        // yet that they would trust (capacity reads as zero until written).
        unsafe {
            *region.get_mut::<RegionHeader>(0) = RegionHeader::new(capacity);
            ByteRing::init(region, RING_OFFSET, capacity);
        }

        unlink_guard.disarm();
        tracing::debug!(name = %name, capacity, size, "created shared region");

        Ok(Self {
            name,
            c_name,
            capacity,
            mapping: Some(Arc::new(mapping)),
            creator: true,
        })
    }

    /// Attach to a region created by another process (or another handle).
    ///
    /// Fails with [`RegionError::NotFound`] if no region has this name.
    pub fn open(name: &str) -> Result<Self, RegionError> {
        let (name, c_name) = shm_name(name)?;

        let fd = unsafe { libc::shm_open(c_name.as_ptr(), libc::O_RDWR, 0) };
        if fd < 0 {
            let err = io::Error::last_os_error();
            return Err(match err.raw_os_error() {
                Some(libc::ENOENT) => RegionError::NotFound(name),
                _ => RegionError::Io(err),
            });
        }
        // SAFETY: shm_open returned a fresh descriptor we now own.
        let file = File::from(unsafe { OwnedFd::from_raw_fd(fd) });

        let size = file.metadata().map_err(RegionError::Io)?.len() as usize;
        if size < crate::layout::DATA_OFFSET {
            return Err(RegionError::InvalidHeader(
                "mapping is smaller than the region header",
            ));
        }

        let mapping = Mapping::map(file, size).map_err(RegionError::Io)?;
        let region = mapping.region();

        // SAFETY: the header is immutable after create; the ring header's
        // capacity field is likewise written once.
        let header = unsafe { *region.get::<RegionHeader>(0) };
        let capacity = header.validate(size)?;
        let ring_capacity = unsafe { region.get::<ByteRingHeader>(RING_OFFSET).capacity };
        if ring_capacity != capacity {
            return Err(RegionError::InvalidHeader(
                "ring header disagrees with region header",
            ));
        }

        tracing::debug!(name = %name, capacity, size, "opened shared region");

        Ok(Self {
            name,
            c_name,
            capacity,
            mapping: Some(Arc::new(mapping)),
            creator: false,
        })
    }

    /// Open the region if it exists, otherwise create it.
    ///
    /// An existing region must carry the requested capacity.
    pub fn open_or_create(name: &str, capacity: u32) -> Result<Self, RegionError> {
        match Self::create(name, capacity) {
            Err(RegionError::NameCollision(_)) => {
                let region = Self::open(name)?;
                if region.capacity != capacity {
                    return Err(RegionError::CapacityMismatch {
                        name: region.name.clone(),
                        expected: capacity,
                        found: region.capacity,
                    });
                }
                Ok(region)
            }
            other => other,
        }
    }

    /// A ring view over this region.
    ///
    /// The view keeps the local mapping alive, even past [`close`].
    ///
    /// [`close`]: SharedRegion::close
    pub fn ring(&self) -> Result<SharedRing, RegionError> {
        let mapping = self.mapping.as_ref().ok_or(RegionError::Closed)?;
        // SAFETY: the ring header was initialized by the creator and
        // validated by open; the Arc keeps the mapping alive.
        let ring = unsafe { ByteRing::attach(mapping.region(), RING_OFFSET) };
        Ok(SharedRing {
            ring,
            _mapping: mapping.clone(),
        })
    }

    /// Release the local mapping. The creator also removes the name, so no
    /// new process can open it; existing attachments stay valid.
    ///
    /// Calling this more than once is a no-op.
    pub fn close(&mut self) {
        let Some(mapping) = self.mapping.take() else {
            return;
        };
        drop(mapping);

        if self.creator && unsafe { libc::shm_unlink(self.c_name.as_ptr()) } != 0 {
            let err = io::Error::last_os_error();
            tracing::warn!(name = %self.name, %err, "failed to unlink shared region");
        }
        tracing::debug!(name = %self.name, creator = self.creator, "closed shared region");
    }

    /// Name as passed to the OS (with a leading `/`).
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ring capacity in bytes.
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// True if this handle created the region (and will unlink it).
    pub fn is_creator(&self) -> bool {
        self.creator
    }

    pub fn is_closed(&self) -> bool {
        self.mapping.is_none()
    }

    /// Copy of the region header as currently mapped.
    pub fn header(&self) -> Result<RegionHeader, RegionError> {
        let mapping = self.mapping.as_ref().ok_or(RegionError::Closed)?;
        // SAFETY: validated at create/open and immutable afterwards.
        Ok(unsafe { *mapping.region().get::<RegionHeader>(0) })
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SharedRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRegion")
            .field("name", &self.name)
            .field("capacity", &self.capacity)
            .field("creator", &self.creator)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A byte ring living in a shared region.
///
/// Holds a reference to the mapping, so the ring stays usable for as long as
/// this value exists.
#[derive(Clone)]
pub struct SharedRing {
    ring: ByteRing,
    _mapping: Arc<Mapping>,
}

impl SharedRing {
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

    pub fn status(&self) -> RingStatus {
        self.ring.status()
    }
}

impl AsByteRing for SharedRing {
    fn byte_ring(&self) -> &ByteRing {
        &self.ring
    }
}

impl std::fmt::Debug for SharedRing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedRing")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// Removes a half-created region's name unless disarmed.
struct UnlinkGuard<'a> {
    c_name: &'a CString,
    armed: bool,
}

impl UnlinkGuard<'_> {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for UnlinkGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            unsafe {
                libc::shm_unlink(self.c_name.as_ptr());
            }
        }
    }
}

/// Normalize a region name to POSIX form (`/name`) and produce the owned
/// C string handed to the OS.
fn shm_name(name: &str) -> Result<(String, CString), RegionError> {
    let bare = name.strip_prefix('/').unwrap_or(name);
    if bare.is_empty() {
        return Err(RegionError::InvalidArgument("region name is empty".into()));
    }
    if bare.len() > MAX_NAME_LEN {
        return Err(RegionError::InvalidArgument(format!(
            "region name is longer than {} bytes",
            MAX_NAME_LEN
        )));
    }
    if bare.contains('/') {
        return Err(RegionError::InvalidArgument(format!(
            "region name {:?} contains '/'",
            name
        )));
    }
    let full = format!("/{}", bare);
    let c_name = CString::new(full.clone()).map_err(|_| {
        RegionError::InvalidArgument(format!("region name {:?} contains NUL", name))
    })?;
    Ok((full, c_name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn unique_name(tag: &str) -> String {
        static COUNTER: AtomicUsize = AtomicUsize::new(0);
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        format!("sc{}-{}{}", std::process::id(), tag, n)
    }

    #[test]
    fn create_then_open_shares_ring() {
        let name = unique_name("share");
        let host = SharedRegion::create(&name, 64).unwrap();
        let peer = SharedRegion::open(&name).unwrap();

        assert!(host.is_creator());
        assert!(!peer.is_creator());
        assert_eq!(peer.capacity(), 64);
        assert_eq!(peer.name(), format!("/{}", name));

        let producer = host.ring().unwrap();
        let consumer = peer.ring().unwrap();
        assert_eq!(producer.write(b"across mappings"), 15);
        assert_eq!(consumer.available_to_read(), 15);

        let mut out = [0u8; 15];
        assert_eq!(consumer.read(&mut out), 15);
        assert_eq!(&out, b"across mappings");
        assert_eq!(producer.available_to_write(), 64);
    }

    #[test]
    fn header_layout_is_capacity_then_zeroed_reserved() {
        let name = unique_name("hdr");
        let region = SharedRegion::create(&name, 4096).unwrap();
        let header = region.header().unwrap();
        assert_eq!(header.capacity, 4096);
        assert!(header.reserved.iter().all(|&w| w == 0));

        let mapping = region.mapping.as_ref().unwrap();
        let raw = unsafe { std::slice::from_raw_parts(mapping.base_addr, 8) };
        assert_eq!(&raw[..4], &4096u32.to_ne_bytes());
        assert_eq!(&raw[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn create_twice_is_name_collision() {
        let name = unique_name("dup");
        let _first = SharedRegion::create(&name, 32).unwrap();
        assert!(matches!(
            SharedRegion::create(&name, 32),
            Err(RegionError::NameCollision(_))
        ));
    }

    #[test]
    fn open_missing_is_not_found() {
        let name = unique_name("missing");
        assert!(matches!(
            SharedRegion::open(&name),
            Err(RegionError::NotFound(_))
        ));
    }

    #[test]
    fn invalid_arguments() {
        assert!(matches!(
            SharedRegion::create(&unique_name("zero"), 0),
            Err(RegionError::InvalidArgument(_))
        ));
        assert!(matches!(
            SharedRegion::create("", 16),
            Err(RegionError::InvalidArgument(_))
        ));
        assert!(matches!(
            SharedRegion::create("a/b", 16),
            Err(RegionError::InvalidArgument(_))
        ));
        assert!(matches!(
            SharedRegion::open("nul\0name"),
            Err(RegionError::InvalidArgument(_))
        ));
    }

    #[test]
    fn creator_close_unlinks_and_is_idempotent() {
        let name = unique_name("close");
        let mut host = SharedRegion::create(&name, 16).unwrap();
        host.close();
        host.close();
        assert!(host.is_closed());
        assert!(matches!(host.ring(), Err(RegionError::Closed)));
        assert!(matches!(
            SharedRegion::open(&name),
            Err(RegionError::NotFound(_))
        ));
    }

    #[test]
    fn opener_close_leaves_region_in_place() {
        let name = unique_name("peer");
        let _host = SharedRegion::create(&name, 16).unwrap();
        let mut peer = SharedRegion::open(&name).unwrap();
        peer.close();
        assert!(SharedRegion::open(&name).is_ok());
    }

    #[test]
    fn ring_view_outlives_close() {
        let name = unique_name("view");
        let mut host = SharedRegion::create(&name, 16).unwrap();
        let ring = host.ring().unwrap();
        host.close();

        assert_eq!(ring.write(b"still mapped"), 12);
        let mut out = [0u8; 12];
        assert_eq!(ring.read(&mut out), 12);
        assert_eq!(&out, b"still mapped");
    }

    #[test]
    fn open_or_create_both_paths() {
        let name = unique_name("ooc");
        let created = SharedRegion::open_or_create(&name, 128).unwrap();
        assert!(created.is_creator());

        let opened = SharedRegion::open_or_create(&name, 128).unwrap();
        assert!(!opened.is_creator());
        assert_eq!(opened.capacity(), 128);

        assert!(matches!(
            SharedRegion::open_or_create(&name, 256),
            Err(RegionError::CapacityMismatch {
                expected: 256,
                found: 128,
                ..
            })
        ));
    }

    #[test]
    fn leading_slash_is_optional() {
        let name = unique_name("slash");
        let _host = SharedRegion::create(&format!("/{}", name), 16).unwrap();
        let peer = SharedRegion::open(&name).unwrap();
        assert_eq!(peer.name(), format!("/{}", name));
    }
}
