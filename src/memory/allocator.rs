//! Block allocator over one pre-reserved shared mapping.
//!
//! The allocator creates a single memfd, maps it `MAP_SHARED`, and serves
//! every blob of the main pool as a sub-range of that one mapping. This is
//! what makes cross-process sharing cheap: a client maps the pool fd once
//! and reaches any blob by offset, instead of receiving one fd per blob.
//!
//! Free space is tracked as an ordered map of disjoint byte ranges.
//! Allocation is first-fit with alignment splitting; freeing coalesces
//! with both neighbors. The allocator never evicts and never reclaims —
//! when the footprint ceiling or the address range is exhausted it reports
//! failure and leaves recovery to the caller.

use std::collections::BTreeMap;
use std::ffi::CString;
use std::os::unix::io::{AsRawFd, RawFd};
use std::ptr::NonNull;

use parking_lot::Mutex;
use rustix::fd::OwnedFd;
use rustix::mm::{MapFlags, ProtFlags};
use tracing::debug;

use super::align_up;
use crate::error::{Error, Result};

/// OS-level mapping metadata for a pointer served by the allocator.
///
/// Blobs are sub-regions of one pre-established mapping, not independent
/// mappings, so the descriptor and mapping size are the pool's own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapInfo {
    /// Descriptor backing the mapping that contains the pointer.
    pub fd: RawFd,
    /// Total size of that mapping.
    pub map_size: usize,
    /// Byte offset of the pointer within the mapping.
    pub offset: usize,
}

/// Free-range bookkeeping, guarded by one lock.
struct Ranges {
    /// Disjoint, non-adjacent free ranges: start offset -> length.
    free: BTreeMap<usize, usize>,
    /// Bytes currently served to live allocations.
    allocated: usize,
    /// Hard ceiling on `allocated`.
    limit: usize,
}

/// Allocator over a single contiguous memfd-backed address range.
pub struct BlockAllocator {
    /// The pool memfd (one fd for the entire pool).
    fd: OwnedFd,
    /// Base of the mapped region.
    base: NonNull<u8>,
    /// Size of the mapped region.
    capacity: usize,
    inner: Mutex<Ranges>,
}

// SAFETY: the mapping is valid for the allocator's lifetime, the fd is
// kernel-reference-counted, and all range bookkeeping is behind the mutex.
unsafe impl Send for BlockAllocator {}
unsafe impl Sync for BlockAllocator {}

impl BlockAllocator {
    /// Reserve a pool of `capacity` bytes.
    ///
    /// Creates an anonymous memfd of `capacity` bytes and maps the whole
    /// region shared. The footprint limit starts at `capacity`.
    ///
    /// # Errors
    ///
    /// [`Error::NotEnoughMemory`] when the reservation cannot be satisfied.
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::NotEnoughMemory("pool capacity must be > 0".into()));
        }

        let cname =
            CString::new("shmstore-pool").map_err(|e| Error::NotEnoughMemory(e.to_string()))?;
        let fd = rustix::fs::memfd_create(&cname, rustix::fs::MemfdFlags::CLOEXEC)
            .map_err(|e| Error::NotEnoughMemory(format!("memfd_create: {e}")))?;
        rustix::fs::ftruncate(&fd, capacity as u64)
            .map_err(|e| Error::NotEnoughMemory(format!("ftruncate({capacity}): {e}")))?;

        // SAFETY: mapping a fresh fd at a kernel-chosen address.
        let base = unsafe {
            rustix::mm::mmap(
                std::ptr::null_mut(),
                capacity,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &fd,
                0,
            )
            .map_err(|e| Error::NotEnoughMemory(format!("mmap({capacity}): {e}")))?
        };
        let base = NonNull::new(base.cast::<u8>())
            .ok_or_else(|| Error::NotEnoughMemory("mmap returned null".into()))?;

        let mut free = BTreeMap::new();
        free.insert(0, capacity);

        Ok(Self {
            fd,
            base,
            capacity,
            inner: Mutex::new(Ranges {
                free,
                allocated: 0,
                limit: capacity,
            }),
        })
    }

    /// Allocate `size` bytes aligned to `alignment` (a power of two).
    ///
    /// Returns `None` when the request would exceed the footprint limit or
    /// no free range fits. Exhaustion is reported, not resolved.
    pub fn memalign(&self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        debug_assert!(alignment.is_power_of_two());

        let mut inner = self.inner.lock();
        if inner.allocated.checked_add(size)? > inner.limit {
            return None;
        }

        let (start, len, aligned) = inner.free.iter().find_map(|(&start, &len)| {
            let aligned = align_up(start, alignment);
            let need = (aligned - start).checked_add(size)?;
            (len >= need).then_some((start, len, aligned))
        })?;

        inner.free.remove(&start);
        if aligned > start {
            inner.free.insert(start, aligned - start);
        }
        let tail = (start + len) - (aligned + size);
        if tail > 0 {
            inner.free.insert(aligned + size, tail);
        }
        inner.allocated += size;
        debug!(offset = aligned, size, allocated = inner.allocated, "memalign");

        // SAFETY: aligned + size <= capacity, inside the mapping.
        Some(unsafe { NonNull::new_unchecked(self.base.as_ptr().add(aligned)) })
    }

    /// Release a block previously returned by [`memalign`](Self::memalign).
    ///
    /// `size` must match the originally requested size.
    pub fn free(&self, pointer: *mut u8, size: usize) {
        let offset = pointer as usize - self.base.as_ptr() as usize;
        debug_assert!(offset + size <= self.capacity, "free outside the pool");

        let mut inner = self.inner.lock();
        debug_assert!(inner.allocated >= size, "free exceeds allocated bytes");

        let mut start = offset;
        let mut len = size;
        // Coalesce with the range ending exactly at `offset`.
        if let Some((&prev_start, &prev_len)) = inner.free.range(..offset).next_back() {
            debug_assert!(prev_start + prev_len <= offset, "double free");
            if prev_start + prev_len == offset {
                inner.free.remove(&prev_start);
                start = prev_start;
                len += prev_len;
            }
        }
        // Coalesce with the range starting exactly at the end.
        if let Some(&next_len) = inner.free.get(&(offset + size)) {
            inner.free.remove(&(offset + size));
            len += next_len;
        }
        inner.free.insert(start, len);
        inner.allocated -= size;
        debug!(offset, size, allocated = inner.allocated, "free");
    }

    /// Bytes currently served to live allocations.
    pub fn allocated(&self) -> usize {
        self.inner.lock().allocated
    }

    /// The configured footprint ceiling.
    pub fn footprint_limit(&self) -> usize {
        self.inner.lock().limit
    }

    /// Set (or tighten) the footprint ceiling, clamped to the pool size.
    ///
    /// Tightening never evicts; it only makes further allocation fail
    /// earlier.
    pub fn set_footprint_limit(&self, limit: usize) {
        self.inner.lock().limit = limit.min(self.capacity);
    }

    /// Mapping metadata for a pointer inside the pool.
    pub fn mapinfo(&self, pointer: *const u8) -> MapInfo {
        let offset = pointer as usize - self.base.as_ptr() as usize;
        debug_assert!(offset <= self.capacity);
        MapInfo {
            fd: self.fd.as_raw_fd(),
            map_size: self.capacity,
            offset,
        }
    }

    /// Base address of the pool mapping.
    #[inline]
    pub fn base(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    /// Total size of the pool mapping.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The pool's file descriptor, for sharing with client processes.
    #[inline]
    pub fn raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

impl Drop for BlockAllocator {
    fn drop(&mut self) {
        // SAFETY: base/capacity describe the mapping created in `new`.
        unsafe {
            let _ = rustix::mm::munmap(self.base.as_ptr().cast(), self.capacity);
        }
        // fd closes when OwnedFd drops.
    }
}
