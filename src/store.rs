//! The bulk object store: payload registry plus arena lifecycle.
//!
//! `BulkStore` owns all mutable state of the core — the block allocator,
//! the two concurrent registries, and the arena bookkeeping — and is
//! passed explicitly to every caller. There is no process-global state.
//!
//! # Concurrency
//!
//! The object and external registries are `DashMap`s: operations on
//! distinct keys never block each other, and operations on the same key
//! serialize on that key's shard entry. Arena lifecycle (`make_arena`,
//! `finalize_arena`, and the address-adjacency walk during deletion of an
//! arena-born blob) reads and mutates the open-arena table and the span
//! set together, so all of it serializes on one `arena_space` lock.
//!
//! # Arenas
//!
//! An arena is a large anonymous shared mapping handed wholesale to a
//! client for self-managed sub-allocation. The client later finalizes it,
//! declaring which `(offset, size)` sub-regions hold real data; those
//! become ordinary registry blobs, the gaps between them are returned to
//! the kernel, and the arena itself can never be finalized again. The
//! mapping (and its fd) stays alive for the life of the store so blob
//! descriptors into it remain valid.

use std::collections::{BTreeSet, HashMap};
use std::ffi::CString;
use std::os::unix::io::{AsRawFd, RawFd};
use std::ptr::NonNull;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use rustix::fd::OwnedFd;
use rustix::mm::{MapFlags, ProtFlags};
use tracing::{debug, warn};

use crate::defaults::BLOCK_ALIGNMENT;
use crate::error::{Error, Result};
use crate::id::{ExternalId, ObjectId};
use crate::memory::reclaim;
use crate::memory::{align_down, align_up, BlockAllocator};
use crate::payload::Payload;

/// An arena that has been created but not yet finalized.
struct Arena {
    /// Keeps the descriptor alive; its raw value is the table key.
    fd: OwnedFd,
    /// Total mapping size.
    size: usize,
    /// Base address of the mapping in this process.
    base: NonNull<u8>,
}

/// A finalized arena whose mapping must outlive its registered blobs.
struct SealedMapping {
    /// Keeps the descriptor alive for later client requests.
    _fd: OwnedFd,
    /// Mapping size, for the unmap on drop.
    size: usize,
    /// Base address, for the unmap on drop.
    base: NonNull<u8>,
}

impl Drop for SealedMapping {
    fn drop(&mut self) {
        // SAFETY: base/size describe the mapping made in `make_arena`.
        unsafe {
            let _ = rustix::mm::munmap(self.base.as_ptr().cast(), self.size);
        }
    }
}

/// Arena bookkeeping, all guarded by one lock.
struct ArenaSpace {
    /// Arenas awaiting finalization, keyed by raw fd.
    open: HashMap<RawFd, Arena>,
    /// Finalized arena mappings, kept alive for the life of the store.
    sealed: HashMap<RawFd, SealedMapping>,
    /// Every arena-born object id, in address order. Used to find the
    /// address-adjacent neighbors when reclaiming around a deleted blob.
    spans: BTreeSet<ObjectId>,
}

// SAFETY: the NonNull bases point into mappings owned by the tables, and
// every access goes through the surrounding Mutex.
unsafe impl Send for ArenaSpace {}

/// Shared-memory bulk object store.
///
/// See the [module docs](self) for the concurrency and arena model.
pub struct BulkStore {
    allocator: BlockAllocator,
    objects: DashMap<ObjectId, Arc<Payload>>,
    externals: DashMap<ExternalId, Arc<Payload>>,
    arena_space: Mutex<ArenaSpace>,
}

impl BulkStore {
    /// Pre-allocate the main pool and open an empty store.
    ///
    /// Registers the whole-region marker payload so clients can request a
    /// descriptor for the entire backing segment.
    ///
    /// # Errors
    ///
    /// [`Error::NotEnoughMemory`] when the pool reservation fails.
    pub fn new(capacity: usize) -> Result<Self> {
        let allocator = BlockAllocator::new(capacity)?;

        let store = Self {
            objects: DashMap::new(),
            externals: DashMap::new(),
            arena_space: Mutex::new(ArenaSpace {
                open: HashMap::new(),
                sealed: HashMap::new(),
                spans: BTreeSet::new(),
            }),
            allocator,
        };

        // Marker for the entire shared memory range.
        let info = store.allocator.mapinfo(store.allocator.base());
        store.objects.insert(
            ObjectId::WHOLE_REGION,
            Arc::new(Payload::new(
                ObjectId::WHOLE_REGION,
                capacity,
                store.allocator.base(),
                info.fd,
                info.map_size,
                info.offset,
            )),
        );
        Ok(store)
    }

    // ========================================================================
    // Registry operations
    // ========================================================================

    /// Create a blob of `size` bytes from the main pool.
    ///
    /// `create(0)` yields the canonical empty sentinel without touching the
    /// allocator or the registries.
    pub fn create(&self, size: usize) -> Result<(ObjectId, Arc<Payload>)> {
        if size == 0 {
            return Ok((ObjectId::EMPTY, Payload::make_empty()));
        }
        let pointer = self
            .allocator
            .memalign(size, BLOCK_ALIGNMENT)
            .ok_or_else(|| Error::NotEnoughMemory(format!("size = {size}")))?;
        let info = self.allocator.mapinfo(pointer.as_ptr());
        let object_id = ObjectId::from_pointer(pointer.as_ptr() as usize);
        let payload = Arc::new(Payload::new(
            object_id,
            size,
            pointer.as_ptr(),
            info.fd,
            info.map_size,
            info.offset,
        ));
        self.objects.insert(object_id, Arc::clone(&payload));
        debug!(%object_id, size, footprint = self.footprint(), "created blob");
        Ok((object_id, payload))
    }

    /// Create a blob co-indexed by a caller-supplied external id.
    ///
    /// `size == 0` short-circuits to the empty sentinel; the external id is
    /// not registered in that case (external ids never denote the empty
    /// blob).
    pub fn create_with_external(
        &self,
        size: usize,
        external_id: ExternalId,
        external_size: usize,
    ) -> Result<(ObjectId, Arc<Payload>)> {
        if size == 0 {
            return Ok((ObjectId::EMPTY, Payload::make_empty()));
        }
        let pointer = self
            .allocator
            .memalign(size, BLOCK_ALIGNMENT)
            .ok_or_else(|| Error::NotEnoughMemory(format!("size = {size}")))?;
        let info = self.allocator.mapinfo(pointer.as_ptr());
        let object_id = ObjectId::from_pointer(pointer.as_ptr() as usize);
        let payload = Arc::new(Payload::with_external(
            object_id,
            external_id.clone(),
            size,
            pointer.as_ptr(),
            info.fd,
            info.map_size,
            info.offset,
            external_size,
        ));
        self.objects.insert(object_id, Arc::clone(&payload));
        self.externals.insert(external_id, Arc::clone(&payload));
        debug!(%object_id, size, footprint = self.footprint(), "created blob (external)");
        Ok((object_id, payload))
    }

    /// Look up one blob by id.
    ///
    /// The empty sentinel id resolves to the canonical empty payload.
    pub fn get(&self, id: ObjectId) -> Result<Arc<Payload>> {
        if id == ObjectId::EMPTY {
            return Ok(Payload::make_empty());
        }
        self.objects
            .get(&id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| Error::ObjectNotExists(format!("get: id = {id}")))
    }

    /// Batch lookup by id.
    ///
    /// Unresolvable ids are skipped, so the result may be shorter than the
    /// request; the caller matches results by their `object_id` field.
    pub fn get_many(&self, ids: &[ObjectId]) -> Vec<Arc<Payload>> {
        let mut payloads = Vec::with_capacity(ids.len());
        for &id in ids {
            if id == ObjectId::EMPTY {
                payloads.push(Payload::make_empty());
            } else if let Some(entry) = self.objects.get(&id) {
                payloads.push(Arc::clone(entry.value()));
            } else {
                debug!(%id, "batch get: skipping unknown id");
            }
        }
        payloads
    }

    /// Batch lookup by external id; unresolvable keys are skipped.
    pub fn get_by_external(&self, external_ids: &[ExternalId]) -> Vec<Arc<Payload>> {
        let mut payloads = Vec::with_capacity(external_ids.len());
        for eid in external_ids {
            if let Some(entry) = self.externals.get(eid) {
                payloads.push(Arc::clone(entry.value()));
            } else {
                debug!(external_id = %eid, "batch get: skipping unknown external id");
            }
        }
        payloads
    }

    /// Whether a blob with this id is registered.
    pub fn exists(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    /// Whether a blob with this external id is registered.
    pub fn exists_external(&self, external_id: &str) -> bool {
        self.externals.contains_key(external_id)
    }

    /// Delete a blob.
    ///
    /// The empty and whole-region sentinels are a successful no-op. Blobs
    /// from the main pool return their bytes to the allocator; arena-born
    /// blobs release the page-aligned window between their still-live
    /// address neighbors back to the kernel.
    pub fn delete(&self, id: ObjectId) -> Result<()> {
        if id == ObjectId::EMPTY || id == ObjectId::WHOLE_REGION {
            return Ok(());
        }
        let peeked = {
            let entry = self
                .objects
                .get(&id)
                .ok_or_else(|| Error::ObjectNotExists(format!("delete: id = {id}")))?;
            Arc::clone(entry.value())
        };

        let payload = if peeked.is_from_arena() {
            self.delete_arena_blob(id, &peeked)?
        } else {
            let (_, payload) = self
                .objects
                .remove(&id)
                .ok_or_else(|| Error::ObjectNotExists(format!("delete: id = {id}")))?;
            self.allocator.free(payload.pointer, payload.data_size);
            debug!(%id, footprint = self.footprint(), "freed pool blob");
            payload
        };

        if let Some(eid) = &payload.external_id {
            // Only drop the binding if it still points at this blob; the
            // external id may have been re-bound to a newer blob.
            self.externals
                .remove_if(eid, |_, bound| bound.object_id == payload.object_id);
        }
        Ok(())
    }

    /// Delete by external id.
    ///
    /// A miss is a successful no-op, matching what existing clients expect
    /// from the secondary-key path.
    pub fn delete_by_external(&self, external_id: &str) -> Result<()> {
        let object_id = match self.externals.get(external_id) {
            Some(entry) => entry.value().object_id,
            None => return Ok(()),
        };
        self.delete(object_id)
    }

    /// Bytes currently allocated from the main pool. Arena-backed blobs
    /// are bookkept separately and not counted here.
    pub fn footprint(&self) -> usize {
        self.allocator.allocated()
    }

    /// The main pool's footprint ceiling.
    pub fn footprint_limit(&self) -> usize {
        self.allocator.footprint_limit()
    }

    /// Delete an arena-born blob: reclaim the page-aligned window clamped
    /// by the address-adjacent span neighbors, then unregister it.
    fn delete_arena_blob(&self, id: ObjectId, peeked: &Arc<Payload>) -> Result<Arc<Payload>> {
        let page_size = rustix::param::page_size();
        let mut space = self.arena_space.lock();

        if !space.spans.contains(&id) {
            // Lost the race against a concurrent delete of the same id.
            return Err(Error::ObjectNotExists(format!("delete: id = {id}")));
        }

        let pointer = peeked.pointer as usize;
        let mut lower = align_down(pointer, page_size);
        let mut upper = align_up(pointer + peeked.data_size, page_size);

        // Clamp the window so it never overlaps a live neighbor, which may
        // itself not be page-aligned.
        if let Some(&prev_id) = space.spans.range(..id).next_back() {
            let prev = self.objects.get(&prev_id).ok_or_else(|| {
                Error::Invalid(format!(
                    "internal state error: previous blob {prev_id} not found"
                ))
            })?;
            lower = lower.max(align_up(prev.pointer as usize + prev.data_size, page_size));
        }
        if let Some(&next_id) = space
            .spans
            .range((std::ops::Bound::Excluded(id), std::ops::Bound::Unbounded))
            .next()
        {
            let next = self.objects.get(&next_id).ok_or_else(|| {
                Error::Invalid(format!(
                    "internal state error: next blob {next_id} not found"
                ))
            })?;
            upper = upper.min(align_down(next.pointer as usize, page_size));
        }

        // Claim the blob while still holding the arena lock, so concurrent
        // neighbor deletions observe a consistent spans/registry pair.
        let (_, payload) = self
            .objects
            .remove(&id)
            .ok_or_else(|| Error::ObjectNotExists(format!("delete: id = {id}")))?;
        space.spans.remove(&id);

        if lower < upper {
            reclaim::recycle_range(lower, upper);
        }
        debug!(%id, lower, upper, "deleted arena blob");
        Ok(payload)
    }

    // ========================================================================
    // Arena lifecycle
    // ========================================================================

    /// Create an arena: a raw anonymous shared mapping of `size` bytes
    /// handed wholesale to the client for self-managed sub-allocation.
    ///
    /// Returns the arena's fd (to be passed to the client out-of-band) and
    /// the server-side base address.
    pub fn make_arena(&self, size: usize) -> Result<(RawFd, usize)> {
        if size == 0 {
            return Err(Error::UserInputError("arena size must be > 0".into()));
        }
        let cname = CString::new("shmstore-arena").map_err(|e| Error::Invalid(e.to_string()))?;
        let fd = rustix::fs::memfd_create(&cname, rustix::fs::MemfdFlags::CLOEXEC)
            .map_err(|e| Error::NotEnoughMemory(format!("failed to allocate a new arena: {e}")))?;
        rustix::fs::ftruncate(&fd, size as u64)
            .map_err(|e| Error::NotEnoughMemory(format!("failed to size the arena: {e}")))?;

        // SAFETY: mapping a fresh fd at a kernel-chosen address.
        let base = unsafe {
            rustix::mm::mmap(
                std::ptr::null_mut(),
                size,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
                &fd,
                0,
            )?
        };
        let base = NonNull::new(base.cast::<u8>())
            .ok_or_else(|| Error::NotEnoughMemory("arena mmap returned null".into()))?;

        let raw_fd = fd.as_raw_fd();
        let mut space = self.arena_space.lock();
        space.open.insert(raw_fd, Arena { fd, size, base });
        debug!(fd = raw_fd, size, "opened arena");
        Ok((raw_fd, base.as_ptr() as usize))
    }

    /// Finalize an arena: register each `(offset, size)` sub-region as a
    /// blob, return every uncovered gap to the kernel, and close the arena
    /// for further finalization.
    ///
    /// # Errors
    ///
    /// [`Error::UserInputError`] when `offsets` and `sizes` differ in
    /// length (the arena stays open); [`Error::ObjectNotExists`] when `fd`
    /// is unknown or already finalized.
    pub fn finalize_arena(&self, fd: RawFd, offsets: &[usize], sizes: &[usize]) -> Result<()> {
        debug!(fd, blobs = offsets.len(), "finalizing arena");
        let mut space = self.arena_space.lock();
        if !space.open.contains_key(&fd) {
            return Err(Error::ObjectNotExists(format!(
                "arena for fd {fd} cannot be found"
            )));
        }
        if offsets.len() != sizes.len() {
            // The arena stays open; the client may retry a fixed request.
            return Err(Error::UserInputError(
                "the offsets and sizes of sealed blobs do not match".into(),
            ));
        }
        let arena = match space.open.remove(&fd) {
            Some(arena) => arena,
            None => {
                return Err(Error::ObjectNotExists(format!(
                    "arena for fd {fd} cannot be found"
                )))
            }
        };
        let base = arena.base.as_ptr() as usize;

        for (&offset, &size) in offsets.iter().zip(sizes) {
            let pointer = base + offset;
            let object_id = ObjectId::from_pointer(pointer);
            debug!(fd, offset, size, %object_id, "blob in use");
            self.objects.insert(
                object_id,
                Arc::new(Payload::from_arena(
                    object_id,
                    size,
                    pointer as *mut u8,
                    fd,
                    arena.size,
                    offset,
                )),
            );
            space.spans.insert(object_id);
        }

        // Anything the client did not claim goes straight back to the OS.
        let covered: Vec<(usize, usize)> = offsets
            .iter()
            .zip(sizes)
            .map(|(&offset, &size)| (offset, size))
            .collect();
        reclaim::recycle_uncovered(base, arena.size, &covered);

        space.sealed.insert(
            fd,
            SealedMapping {
                _fd: arena.fd,
                size: arena.size,
                base: arena.base,
            },
        );
        Ok(())
    }
}

impl Drop for BulkStore {
    fn drop(&mut self) {
        // Unfinalized arenas are abandoned wholesale: unmap and close.
        let mut space = self.arena_space.lock();
        for (fd, arena) in space.open.drain() {
            warn!(fd, "dropping store with an unfinalized arena");
            // SAFETY: base/size describe the mapping made in `make_arena`.
            unsafe {
                let _ = rustix::mm::munmap(arena.base.as_ptr().cast(), arena.size);
            }
        }
        // Sealed mappings and the pool unmap via their own Drop impls.
    }
}
