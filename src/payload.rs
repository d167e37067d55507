//! Blob metadata records.
//!
//! A [`Payload`] describes one blob: where it lives inside which mapping,
//! how large it is, and which file descriptor a client must map to reach
//! it. Payloads are immutable after creation and shared as `Arc<Payload>`
//! between the registries and in-flight replies.

use std::os::unix::io::RawFd;
use std::sync::{Arc, OnceLock};

use serde_json::{json, Value};

use crate::error::{Error, Result};
use crate::id::{ExternalId, ObjectId};

/// Metadata for one blob in the shared segment.
///
/// `store_fd` is the descriptor a client maps (`map_size` bytes) to reach
/// the blob at `data_offset`. `arena_fd` is `-1` for blobs carved from the
/// main pool; for blobs born from a finalized arena it equals the arena's
/// fd and routes deletion to page reclamation instead of the allocator.
#[derive(Debug)]
pub struct Payload {
    /// Address-derived identifier.
    pub object_id: ObjectId,
    /// Optional caller-supplied secondary key.
    pub external_id: Option<ExternalId>,
    /// Descriptor of the backing mapping.
    pub store_fd: RawFd,
    /// The originating arena's fd, or `-1` for free-pool blobs.
    pub arena_fd: RawFd,
    /// Byte offset of the blob within the backing mapping.
    pub data_offset: usize,
    /// Blob size in bytes.
    pub data_size: usize,
    /// Caller bookkeeping size; not interpreted by the store.
    pub external_size: usize,
    /// Total size of the backing mapping.
    pub map_size: usize,
    /// Server-side address of the blob. Never crosses the wire; null on
    /// payloads decoded from a reply.
    pub pointer: *mut u8,
}

// SAFETY: the pointer refers into a mapping that outlives the store, and
// Payload is immutable after creation; the registries synchronize access.
unsafe impl Send for Payload {}
unsafe impl Sync for Payload {}

impl Payload {
    /// Payload for a blob carved from the main pool.
    pub fn new(
        object_id: ObjectId,
        data_size: usize,
        pointer: *mut u8,
        store_fd: RawFd,
        map_size: usize,
        data_offset: usize,
    ) -> Self {
        Self {
            object_id,
            external_id: None,
            store_fd,
            arena_fd: -1,
            data_offset,
            data_size,
            external_size: 0,
            map_size,
            pointer,
        }
    }

    /// Payload for a blob carved from the main pool, with an external key.
    #[allow(clippy::too_many_arguments)]
    pub fn with_external(
        object_id: ObjectId,
        external_id: ExternalId,
        data_size: usize,
        pointer: *mut u8,
        store_fd: RawFd,
        map_size: usize,
        data_offset: usize,
        external_size: usize,
    ) -> Self {
        Self {
            object_id,
            external_id: Some(external_id),
            store_fd,
            arena_fd: -1,
            data_offset,
            data_size,
            external_size,
            map_size,
            pointer,
        }
    }

    /// Payload for a sub-blob registered by an arena finalization.
    pub fn from_arena(
        object_id: ObjectId,
        data_size: usize,
        pointer: *mut u8,
        arena_fd: RawFd,
        map_size: usize,
        data_offset: usize,
    ) -> Self {
        Self {
            object_id,
            external_id: None,
            store_fd: arena_fd,
            arena_fd,
            data_offset,
            data_size,
            external_size: 0,
            map_size,
            pointer,
        }
    }

    /// The canonical zero-length blob.
    ///
    /// One process-wide instance; never registered, never freed.
    pub fn make_empty() -> Arc<Payload> {
        static EMPTY: OnceLock<Arc<Payload>> = OnceLock::new();
        EMPTY
            .get_or_init(|| {
                Arc::new(Payload {
                    object_id: ObjectId::EMPTY,
                    external_id: None,
                    store_fd: -1,
                    arena_fd: -1,
                    data_offset: 0,
                    data_size: 0,
                    external_size: 0,
                    map_size: 0,
                    pointer: std::ptr::null_mut(),
                })
            })
            .clone()
    }

    /// Whether this blob was born from a finalized arena.
    #[inline]
    pub fn is_from_arena(&self) -> bool {
        self.arena_fd != -1
    }

    /// Wire descriptor of this payload. The pointer stays server-side.
    pub fn to_wire(&self) -> Value {
        json!({
            "object_id": self.object_id,
            "store_fd": self.store_fd,
            "data_offset": self.data_offset,
            "data_size": self.data_size,
            "external_id": self.external_id.as_deref().unwrap_or(""),
            "external_size": self.external_size,
            "map_size": self.map_size,
        })
    }

    /// Rebuild a payload from its wire descriptor.
    ///
    /// The pointer is null on the decoded side; a client resolves the blob
    /// through `store_fd`/`data_offset` in its own address space.
    pub fn from_wire(tree: &Value) -> Result<Payload> {
        let field = |key: &str| -> Result<&Value> {
            tree.get(key)
                .ok_or_else(|| Error::Invalid(format!("payload descriptor missing `{key}`")))
        };
        let uint = |key: &str| -> Result<u64> {
            field(key)?
                .as_u64()
                .ok_or_else(|| Error::Invalid(format!("payload field `{key}` is not an integer")))
        };
        let external_id = field("external_id")?
            .as_str()
            .ok_or_else(|| Error::Invalid("payload field `external_id` is not a string".into()))?;
        Ok(Payload {
            object_id: ObjectId::from_u64(uint("object_id")?),
            external_id: (!external_id.is_empty()).then(|| external_id.to_string()),
            store_fd: field("store_fd")?
                .as_i64()
                .ok_or_else(|| Error::Invalid("payload field `store_fd` is not an integer".into()))?
                as RawFd,
            arena_fd: -1,
            data_offset: uint("data_offset")? as usize,
            data_size: uint("data_size")? as usize,
            external_size: uint("external_size")? as usize,
            map_size: uint("map_size")? as usize,
            pointer: std::ptr::null_mut(),
        })
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.object_id == other.object_id
            && self.store_fd == other.store_fd
            && self.data_offset == other.data_offset
            && self.data_size == other.data_size
    }
}
