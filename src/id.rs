//! Object identifiers derived from shared-memory addresses.
//!
//! Blob identity is address-derived: the id of a blob is its pointer into
//! the shared segment with the blob mark bit set. This makes id generation
//! free (no counter, no lookup) and guarantees that two live blobs never
//! share an id — they would have to share an address. User-space addresses
//! never have bit 63 set, so ordering ids orders the underlying addresses,
//! which is what the arena span bookkeeping relies on.

use serde::{Deserialize, Serialize};

/// High bit marking an id as a blob id.
const BLOB_MARK: u64 = 1 << 63;

/// Identifier of a blob in the store, derived from its address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectId(u64);

impl ObjectId {
    /// The canonical id of the zero-length blob (derived from the null
    /// address). Never stored in the registry.
    pub const EMPTY: ObjectId = ObjectId(BLOB_MARK);

    /// Sentinel id for the entire backing region (derived from the all-ones
    /// address). Registered once at store creation so clients can map the
    /// whole pool; never deletable.
    pub const WHOLE_REGION: ObjectId = ObjectId(u64::MAX);

    /// Derive the id for a blob at the given address.
    #[inline]
    pub fn from_pointer(addr: usize) -> Self {
        ObjectId(addr as u64 | BLOB_MARK)
    }

    /// The raw 64-bit value, as carried on the wire.
    #[inline]
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Rebuild an id from its wire value.
    #[inline]
    pub fn from_u64(raw: u64) -> Self {
        ObjectId(raw)
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "o{:016x}", self.0)
    }
}

/// Caller-supplied secondary key for a blob, for lookup by a foreign
/// naming scheme. Independent of [`ObjectId`].
pub type ExternalId = String;
