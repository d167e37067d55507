//! # shmstore
//!
//! A shared-memory bulk object store for cross-process zero-copy data sharing.
//!
//! The store owns one large memfd-backed mapping and hands out blobs carved
//! out of it, identified by address-derived object ids. Clients map the same
//! file descriptors and read blob bytes directly; the server only ships
//! metadata (fd, mapping size, offset) over a JSON request/reply protocol.
//!
//! ## Architecture
//!
//! - [`memory::BlockAllocator`]: a free-range allocator over one pre-reserved
//!   memfd mapping, with aligned allocation and a hard footprint ceiling
//! - [`memory::reclaim`]: returns unused physical pages to the kernel with
//!   `madvise(MADV_DONTNEED)` without unmapping the shared segment
//! - [`store::BulkStore`]: the concurrent object registry plus the arena
//!   lifecycle (large raw mappings handed to clients and later finalized
//!   into discrete blobs)
//! - [`protocol`]: the wire codec for every request/reply shape
//! - [`server`]: routes decoded requests to the store and encodes replies
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use shmstore::prelude::*;
//!
//! let store = BulkStore::new(256 * 1024 * 1024)?;
//!
//! let (id, payload) = store.create(4096)?;
//! assert!(store.exists(id));
//!
//! // Ship `payload` metadata to a client; it maps `payload.store_fd`
//! // and reads the blob at `payload.data_offset`.
//!
//! store.delete(id)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod defaults;
pub mod error;
pub mod id;
pub mod memory;
pub mod payload;
pub mod protocol;
pub mod server;
pub mod store;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::id::{ExternalId, ObjectId};
    pub use crate::payload::Payload;
    pub use crate::store::BulkStore;
}

pub use error::{Error, Result};
