//! Default sizes and tuning constants.
//!
//! These values mirror what the store uses when the embedding server does
//! not configure them explicitly.

/// Alignment for every block handed out by the allocator.
///
/// 64 bytes keeps blob starts cache-line aligned, which is what most
/// columnar consumers of the shared segment expect.
pub const BLOCK_ALIGNMENT: usize = 64;

/// Default size of the main shared-memory pool (256 MiB).
pub const DEFAULT_SHARED_MEMORY_SIZE: usize = 256 * 1024 * 1024;

/// Smallest pool size worth creating. Below this the segment cannot hold
/// the bookkeeping page plus a single aligned blob.
pub const MIN_SHARED_MEMORY_SIZE: usize = 64 * 1024;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alignment_is_power_of_two() {
        assert!(BLOCK_ALIGNMENT.is_power_of_two());
    }

    #[test]
    fn test_min_below_default() {
        assert!(MIN_SHARED_MEMORY_SIZE < DEFAULT_SHARED_MEMORY_SIZE);
    }
}
