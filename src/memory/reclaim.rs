//! Page reclamation for the shared segment.
//!
//! Freed blob space stays mapped (clients may still hold the fd), but its
//! physical pages can be handed back to the kernel. `madvise(MADV_DONTNEED)`
//! drops the pages while keeping the range addressable; the next touch
//! faults in zero-filled pages.
//!
//! `MADV_FREE` is not usable here: it is rejected for shared mappings, so
//! the discard advisory is the only option. Reclamation is a best-effort
//! optimization — failures are logged and swallowed, never propagated.

use std::collections::BTreeMap;

use rustix::mm::Advice;
use tracing::{debug, error};

use super::{align_down, align_up};

/// Advise the kernel to drop physical pages fully contained in
/// `[low, high)`.
///
/// Boundaries are rounded inward to the page size; a range that rounds to
/// nothing is a no-op. The virtual range stays mapped and readable.
pub fn recycle_range(low: usize, high: usize) {
    let page_size = rustix::param::page_size();
    let aligned_low = align_up(low, page_size);
    let aligned_high = align_down(high, page_size);
    if aligned_low >= aligned_high {
        return;
    }
    debug!(low, high, aligned_low, aligned_high, "recycle pages");
    // SAFETY: the caller passes addresses inside a live mapping; DONTNEED
    // keeps the range mapped and zero-fills on the next touch.
    if let Err(errno) = unsafe {
        rustix::mm::madvise(
            aligned_low as *mut std::ffi::c_void,
            aligned_high - aligned_low,
            Advice::LinuxDontNeed,
        )
    } {
        error!(%errno, aligned_low, aligned_high, "madvise(MADV_DONTNEED) failed");
    }
}

/// Compute the maximal sub-ranges of `[0, total_size)` not covered by any
/// of `intervals` (which may overlap, duplicate, or touch the boundaries).
/// Gaps come back as half-open `(start, end)` offsets.
///
/// Sweep line over interval boundary events: +1 at each start, -1 at each
/// end; any gap between consecutive boundaries with a zero running count
/// is uncovered.
pub fn uncovered_ranges(total_size: usize, intervals: &[(usize, usize)]) -> Vec<(usize, usize)> {
    let mut points: BTreeMap<usize, i32> = BTreeMap::new();
    points.insert(0, 0);
    points.insert(total_size, 0);
    for &(offset, len) in intervals {
        *points.entry(offset).or_insert(0) += 1;
        *points.entry(offset + len).or_insert(0) -= 1;
    }

    let mut gaps = Vec::new();
    let mut running = 0;
    let mut iter = points.iter().peekable();
    while let Some((&at, &delta)) = iter.next() {
        running += delta;
        if running == 0 {
            if let Some(&(&next, _)) = iter.peek() {
                if at < next {
                    gaps.push((at, next));
                }
            }
        }
    }
    gaps
}

/// Release every byte range inside `[base, base + total_size)` that no
/// interval of `intervals` covers.
///
/// Intervals are `(offset, length)` pairs relative to `base` and are
/// trusted to lie within `[0, total_size)`.
pub fn recycle_uncovered(base: usize, total_size: usize, intervals: &[(usize, usize)]) {
    for (low, high) in uncovered_ranges(total_size, intervals) {
        recycle_range(base + low, base + high);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rustix::mm::{MapFlags, ProtFlags};

    #[test]
    fn test_uncovered_empty_input_is_whole_range() {
        assert_eq!(uncovered_ranges(100, &[]), vec![(0, 100)]);
    }

    #[test]
    fn test_uncovered_full_cover_has_no_gaps() {
        assert_eq!(uncovered_ranges(100, &[(0, 50), (50, 50)]), vec![]);
        assert_eq!(uncovered_ranges(100, &[(0, 100)]), vec![]);
    }

    #[test]
    fn test_uncovered_overlapping_intervals() {
        // (10,20) and (15,10) cover [10,25) together.
        assert_eq!(
            uncovered_ranges(100, &[(10, 20), (15, 10)]),
            vec![(0, 10), (25, 100)]
        );
    }

    #[test]
    fn test_uncovered_duplicate_intervals() {
        assert_eq!(
            uncovered_ranges(100, &[(20, 30), (20, 30)]),
            vec![(0, 20), (50, 100)]
        );
    }

    #[test]
    fn test_uncovered_touching_intervals_form_one_cover() {
        assert_eq!(
            uncovered_ranges(100, &[(10, 20), (30, 20)]),
            vec![(0, 10), (50, 100)]
        );
    }

    #[test]
    fn test_uncovered_interval_at_boundaries() {
        assert_eq!(uncovered_ranges(100, &[(0, 10)]), vec![(10, 100)]);
        assert_eq!(uncovered_ranges(100, &[(90, 10)]), vec![(0, 90)]);
    }

    #[test]
    fn test_recycle_range_noop_when_rounds_to_nothing() {
        // Both boundaries inside one page: nothing to do, must not crash.
        recycle_range(1, 2);
        recycle_range(100, 100);
        recycle_range(200, 100);
    }

    #[test]
    fn test_recycle_drops_pages_and_zero_fills() {
        let page_size = rustix::param::page_size();
        let len = 4 * page_size;

        // SAFETY: fresh anonymous shared mapping, unmapped at the end.
        let base = unsafe {
            rustix::mm::mmap_anonymous(
                std::ptr::null_mut(),
                len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
            )
            .unwrap()
        }
        .cast::<u8>();

        unsafe {
            std::ptr::write_bytes(base, 0xCD, len);
            assert_eq!(*base.add(page_size), 0xCD);

            // Drop the two middle pages only.
            recycle_range(base as usize + page_size, base as usize + 3 * page_size);

            // Dropped pages read back as zeros; the rest is untouched.
            assert_eq!(*base.add(page_size), 0);
            assert_eq!(*base.add(2 * page_size), 0);
            assert_eq!(*base, 0xCD);
            assert_eq!(*base.add(3 * page_size), 0xCD);

            let _ = rustix::mm::munmap(base.cast(), len);
        }
    }

    #[test]
    fn test_recycle_uncovered_preserves_covered_bytes() {
        let page_size = rustix::param::page_size();
        let len = 8 * page_size;

        // SAFETY: fresh anonymous shared mapping, unmapped at the end.
        let base = unsafe {
            rustix::mm::mmap_anonymous(
                std::ptr::null_mut(),
                len,
                ProtFlags::READ | ProtFlags::WRITE,
                MapFlags::SHARED,
            )
            .unwrap()
        }
        .cast::<u8>();

        unsafe {
            std::ptr::write_bytes(base, 0xEF, len);

            // One live interval in the middle: pages 3..5.
            recycle_uncovered(
                base as usize,
                len,
                &[(3 * page_size, 2 * page_size)],
            );

            // Covered interval intact.
            assert_eq!(*base.add(3 * page_size), 0xEF);
            assert_eq!(*base.add(5 * page_size - 1), 0xEF);
            // Uncovered head and tail dropped.
            assert_eq!(*base, 0);
            assert_eq!(*base.add(len - 1), 0);

            let _ = rustix::mm::munmap(base.cast(), len);
        }
    }
}
