//! Page batching for the OCR pool.

use crate::MAX_WORKERS_CAP;

/// A contiguous, inclusive range of 1-based pages handled by one worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageBatch {
    /// Position of this batch in the plan.
    pub index: usize,
    pub first: u32,
    pub last: u32,
}

impl PageBatch {
    pub fn len(&self) -> u32 {
        self.last - self.first + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn pages(&self) -> std::ops::RangeInclusive<u32> {
        self.first..=self.last
    }
}

/// Split `1..=total_pages` into batches of `batch_size` pages.
///
/// Batches never overlap and cover every page exactly once; only the last
/// batch may be short. A `batch_size` of zero is treated as one.
pub fn plan_batches(total_pages: u32, batch_size: u32) -> Vec<PageBatch> {
    let size = batch_size.max(1);
    (1..=total_pages)
        .step_by(size as usize)
        .enumerate()
        .map(|(index, first)| PageBatch {
            index,
            first,
            last: first.saturating_add(size - 1).min(total_pages),
        })
        .collect()
}

/// Default worker limit: available parallelism capped at [`MAX_WORKERS_CAP`].
pub fn default_max_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_WORKERS_CAP)
}

/// Number of workers to spawn for `batches` jobs. Never zero.
pub fn worker_count(max_workers: usize, batches: usize) -> usize {
    max_workers.min(batches).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batches_cover_every_page_once() {
        let batches = plan_batches(20, 8);
        assert_eq!(batches.len(), 3);
        assert_eq!((batches[0].first, batches[0].last), (1, 8));
        assert_eq!((batches[1].first, batches[1].last), (9, 16));
        assert_eq!((batches[2].first, batches[2].last), (17, 20));

        let pages: Vec<u32> = batches.iter().flat_map(|b| b.pages()).collect();
        assert_eq!(pages, (1..=20).collect::<Vec<_>>());
    }

    #[test]
    fn exact_multiple_has_no_short_batch() {
        let batches = plan_batches(16, 8);
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.len() == 8));
    }

    #[test]
    fn indices_are_sequential() {
        let batches = plan_batches(30, 4);
        for (i, b) in batches.iter().enumerate() {
            assert_eq!(b.index, i);
        }
    }

    #[test]
    fn zero_pages_gives_no_batches() {
        assert!(plan_batches(0, 8).is_empty());
    }

    #[test]
    fn zero_batch_size_is_one_page_per_batch() {
        let batches = plan_batches(3, 0);
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.first == b.last));
    }

    #[test]
    fn batch_larger_than_document() {
        let batches = plan_batches(5, 8);
        assert_eq!(batches.len(), 1);
        assert_eq!((batches[0].first, batches[0].last), (1, 5));
    }

    #[test]
    fn worker_count_bounds() {
        assert_eq!(worker_count(6, 100), 6);
        assert_eq!(worker_count(6, 2), 2);
        assert_eq!(worker_count(0, 5), 1);
        assert_eq!(worker_count(4, 0), 1);
    }

    #[test]
    fn default_workers_capped() {
        let n = default_max_workers();
        assert!((1..=MAX_WORKERS_CAP).contains(&n));
    }
}
