//! Batch partitioning: split ordered page texts into fixed-size batches.
//!
//! Deliberately a pure function with no I/O and no error path — every
//! property the worker pool relies on (coverage, ordering, no overlap) is
//! checkable right here with plain unit tests.

use crate::quiz::Batch;

/// Partition ordered page texts into contiguous batches of at most
/// `capacity` pages.
///
/// Produces `ceil(pages.len() / capacity)` batches in page order; every
/// batch holds exactly `capacity` pages except possibly the last. Zero
/// pages yields an empty vec.
///
/// # Panics
/// Panics if `capacity` is zero; the config builder clamps it to ≥ 1 so
/// this cannot happen through public configuration.
pub fn partition(pages: &[String], capacity: usize) -> Vec<Batch> {
    assert!(capacity > 0, "batch capacity must be ≥ 1");

    pages
        .chunks(capacity)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            pages: chunk.to_vec(),
        })
        .collect()
}
