//! Longest Increasing Subsequence
//!
//! The keyed diff keeps the nodes on the longest strictly increasing run of
//! old positions where they are and moves only the rest. This is the
//! patience algorithm: one binary search per element, O(n log n) overall.
//!
//! # Algorithm
//!
//! 1. `tails[k]` holds the index of the smallest value that ends an
//!    increasing subsequence of length `k + 1` seen so far.
//!
//! 2. Each value replaces the first tail that is not smaller than it (or
//!    extends the list), and remembers the tail before it as predecessor.
//!
//! 3. Walking predecessors back from the last tail yields the subsequence.

/// Indices into `seq` of a longest strictly increasing subsequence.
///
/// `None` entries are skipped: they never belong to the result and do not
/// break a run. The returned indices are ascending.
pub fn longest_increasing_subsequence<T: Ord + Copy>(seq: &[Option<T>]) -> Vec<usize> {
    let mut tails: Vec<usize> = Vec::new();
    let mut tail_values: Vec<T> = Vec::new();
    let mut predecessor: Vec<Option<usize>> = vec![None; seq.len()];

    for (index, value) in seq.iter().enumerate() {
        let Some(value) = *value else {
            continue;
        };
        let pos = tail_values.partition_point(|tail| *tail < value);
        if pos > 0 {
            predecessor[index] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(index);
            tail_values.push(value);
        } else {
            tails[pos] = index;
            tail_values[pos] = value;
        }
    }

    let mut result = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(index) = cursor {
        result.push(index);
        cursor = predecessor[index];
    }
    result.reverse();
    result
}
