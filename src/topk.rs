//! Top-K selection
//!
//! Heap-based selection of the best K items by a numeric key: O(N log K)
//! instead of sorting everything. Ties keep input order, so rankings of trial
//! records (already in index order) favor the lower trial index.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::{Error, Result};

/// Sort order for Top-K selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Ascending order (smallest K values)
    Ascending,
    /// Descending order (largest K values)
    Descending,
}

/// Heap entry ordered so the *worst* kept item sits on top.
#[derive(Debug)]
struct HeapItem {
    value: f64,
    position: usize,
    order: SortOrder,
}

impl HeapItem {
    /// `Greater` means `self` ranks worse than `other`.
    fn rank_cmp(&self, other: &Self) -> Ordering {
        let by_value = match self.order {
            SortOrder::Descending => other.value.total_cmp(&self.value),
            SortOrder::Ascending => self.value.total_cmp(&other.value),
        };
        by_value.then(self.position.cmp(&other.position))
    }
}

impl PartialEq for HeapItem {
    fn eq(&self, other: &Self) -> bool {
        self.rank_cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapItem {}

impl Ord for HeapItem {
    fn cmp(&self, other: &Self) -> Ordering {
        self.rank_cmp(other)
    }
}

impl PartialOrd for HeapItem {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Select the positions of the best `k` values, best first.
///
/// Values that are NaN are skipped.
///
/// # Errors
///
/// Returns [`Error::InvalidInput`] if `k` is zero.
///
/// # Examples
///
/// ```rust
/// use flowtune::topk::{top_k_positions, SortOrder};
///
/// let utilities = [0.4, 0.9, 0.1, 0.9];
/// let best = top_k_positions(utilities, 2, SortOrder::Descending).unwrap();
/// assert_eq!(best, vec![1, 3]);
/// ```
pub fn top_k_positions(values: impl IntoIterator<Item = f64>, k: usize, order: SortOrder) -> Result<Vec<usize>> {
    if k == 0 {
        return Err(Error::InvalidInput("k must be greater than 0".to_string()));
    }

    let mut heap: BinaryHeap<HeapItem> = BinaryHeap::with_capacity(k + 1);
    for (position, value) in values.into_iter().enumerate() {
        if value.is_nan() {
            continue;
        }
        heap.push(HeapItem {
            value,
            position,
            order,
        });
        if heap.len() > k {
            heap.pop();
        }
    }

    Ok(heap
        .into_sorted_vec()
        .into_iter()
        .map(|item| item.position)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_top_k_descending_basic() {
        let values = [1.0, 5.0, 3.0, 9.0, 2.0];
        let top = top_k_positions(values, 3, SortOrder::Descending).unwrap();
        assert_eq!(top, vec![3, 1, 2]);
    }

    #[test]
    fn test_top_k_ascending_basic() {
        let values = [1.0, 5.0, 3.0, 9.0, 2.0];
        let top = top_k_positions(values, 2, SortOrder::Ascending).unwrap();
        assert_eq!(top, vec![0, 4]);
    }

    #[test]
    fn test_top_k_k_greater_than_length() {
        let top = top_k_positions([0.2, 0.1], 10, SortOrder::Descending).unwrap();
        assert_eq!(top, vec![0, 1]);
    }

    #[test]
    fn test_top_k_k_zero_fails() {
        let err = top_k_positions([1.0], 0, SortOrder::Descending).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_top_k_ties_keep_input_order() {
        let values = [0.5, 0.9, 0.9, 0.9];
        let top = top_k_positions(values, 2, SortOrder::Descending).unwrap();
        assert_eq!(top, vec![1, 2]);
    }

    #[test]
    fn test_top_k_skips_nan() {
        let values = [f64::NAN, 0.3, 0.7];
        let top = top_k_positions(values, 3, SortOrder::Descending).unwrap();
        assert_eq!(top, vec![2, 1]);
    }

    #[test]
    fn test_top_k_large_dataset() {
        let values: Vec<f64> = (0..10_000_u32).map(|i| f64::from((i * 7919) % 10_007)).collect();
        let top = top_k_positions(values.iter().copied(), 5, SortOrder::Descending).unwrap();
        let mut sorted = values.clone();
        sorted.sort_by(|a, b| b.total_cmp(a));
        let picked: Vec<f64> = top.iter().map(|&p| values[p]).collect();
        assert_eq!(picked, sorted[..5].to_vec());
    }
}
