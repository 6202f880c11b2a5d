//! Brute-force in-memory index
//!
//! Exact L2 top-k over every base vector. Slow by design of the algorithm,
//! which makes it a useful CPU-bound target for concurrency sweeps.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use super::{DbSession, VectorDb};
use crate::bail_invalid;
use crate::dataset::{random_vectors, QueryVector, SearchFilter};
use crate::error::{Result, SearchError};

/// Base vectors with implicit ids `0..len`
#[derive(Debug)]
pub struct FlatIndex {
    vectors: Vec<QueryVector>,
    dim: usize,
}

impl FlatIndex {
    pub fn new(vectors: Vec<QueryVector>) -> Result<Self> {
        let Some(dim) = vectors.first().map(Vec::len) else {
            bail_invalid!("flat index", "no base vectors");
        };
        if vectors.iter().any(|v| v.len() != dim) {
            bail_invalid!("flat index", "base vectors have mixed dimensions");
        }
        Ok(Self { vectors, dim })
    }

    /// Index of `size` seeded random vectors
    pub fn random(size: usize, dim: usize, seed: u64) -> Result<Self> {
        Self::new(random_vectors(size, dim, seed))
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Ids of the `k` nearest base vectors, closest first
    pub fn top_k(&self, query: &[f32], k: usize, filter: Option<&SearchFilter>) -> Vec<u64> {
        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
        for (id, vector) in (0u64..).zip(&self.vectors) {
            if filter.is_some_and(|f| !f.matches(id)) {
                continue;
            }
            heap.push(Candidate {
                distance: squared_l2(query, vector),
                id,
            });
            if heap.len() > k {
                heap.pop();
            }
        }
        heap.into_sorted_vec().into_iter().map(|c| c.id).collect()
    }
}

fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
}

/// Max-heap entry ordered by distance
#[derive(Debug, PartialEq)]
struct Candidate {
    distance: f32,
    id: u64,
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then_with(|| self.id.cmp(&other.id))
    }
}

impl VectorDb for FlatIndex {
    fn name(&self) -> &str {
        "flat"
    }

    fn session(&self) -> std::result::Result<Box<dyn DbSession + '_>, SearchError> {
        Ok(Box::new(FlatSession { index: self }))
    }
}

struct FlatSession<'a> {
    index: &'a FlatIndex,
}

impl DbSession for FlatSession<'_> {
    fn search_batch(
        &mut self,
        queries: &[QueryVector],
        k: usize,
        filter: Option<&SearchFilter>,
    ) -> std::result::Result<usize, SearchError> {
        let mut rows = 0;
        for query in queries {
            if query.len() != self.index.dim {
                return Err(SearchError::Query(format!(
                    "query dimension {} does not match index dimension {}",
                    query.len(),
                    self.index.dim
                )));
            }
            rows += self.index.top_k(query, k, filter).len();
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line_index() -> FlatIndex {
        FlatIndex::new((0..10).map(|i| vec![i as f32, 0.0]).collect()).unwrap()
    }

    #[test]
    fn test_top_k_orders_by_distance() {
        let index = line_index();
        assert_eq!(index.top_k(&[3.1, 0.0], 3, None), vec![3, 4, 2]);
    }

    #[test]
    fn test_top_k_respects_filter() {
        let index = line_index();
        let filter = SearchFilter::id_gte(6);
        assert_eq!(index.top_k(&[0.0, 0.0], 2, Some(&filter)), vec![6, 7]);
    }

    #[test]
    fn test_top_k_smaller_than_k() {
        let index = line_index();
        let filter = SearchFilter::id_gte(8);
        assert_eq!(index.top_k(&[0.0, 0.0], 5, Some(&filter)).len(), 2);
    }

    #[test]
    fn test_session_rejects_wrong_dimension() {
        let index = line_index();
        let mut session = index.session().unwrap();
        let err = session.search_batch(&[vec![1.0]], 1, None).unwrap_err();
        assert!(matches!(err, SearchError::Query(_)));
    }

    #[test]
    fn test_session_counts_rows_per_batch() {
        let index = line_index();
        let mut session = index.session().unwrap();
        let rows = session
            .search_batch(&[vec![0.0, 0.0], vec![9.0, 0.0]], 4, None)
            .unwrap();
        assert_eq!(rows, 8);
    }
}
