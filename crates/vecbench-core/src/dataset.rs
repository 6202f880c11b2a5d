//! Shared test dataset
//!
//! The query set is loaded once and shared read-only with every worker of
//! every concurrency level. Workers hold a [`DatasetHandle`] (an `Arc`), so
//! query vectors are never copied per worker. The owning [`SharedDataset`]
//! releases its reference exactly once; the backing memory goes away when
//! the last handle is dropped.

use std::fs;
use std::ops::Range;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::bail_invalid;
use crate::error::{BenchError, Result};

/// A single fixed-length query vector
pub type QueryVector = Vec<f32>;

/// Predicate set applied to every search request of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SearchFilter {
    /// Only rows whose integer id is greater than or equal to this bound match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_gte: Option<u64>,
}

impl SearchFilter {
    /// Filter matching ids `>= bound`
    pub fn id_gte(bound: u64) -> Self {
        Self {
            id_gte: Some(bound),
        }
    }

    /// Whether a row with the given id passes the filter
    pub fn matches(&self, id: u64) -> bool {
        self.id_gte.map_or(true, |bound| id >= bound)
    }
}

/// Immutable set of test queries plus an optional filter
#[derive(Debug, Clone, PartialEq)]
pub struct TestDataset {
    queries: Vec<QueryVector>,
    dim: usize,
    filter: Option<SearchFilter>,
}

impl TestDataset {
    /// Build a dataset, rejecting empty sets and mixed dimensions
    pub fn new(queries: Vec<QueryVector>, filter: Option<SearchFilter>) -> Result<Self> {
        let Some(first) = queries.first() else {
            bail_invalid!("test dataset", "no query vectors");
        };
        let dim = first.len();
        if dim == 0 {
            bail_invalid!("test dataset", "query vectors have zero dimension");
        }
        if let Some((i, q)) = queries.iter().enumerate().find(|(_, q)| q.len() != dim) {
            bail_invalid!(
                "test dataset",
                format!("query {} has dimension {}, expected {}", i, q.len(), dim)
            );
        }

        Ok(Self {
            queries,
            dim,
            filter,
        })
    }

    pub fn queries(&self) -> &[QueryVector] {
        &self.queries
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn filter(&self) -> Option<&SearchFilter> {
        self.filter.as_ref()
    }

    /// Queries covered by a cursor range
    pub fn batch(&self, range: Range<usize>) -> &[QueryVector] {
        &self.queries[range]
    }
}

/// Read-only, cheaply cloneable reference to a shared dataset
#[derive(Debug, Clone)]
pub struct DatasetHandle {
    inner: Arc<TestDataset>,
}

impl DatasetHandle {
    pub fn read(&self) -> &TestDataset {
        &self.inner
    }

    /// Whether two handles point at the same backing allocation
    pub fn shares_storage_with(&self, other: &DatasetHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// Owner of the shared dataset for the lifetime of a sweep
#[derive(Debug)]
pub struct SharedDataset {
    slot: Mutex<Option<Arc<TestDataset>>>,
}

impl SharedDataset {
    /// Place the dataset in shared storage
    pub fn create(dataset: TestDataset) -> Self {
        tracing::debug!(
            queries = dataset.len(),
            dim = dataset.dim(),
            "shared_dataset_created"
        );
        Self {
            slot: Mutex::new(Some(Arc::new(dataset))),
        }
    }

    /// Lend a handle to a worker
    pub fn handle(&self) -> Result<DatasetHandle> {
        let slot = self.lock_slot();
        slot.as_ref()
            .map(|inner| DatasetHandle {
                inner: Arc::clone(inner),
            })
            .ok_or(BenchError::DatasetReleased)
    }

    /// Drop the owner's reference. Calling this more than once is a no-op.
    pub fn release(&self) {
        let released = self.lock_slot().take();
        match released {
            Some(inner) => {
                tracing::debug!(
                    outstanding_handles = Arc::strong_count(&inner) - 1,
                    "shared_dataset_released"
                );
            }
            None => tracing::debug!("shared_dataset_already_released"),
        }
    }

    pub fn is_released(&self) -> bool {
        self.lock_slot().is_none()
    }

    fn lock_slot(&self) -> std::sync::MutexGuard<'_, Option<Arc<TestDataset>>> {
        // The slot holds no invariant a panicking holder could break
        self.slot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

/// Wrapping cursor over batches of `nq` queries
#[derive(Debug, Clone)]
pub struct BatchCursor {
    len: usize,
    nq: usize,
    offset: usize,
}

impl BatchCursor {
    pub fn new(len: usize, nq: usize) -> Result<Self> {
        if nq == 0 {
            bail_invalid!("batch size", "nq must be at least 1");
        }
        if nq > len {
            bail_invalid!(
                "batch size",
                format!("nq {} exceeds dataset length {}", nq, len)
            );
        }
        Ok(Self { len, nq, offset: 0 })
    }

    /// Next batch range; resumes at offset 0 once a full batch no longer fits
    pub fn next_batch(&mut self) -> Range<usize> {
        if self.offset + self.nq > self.len {
            self.offset = 0;
        }
        let range = self.offset..self.offset + self.nq;
        self.offset += self.nq;
        range
    }
}

/// Where the CLI obtains test queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DatasetSource {
    /// Deterministic uniform vectors in `[-1, 1)`
    Random { count: usize, dim: usize, seed: u64 },
    /// JSON array of arrays of floats
    File { path: PathBuf },
}

impl Default for DatasetSource {
    fn default() -> Self {
        DatasetSource::Random {
            count: 1000,
            dim: 128,
            seed: 42,
        }
    }
}

impl DatasetSource {
    /// Materialize the query vectors
    pub fn load(&self, filter: Option<SearchFilter>) -> Result<TestDataset> {
        let queries = match self {
            DatasetSource::Random { count, dim, seed } => random_vectors(*count, *dim, *seed),
            DatasetSource::File { path } => read_query_file(path)?,
        };
        TestDataset::new(queries, filter)
    }
}

/// Generate `count` vectors of `dim` floats from a seeded RNG
pub fn random_vectors(count: usize, dim: usize, seed: u64) -> Vec<QueryVector> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..count)
        .map(|_| (0..dim).map(|_| rng.gen_range(-1.0f32..1.0)).collect())
        .collect()
}

fn read_query_file(path: &Path) -> Result<Vec<QueryVector>> {
    if !path.exists() {
        return Err(BenchError::not_found("dataset file", path.display()));
    }
    let content = fs::read_to_string(path)?;
    let queries: Vec<QueryVector> = serde_json::from_str(&content)?;
    Ok(queries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn dataset(n: usize) -> TestDataset {
        TestDataset::new(random_vectors(n, 4, 7), None).unwrap()
    }

    #[test]
    fn test_rejects_empty_dataset() {
        let err = TestDataset::new(Vec::new(), None).unwrap_err();
        assert!(matches!(err, BenchError::InvalidValue { .. }));
    }

    #[test]
    fn test_rejects_mixed_dimensions() {
        let err = TestDataset::new(vec![vec![0.0, 1.0], vec![0.5]], None).unwrap_err();
        assert!(err.to_string().contains("query 1 has dimension 1"));
    }

    #[test]
    fn test_handles_share_storage() {
        let shared = SharedDataset::create(dataset(10));
        let a = shared.handle().unwrap();
        let b = shared.handle().unwrap();
        assert!(a.shares_storage_with(&b));
        assert_eq!(a.read().len(), 10);
    }

    #[test]
    fn test_release_is_idempotent() {
        let shared = SharedDataset::create(dataset(3));
        shared.release();
        shared.release();
        assert!(shared.is_released());
        assert!(matches!(shared.handle(), Err(BenchError::DatasetReleased)));
    }

    #[test]
    fn test_outstanding_handle_survives_release() {
        let shared = SharedDataset::create(dataset(3));
        let handle = shared.handle().unwrap();
        shared.release();
        assert_eq!(handle.read().len(), 3);
    }

    #[test]
    fn test_cursor_wraps_to_start() {
        let mut cursor = BatchCursor::new(5, 2).unwrap();
        assert_eq!(cursor.next_batch(), 0..2);
        assert_eq!(cursor.next_batch(), 2..4);
        // 4..6 would run past the end
        assert_eq!(cursor.next_batch(), 0..2);
    }

    #[test]
    fn test_cursor_never_out_of_bounds() {
        let len = 7;
        for nq in 1..=len {
            let mut cursor = BatchCursor::new(len, nq).unwrap();
            for _ in 0..50 {
                let range = cursor.next_batch();
                assert_eq!(range.len(), nq);
                assert!(range.end <= len);
            }
        }
    }

    #[test]
    fn test_cursor_single_batch_covers_dataset() {
        let mut cursor = BatchCursor::new(3, 3).unwrap();
        assert_eq!(cursor.next_batch(), 0..3);
        assert_eq!(cursor.next_batch(), 0..3);
    }

    #[test]
    fn test_cursor_rejects_oversized_batch() {
        assert!(BatchCursor::new(2, 3).is_err());
        assert!(BatchCursor::new(2, 0).is_err());
    }

    #[test]
    fn test_filter_matches() {
        let filter = SearchFilter::id_gte(10);
        assert!(!filter.matches(9));
        assert!(filter.matches(10));
        assert!(SearchFilter::default().matches(0));
    }

    #[test]
    fn test_random_source_is_deterministic() {
        let source = DatasetSource::Random {
            count: 8,
            dim: 3,
            seed: 1,
        };
        let a = source.load(None).unwrap();
        let b = source.load(None).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.dim(), 3);
        assert!(a.queries().iter().flatten().all(|v| (-1.0..1.0).contains(v)));
    }

    #[test]
    fn test_file_source() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queries.json");
        fs::write(&path, "[[0.1, 0.2], [0.3, 0.4], [0.5, 0.6]]").unwrap();

        let dataset = DatasetSource::File { path }.load(None).unwrap();
        assert_eq!(dataset.len(), 3);
        assert_eq!(dataset.queries()[1], vec![0.3, 0.4]);
    }

    #[test]
    fn test_missing_file_source() {
        let source = DatasetSource::File {
            path: PathBuf::from("/nonexistent/queries.json"),
        };
        assert!(matches!(
            source.load(None),
            Err(BenchError::NotFound { .. })
        ));
    }
}
