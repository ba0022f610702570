//! Thread-safe index handle.
//!
//! Wraps the HNSW graph in a single `RwLock`: training and inserts take the
//! write lock, searches share read locks against the current snapshot. That
//! is the simplest policy under which no reader ever observes a partially
//! linked node; callers needing concurrent read+write should batch writes.

use crate::error::{IndexError, Result};
use crate::hnsw::graph::{HnswConfig, HnswIndex};
use crate::hnsw::search::knn_search_with_ef;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// One search hit: node id and its distance to the query (lower = closer).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    pub id: u32,
    pub distance: f32,
}

/// Shared handle to an HNSW index.
///
/// Cloning the handle shares the underlying graph. All state behind the lock
/// is serde-serializable, so a host storage layer can snapshot it wholesale.
#[derive(Debug, Clone)]
pub struct VectorIndex {
    pub data: Arc<RwLock<HnswIndex>>,
}

impl VectorIndex {
    /// Create an empty index for `dimension`-sized vectors.
    pub fn new(dimension: usize, config: HnswConfig) -> Self {
        Self {
            data: Arc::new(RwLock::new(HnswIndex::new(dimension, config))),
        }
    }

    /// Create an empty index with default configuration.
    pub fn with_default_config(dimension: usize) -> Self {
        Self::new(dimension, HnswConfig::default())
    }

    /// Train the product quantizer on a sample of the corpus.
    ///
    /// Required before the first insert when PQ is configured; a no-op
    /// otherwise. Fails when the sample is too small for the configured
    /// codebook size — supply more rows or lower `bits`/`subquantizers`.
    pub fn train(&self, training: &[f32]) -> Result<()> {
        let mut index = self.data.write();
        if index.config.pq.is_none() {
            tracing::debug!("index stores raw vectors; nothing to train");
            return Ok(());
        }
        if training.len() % index.dimension != 0 {
            return Err(IndexError::DimensionMismatch {
                expected: index.dimension,
                got: training.len() % index.dimension,
            });
        }
        index.train_quantizer(training)
    }

    /// Insert a vector, returning its node id.
    pub fn insert(&self, vector: &[f32]) -> Result<u32> {
        let mut index = self.data.write();
        if vector.len() != index.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: index.dimension,
                got: vector.len(),
            });
        }
        if index.config.pq.is_some() && index.quantizer.is_none() {
            return Err(IndexError::QuantizerNotTrained);
        }
        Ok(index.insert(vector))
    }

    /// K nearest neighbors of `query` using the configured `ef_search`.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        let ef = self.data.read().config.ef_search;
        self.search_with_ef(query, k, ef)
    }

    /// K nearest neighbors with an explicit beam width (`ef` is clamped to at
    /// least `k`). Ordered by distance ascending, ties by id.
    pub fn search_with_ef(&self, query: &[f32], k: usize, ef: usize) -> Result<Vec<Neighbor>> {
        let index = self.data.read();
        if query.len() != index.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: index.dimension,
                got: query.len(),
            });
        }
        Ok(knn_search_with_ef(&index, query, k, ef)
            .into_iter()
            .map(|(distance, id)| Neighbor { id, distance })
            .collect())
    }

    /// Number of indexed vectors.
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    /// Returns `true` if no vectors are indexed.
    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hnsw::distance::DistanceMetric;
    use crate::quantization::pq::PqConfig;

    fn l2_config() -> HnswConfig {
        HnswConfig {
            metric: DistanceMetric::SquaredL2,
            ..HnswConfig::default()
        }
    }

    #[test]
    fn test_insert_and_search_roundtrip() {
        let index = VectorIndex::new(2, l2_config());
        index.insert(&[0.0, 0.0]).unwrap();
        index.insert(&[1.0, 0.0]).unwrap();
        index.insert(&[5.0, 5.0]).unwrap();

        let hits = index.search(&[0.9, 0.1], 2).unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, 1);
        assert!(hits[0].distance <= hits[1].distance);
    }

    #[test]
    fn test_dimension_mismatch_is_reported() {
        let index = VectorIndex::new(4, l2_config());
        let err = index.insert(&[1.0, 2.0]).unwrap_err();
        assert_eq!(
            err,
            IndexError::DimensionMismatch {
                expected: 4,
                got: 2
            }
        );
        assert!(index.search(&[0.0; 3], 1).is_err());
    }

    #[test]
    fn test_insert_before_training_is_rejected() {
        let config = HnswConfig {
            pq: Some(PqConfig::new(2, 2)),
            ..l2_config()
        };
        let index = VectorIndex::new(4, config);
        let err = index.insert(&[0.0; 4]).unwrap_err();
        assert_eq!(err, IndexError::QuantizerNotTrained);
    }

    #[test]
    fn test_train_without_pq_is_a_noop() {
        let index = VectorIndex::new(2, l2_config());
        index.train(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        index.insert(&[0.5, 0.5]).unwrap();
    }

    #[test]
    fn test_concurrent_searches_agree() {
        let index = VectorIndex::new(4, l2_config());
        for i in 0..300 {
            let x = (i % 17) as f32 * 0.1;
            let y = (i % 29) as f32 * 0.1;
            index.insert(&[x, y, x - y, x + y]).unwrap();
        }
        let query = [0.3, 0.7, -0.4, 1.0];
        let expected = index.search_with_ef(&query, 10, 300).unwrap();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    let hits = index.search_with_ef(&query, 10, 300).unwrap();
                    assert_eq!(hits, expected);
                });
            }
        });
    }
}
