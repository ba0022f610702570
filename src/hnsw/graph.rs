//! HNSW graph structure and configuration.
//!
//! [`HnswConfig`] defines tuning parameters (M, ef_construction, ef_search,
//! distance metric, optional PQ geometry). [`HnswIndex`] stores the graph in
//! Struct-of-Arrays layout: node payloads live in a contiguous arena (raw f32
//! vectors, or PQ codes when compression is enabled) and nodes are referenced
//! by dense integer id, never by pointer.

use crate::config;
use crate::error::Result;
use crate::hnsw::distance::DistanceMetric;
use crate::quantization::pq::{PqConfig, PqDistanceTable, ProductQuantizer};
use serde::{Deserialize, Serialize};

/// Configuration parameters for an HNSW index.
///
/// Controls the trade-off between build speed, search speed, recall, and
/// memory usage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Number of bidirectional links per node (except layer 0, which uses `m_max0`).
    pub m: usize,
    /// Maximum links per node at layer 0 (typically `2 * m`).
    pub m_max0: usize,
    /// Candidate list size during index construction.
    pub ef_construction: usize,
    /// Candidate list size during search (higher = better recall, slower).
    pub ef_search: usize,
    /// Maximum number of layers in the graph.
    pub max_layers: usize,
    /// Distance function for similarity computation.
    pub metric: DistanceMetric,
    /// Product quantization geometry. `None` stores raw f32 vectors; `Some`
    /// stores only PQ codes and searches the graph with compressed distances.
    pub pq: Option<PqConfig>,
}

impl Default for HnswConfig {
    fn default() -> Self {
        Self {
            m: config::HNSW_DEFAULT_M,
            m_max0: config::HNSW_DEFAULT_M * 2,
            ef_construction: config::HNSW_DEFAULT_EF_CONSTRUCTION,
            ef_search: config::HNSW_DEFAULT_EF_SEARCH,
            max_layers: config::HNSW_DEFAULT_MAX_LAYERS,
            metric: DistanceMetric::Cosine,
            pq: None,
        }
    }
}

/// HNSW index using Struct-of-Arrays layout for cache-friendly access.
///
/// A node is created once on insertion and never relocated; its neighbor
/// lists are the only mutable part afterwards. The payload arena holds either
/// raw vectors or PQ codes, selected once per index instance.
#[derive(Debug, Serialize, Deserialize)]
pub struct HnswIndex {
    pub config: HnswConfig,
    /// Raw vector arena; empty when PQ compression is enabled.
    pub vectors: Vec<f32>,
    /// PQ code arena; empty in raw mode.
    pub codes: Vec<u8>,
    /// Trained quantizer (`None` in raw mode, or before training).
    pub quantizer: Option<ProductQuantizer>,
    /// `neighbors[node][layer]`: (cached distance, neighbor id) pairs,
    /// ascending by distance. Length ≤ `m` (≤ `m_max0` at layer 0).
    pub neighbors: Vec<Vec<Vec<(f32, u32)>>>,
    /// Highest layer assigned to each node.
    pub layers: Vec<u8>,
    /// Global entry point; always a node on the highest populated layer.
    pub entry_point: Option<u32>,
    pub max_layer: usize,
    pub dimension: usize,
    pub node_count: u32,
}

/// Portable software prefetch hint (L1 cache, read).
/// No-op on unsupported platforms.
#[inline(always)]
fn prefetch_read(ptr: *const u8) {
    #[cfg(target_arch = "aarch64")]
    unsafe {
        std::arch::asm!(
            "prfm pldl1keep, [{ptr}]",
            ptr = in(reg) ptr,
            options(nostack, preserves_flags)
        );
    }
    #[cfg(target_arch = "x86_64")]
    unsafe {
        std::arch::x86_64::_mm_prefetch(ptr as *const i8, std::arch::x86_64::_MM_HINT_T0);
    }
    #[cfg(not(any(target_arch = "aarch64", target_arch = "x86_64")))]
    let _ = ptr;
}

impl HnswIndex {
    /// Creates a new empty HNSW index with the given dimension and
    /// configuration.
    ///
    /// Panics on inconsistent configuration (zero/oversized dimension, `m`
    /// too small, or a PQ geometry that does not divide the dimension) —
    /// continuing with such a config would corrupt the graph or codebooks.
    pub fn new(dimension: usize, config: HnswConfig) -> Self {
        assert!(
            dimension > 0 && dimension <= crate::config::MAX_DIMENSION,
            "dimension must be in 1..={}, got {dimension}",
            crate::config::MAX_DIMENSION
        );
        assert!(config.m >= 2, "m must be at least 2");
        assert!(config.m_max0 >= config.m, "m_max0 must be at least m");
        assert!(config.ef_construction >= 1 && config.max_layers >= 1);
        if let Some(pq) = &config.pq {
            assert!(
                pq.bits >= 1 && pq.bits <= crate::config::PQ_MAX_BITS,
                "pq bits must be in 1..={}",
                crate::config::PQ_MAX_BITS
            );
            assert!(
                pq.subquantizers > 0 && dimension % pq.subquantizers == 0,
                "dimension {dimension} must equal sub_dim * subquantizers ({})",
                pq.subquantizers
            );
        }
        Self {
            config,
            vectors: Vec::new(),
            codes: Vec::new(),
            quantizer: None,
            neighbors: Vec::new(),
            layers: Vec::new(),
            entry_point: None,
            max_layer: 0,
            dimension,
            node_count: 0,
        }
    }

    /// Creates a new empty HNSW index with default configuration.
    pub fn with_default_config(dimension: usize) -> Self {
        Self::new(dimension, HnswConfig::default())
    }

    /// Number of nodes in the index.
    pub fn len(&self) -> usize {
        self.node_count as usize
    }

    /// Returns `true` if the index contains no nodes.
    pub fn is_empty(&self) -> bool {
        self.node_count == 0
    }

    /// Returns `true` when the index stores PQ codes instead of raw vectors.
    pub fn is_compressed(&self) -> bool {
        self.config.pq.is_some()
    }

    /// Generate a random layer for a new node using an exponential
    /// distribution, so the expected node count halves each layer up.
    pub fn random_level(&self) -> usize {
        let ml = 1.0 / (self.config.m as f64).ln();
        // rand::random() is uniform on [0,1); flip to (0,1] so ln stays finite
        let u: f64 = 1.0 - rand::random::<f64>();
        let level = (-u.ln() * ml).floor() as usize;
        level.min(self.config.max_layers - 1)
    }

    /// Train the product quantizer on a sample of the corpus and install it.
    ///
    /// Must run before the first insert; codebooks are immutable afterwards.
    pub fn train_quantizer(&mut self, training: &[f32]) -> Result<()> {
        let pq = *self
            .config
            .pq
            .as_ref()
            .expect("index is not configured for PQ compression");
        assert_eq!(
            self.node_count, 0,
            "quantizer must be trained before inserting"
        );
        let quantizer =
            ProductQuantizer::train(self.dimension, &pq, self.config.metric, training)?;
        self.quantizer = Some(quantizer);
        Ok(())
    }

    /// Raw vector slice for a node. O(1) into the contiguous arena.
    /// Only valid in raw mode.
    #[inline]
    pub fn vector(&self, id: u32) -> &[f32] {
        debug_assert!(!self.is_compressed(), "raw vectors are not stored in PQ mode");
        let start = id as usize * self.dimension;
        &self.vectors[start..start + self.dimension]
    }

    /// PQ code slice for a node. Only valid once the quantizer is trained.
    #[inline]
    pub fn node_codes(&self, id: u32) -> &[u8] {
        let m = self
            .quantizer
            .as_ref()
            .expect("PQ codes require a trained quantizer")
            .num_subspaces;
        let start = id as usize * m;
        &self.codes[start..start + m]
    }

    /// Reconstruct a node's vector into `out` (copy in raw mode, decode in
    /// PQ mode). No allocation.
    pub fn reconstruct_into(&self, id: u32, out: &mut [f32]) {
        match &self.quantizer {
            Some(q) => q.decode_into(self.node_codes(id), out),
            None => out.copy_from_slice(self.vector(id)),
        }
    }

    /// Distance from a query vector to a stored node.
    ///
    /// Uses the precomputed lookup table when one is supplied (PQ fast path),
    /// decode-then-distance when compressed without a table, and the exact
    /// raw distance otherwise. Transparent to the traversal logic.
    #[inline]
    pub fn distance_to(&self, query: &[f32], id: u32, table: Option<&PqDistanceTable>) -> f32 {
        match (table, &self.quantizer) {
            (Some(t), _) => t.distance(self.node_codes(id)),
            (None, Some(q)) => q.approximate_distance(query, self.node_codes(id)),
            (None, None) => self.config.metric.distance(query, self.vector(id)),
        }
    }

    /// Build the per-query distance lookup table in PQ mode.
    pub fn build_query_table(&self, query: &[f32]) -> Option<PqDistanceTable> {
        self.quantizer.as_ref().map(|q| q.build_distance_table(query))
    }

    /// Prefetch a node's payload into L1 cache.
    #[inline(always)]
    pub fn prefetch_node(&self, id: u32) {
        if let Some(q) = &self.quantizer {
            let start = id as usize * q.num_subspaces;
            if start < self.codes.len() {
                prefetch_read(unsafe { self.codes.as_ptr().add(start) });
            }
        } else {
            let start = id as usize * self.dimension;
            if start < self.vectors.len() {
                let ptr = unsafe { self.vectors.as_ptr().add(start) as *const u8 };
                prefetch_read(ptr);
                if self.dimension > 16 {
                    prefetch_read(unsafe { ptr.add(64) });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_index_is_empty() {
        let index = HnswIndex::with_default_config(8);
        assert!(index.is_empty());
        assert_eq!(index.len(), 0);
        assert!(index.entry_point.is_none());
    }

    #[test]
    fn test_random_level_stays_below_cap() {
        let index = HnswIndex::with_default_config(8);
        for _ in 0..1000 {
            assert!(index.random_level() < index.config.max_layers);
        }
    }

    #[test]
    #[should_panic(expected = "sub_dim * subquantizers")]
    fn test_pq_geometry_must_divide_dimension() {
        let config = HnswConfig {
            pq: Some(crate::quantization::pq::PqConfig::new(4, 3)),
            ..HnswConfig::default()
        };
        let _ = HnswIndex::new(8, config);
    }

    #[test]
    fn test_reconstruct_raw_roundtrip() {
        let mut index = HnswIndex::new(
            4,
            HnswConfig {
                metric: DistanceMetric::SquaredL2,
                ..HnswConfig::default()
            },
        );
        let v = vec![0.5, -1.0, 2.0, 3.5];
        let id = index.insert(&v);
        let mut out = vec![0.0f32; 4];
        index.reconstruct_into(id, &mut out);
        assert_eq!(out, v);
    }
}
