//! Product quantization for compressed-memory distance computation.
//!
//! Splits vectors into independent subspaces and learns one k-means codebook
//! per subspace. Each vector is encoded as one centroid index per subspace.
//! Query-time distance uses a precomputed lookup table: one table read and one
//! addition per subspace instead of a full `d`-dimensional computation.

use crate::config;
use crate::error::Result;
use crate::hnsw::distance::DistanceMetric;
use crate::quantization::kmeans::{self, CentroidInit, KmeansParams};
use serde::{Deserialize, Serialize};

/// PQ geometry and training knobs, supplied by the host configuration.
///
/// The index dimension must equal `sub_dim * subquantizers`; that invariant
/// is checked when the quantizer is trained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PqConfig {
    /// Codebook size exponent: each subspace learns `2^bits` centroids.
    /// At most [`config::PQ_MAX_BITS`], since codes are stored one byte each.
    pub bits: u32,
    /// Number of independent subspaces.
    pub subquantizers: usize,
    /// Centroid initialization strategy for the per-subspace k-means runs.
    pub init: CentroidInit,
    /// Training seed (permutations and splits are deterministic under it).
    pub seed: u64,
}

impl PqConfig {
    /// Config with the default init strategy and the fixed training seed.
    pub fn new(bits: u32, subquantizers: usize) -> Self {
        Self {
            bits,
            subquantizers,
            init: CentroidInit::default(),
            seed: config::KMEANS_SEED,
        }
    }

    /// Centroids per codebook: `2^bits`.
    pub fn num_centroids(&self) -> usize {
        1usize << self.bits
    }
}

/// Trained product quantizer: one codebook per subspace.
///
/// Codebooks are immutable after training; re-training replaces the
/// quantizer wholesale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductQuantizer {
    pub num_subspaces: usize,
    pub num_centroids: usize,
    pub sub_dim: usize,
    pub metric: DistanceMetric,
    /// Flat centroid array: `centroids[sub * K * sub_dim + c * sub_dim ..][..sub_dim]`.
    pub centroids: Vec<f32>,
}

impl ProductQuantizer {
    /// Train one codebook per subspace over `vectors` (`n × dim`, flat).
    ///
    /// Propagates the clusterer's insufficient-data failure; the caller must
    /// lower `bits` / `subquantizers` or supply more rows.
    pub fn train(
        dim: usize,
        pq: &PqConfig,
        metric: DistanceMetric,
        vectors: &[f32],
    ) -> Result<Self> {
        assert!(
            pq.bits >= 1 && pq.bits <= config::PQ_MAX_BITS,
            "pq bits must be in 1..={}, got {}",
            config::PQ_MAX_BITS,
            pq.bits
        );
        assert!(
            pq.subquantizers > 0 && dim % pq.subquantizers == 0,
            "dimension {dim} must be divisible by {} subquantizers",
            pq.subquantizers
        );
        assert!(
            vectors.len() % dim == 0,
            "training data must be a whole number of {dim}-dimensional vectors"
        );
        let m = pq.subquantizers;
        let k = pq.num_centroids();
        let sub_dim = dim / m;
        let n = vectors.len() / dim;

        let params = KmeansParams {
            k,
            metric,
            init: pq.init,
            seed: pq.seed,
        };
        let mut centroids = vec![0.0f32; m * k * sub_dim];
        for sub in 0..m {
            // gather this subspace's slice of every training vector
            let mut sub_vectors = vec![0.0f32; n * sub_dim];
            for i in 0..n {
                let src = i * dim + sub * sub_dim;
                sub_vectors[i * sub_dim..(i + 1) * sub_dim]
                    .copy_from_slice(&vectors[src..src + sub_dim]);
            }
            let trained = kmeans::train(&params, sub_dim, &sub_vectors)?;
            centroids[sub * k * sub_dim..(sub + 1) * k * sub_dim].copy_from_slice(&trained);
        }

        tracing::info!(
            subspaces = m,
            centroids = k,
            sub_dim,
            rows = n,
            "trained product quantizer"
        );
        Ok(Self {
            num_subspaces: m,
            num_centroids: k,
            sub_dim,
            metric,
            centroids,
        })
    }

    /// Full vector dimension this quantizer was trained for.
    pub fn dimension(&self) -> usize {
        self.num_subspaces * self.sub_dim
    }

    #[inline]
    fn subspace_centroids(&self, sub: usize) -> &[f32] {
        let span = self.num_centroids * self.sub_dim;
        &self.centroids[sub * span..(sub + 1) * span]
    }

    /// Encode a vector as one centroid index per subspace, appended to `codes`.
    pub fn encode_into(&self, vector: &[f32], codes: &mut Vec<u8>) {
        debug_assert_eq!(vector.len(), self.dimension());
        for sub in 0..self.num_subspaces {
            let sv = &vector[sub * self.sub_dim..(sub + 1) * self.sub_dim];
            let (ci, _) = self.metric.nearest(sv, self.subspace_centroids(sub));
            codes.push(ci as u8);
        }
    }

    /// Encode a vector into a fresh code of exactly `num_subspaces` bytes.
    pub fn encode(&self, vector: &[f32]) -> Vec<u8> {
        let mut codes = Vec::with_capacity(self.num_subspaces);
        self.encode_into(vector, &mut codes);
        codes
    }

    /// Reconstruct the approximate vector for a code into `out`.
    pub fn decode_into(&self, codes: &[u8], out: &mut [f32]) {
        debug_assert_eq!(codes.len(), self.num_subspaces);
        debug_assert_eq!(out.len(), self.dimension());
        for (sub, &code) in codes.iter().enumerate() {
            let c_start = (code as usize) * self.sub_dim;
            let centroid = &self.subspace_centroids(sub)[c_start..c_start + self.sub_dim];
            out[sub * self.sub_dim..(sub + 1) * self.sub_dim].copy_from_slice(centroid);
        }
    }

    /// Reconstruct the approximate vector for a code.
    pub fn decode(&self, codes: &[u8]) -> Vec<f32> {
        let mut out = vec![0.0f32; self.dimension()];
        self.decode_into(codes, &mut out);
        out
    }

    /// Decode-then-distance path. Exact with respect to the reconstruction;
    /// [`build_distance_table`](ProductQuantizer::build_distance_table) is the
    /// preferred batch path at query time.
    pub fn approximate_distance(&self, query: &[f32], codes: &[u8]) -> f32 {
        let mut buf = vec![0.0f32; self.dimension()];
        self.decode_into(codes, &mut buf);
        self.metric.distance(query, &buf)
    }

    /// Precompute the per-subspace distance table for one query.
    ///
    /// Squared-L2 and inner product decompose additively over subspaces, so
    /// the table stores partial distances directly. Cosine does not: the
    /// table stores partial dots plus partial squared centroid norms, and
    /// [`PqDistanceTable::distance`] recombines them, which makes the result
    /// exactly the cosine distance to the reconstructed vector.
    pub fn build_distance_table(&self, query: &[f32]) -> PqDistanceTable {
        debug_assert_eq!(query.len(), self.dimension());
        let k = self.num_centroids;
        let m = self.num_subspaces;
        let mut table = vec![0.0f32; m * k];
        let mut norms = Vec::new();
        let mut query_norm = 0.0f32;

        match self.metric {
            DistanceMetric::SquaredL2 | DistanceMetric::InnerProduct => {
                for sub in 0..m {
                    let q_sub = &query[sub * self.sub_dim..(sub + 1) * self.sub_dim];
                    let cents = self.subspace_centroids(sub);
                    for (ci, centroid) in cents.chunks_exact(self.sub_dim).enumerate() {
                        table[sub * k + ci] = self.metric.distance(q_sub, centroid);
                    }
                }
            }
            DistanceMetric::Cosine => {
                norms = vec![0.0f32; m * k];
                query_norm = -DistanceMetric::InnerProduct.distance(query, query);
                query_norm = query_norm.sqrt();
                let ip = DistanceMetric::InnerProduct;
                for sub in 0..m {
                    let q_sub = &query[sub * self.sub_dim..(sub + 1) * self.sub_dim];
                    let cents = self.subspace_centroids(sub);
                    for (ci, centroid) in cents.chunks_exact(self.sub_dim).enumerate() {
                        table[sub * k + ci] = -ip.distance(q_sub, centroid);
                        norms[sub * k + ci] = -ip.distance(centroid, centroid);
                    }
                }
            }
        }

        PqDistanceTable {
            metric: self.metric,
            num_subspaces: m,
            num_centroids: k,
            table,
            norms,
            query_norm,
        }
    }
}

/// Precomputed distance table for a single query.
#[derive(Debug)]
pub struct PqDistanceTable {
    metric: DistanceMetric,
    num_subspaces: usize,
    num_centroids: usize,
    /// Partial distances (squared-L2 / inner product) or partial dots (cosine).
    table: Vec<f32>,
    /// Partial squared centroid norms; cosine only.
    norms: Vec<f32>,
    /// Query norm; cosine only.
    query_norm: f32,
}

impl PqDistanceTable {
    /// Approximate distance from the query to a PQ-encoded vector.
    ///
    /// Equals `metric.distance(query, decode(codes))` up to float rounding.
    #[inline]
    pub fn distance(&self, codes: &[u8]) -> f32 {
        debug_assert_eq!(codes.len(), self.num_subspaces);
        let k = self.num_centroids;
        match self.metric {
            DistanceMetric::SquaredL2 | DistanceMetric::InnerProduct => {
                let mut dist = 0.0f32;
                for (sub, &code) in codes.iter().enumerate() {
                    dist += unsafe { *self.table.get_unchecked(sub * k + code as usize) };
                }
                dist
            }
            DistanceMetric::Cosine => {
                let mut dot = 0.0f32;
                let mut norm_sq = 0.0f32;
                for (sub, &code) in codes.iter().enumerate() {
                    let idx = sub * k + code as usize;
                    dot += self.table[idx];
                    norm_sq += self.norms[idx];
                }
                let denom = self.query_norm * norm_sq.sqrt();
                if denom <= f32::EPSILON {
                    1.0
                } else {
                    1.0 - dot / denom
                }
            }
        }
    }
}
