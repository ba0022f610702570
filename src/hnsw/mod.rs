//! Hierarchical Navigable Small World (HNSW) approximate nearest neighbor
//! index.
//!
//! A multi-layer proximity graph with logarithmic expected search cost: most
//! nodes live only on layer 0, upper layers form progressively sparser
//! shortcut networks, and queries descend greedily before beam-searching the
//! bottom layer. The graph uses a Struct-of-Arrays layout — payloads live in
//! a contiguous arena (raw f32 vectors, or PQ codes when compression is
//! enabled) and nodes are referenced by dense integer id.

/// Distance metrics: squared-L2, inner product, and cosine.
pub mod distance;
/// Graph structure, configuration, and payload storage.
pub mod graph;
/// Insertion with bidirectional connections and heuristic pruning.
pub mod insert;
/// Single-layer beam search and multi-layer KNN.
pub mod search;
/// Generation-stamped visited map for graph traversal.
pub mod visited;

pub use distance::DistanceMetric;
pub use graph::{HnswConfig, HnswIndex};
pub use search::{knn_search, knn_search_with_ef};
