//! Vector compression: k-means clustering, PCA, and product quantization.
//!
//! The product quantizer splits vectors into independent subspaces and trains
//! one codebook per subspace with the k-means clusterer; the PCA transformer
//! backs the hypercube-PCA centroid initialization. Trained codebooks shrink
//! each stored vector to one byte per subspace while query-time lookup tables
//! keep distance computation cheap.

/// K-means training: Lloyd's algorithm, subsampling, empty-cluster splitting,
/// and centroid initialization strategies.
pub mod kmeans;
/// Principal component analysis for the PCA-based centroid init.
pub mod pca;
/// Product quantization: codebooks, encode/decode, and distance tables.
pub mod pq;

pub use kmeans::{CentroidInit, KmeansParams};
pub use pca::PcaMatrix;
pub use pq::{PqConfig, PqDistanceTable, ProductQuantizer};
