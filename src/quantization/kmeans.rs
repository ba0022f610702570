//! K-means training for quantizer codebooks.
//!
//! Lloyd's algorithm with deterministic subsampling, empty-cluster splitting,
//! and three centroid initialization strategies. Assignment is parallel per
//! training vector; centroid recomputation is a fork-join over disjoint
//! centroid ranges, so no worker ever writes another worker's output.

use crate::config;
use crate::error::{IndexError, Result};
use crate::hnsw::distance::DistanceMetric;
use crate::quantization::pca::PcaMatrix;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Centroid initialization strategy, chosen per index build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CentroidInit {
    /// Seeded permutation of the training set; the first `k` points become
    /// the initial centroids.
    #[default]
    Random,
    /// Corners of a hypercube centered on the per-dimension mean, scaled by
    /// the largest absolute mean offset. Data-oblivious beyond first moments;
    /// requires a power-of-two centroid count.
    Hypercube,
    /// Hypercube corners along the top principal components, scaled by the
    /// square root of each eigenvalue. Converges faster on anisotropic data;
    /// requires a power-of-two centroid count.
    HypercubePca,
}

/// Training parameters threaded explicitly through every call, so runs stay
/// reproducible and tests can vary seeds independently.
#[derive(Debug, Clone, Copy)]
pub struct KmeansParams {
    /// Number of centroids to produce.
    pub k: usize,
    /// Metric used for point-to-centroid assignment.
    pub metric: DistanceMetric,
    /// Initialization strategy.
    pub init: CentroidInit,
    /// Base seed; subsampling uses it directly, random init uses `seed + 1`.
    pub seed: u64,
}

impl KmeansParams {
    /// Parameters with the default init strategy and the fixed training seed.
    pub fn new(k: usize, metric: DistanceMetric) -> Self {
        Self {
            k,
            metric,
            init: CentroidInit::default(),
            seed: config::KMEANS_SEED,
        }
    }
}

/// Train `k` centroids over `data` (`n × dim`, flat). Returns the flat
/// `k × dim` centroid array.
///
/// Degenerate cases: `n == k` copies the training set verbatim; fewer than
/// `MIN_POINTS_PER_CENTROID * k` points is an error the caller must resolve
/// by lowering `k` or supplying more data; more than
/// `MAX_POINTS_PER_CENTROID * k` points are deterministically subsampled.
pub fn train(params: &KmeansParams, dim: usize, data: &[f32]) -> Result<Vec<f32>> {
    let k = params.k;
    assert!(k > 0, "cannot train zero centroids");
    assert!(
        dim > 0 && data.len() % dim == 0,
        "training data must be a whole number of {dim}-dimensional vectors"
    );
    let n = data.len() / dim;

    if n == k {
        // corner case: every training point becomes its own centroid
        return Ok(data.to_vec());
    }
    if n < k * config::MIN_POINTS_PER_CENTROID {
        return Err(IndexError::InsufficientTrainingData {
            points: n,
            centroids: k,
            required: k * config::MIN_POINTS_PER_CENTROID,
        });
    }

    let subsampled;
    let x: &[f32] = if n > k * config::MAX_POINTS_PER_CENTROID {
        let target = k * config::MAX_POINTS_PER_CENTROID;
        subsampled = subsample_training_set(dim, target, data, params.seed);
        tracing::debug!(kept = target, total = n, "subsampled training set");
        &subsampled
    } else {
        data
    };

    let mut centroids = match params.init {
        CentroidInit::Random => init_random(dim, k, x, params.seed + 1),
        CentroidInit::Hypercube => init_hypercube(dim, codebook_bits(k, dim), x),
        CentroidInit::HypercubePca => init_hypercube_pca(dim, codebook_bits(k, dim), x, params.seed),
    };
    run_lloyd(params, dim, x, &mut centroids);
    Ok(centroids)
}

/// Bits of the codebook exponent: the hypercube inits place centroids at the
/// corners of a `log2 k`-dimensional cube, so `k` must be a power of two.
fn codebook_bits(k: usize, dim: usize) -> usize {
    assert!(
        k.is_power_of_two(),
        "hypercube initialization requires a power-of-two centroid count, got {k}"
    );
    let nbits = k.trailing_zeros() as usize;
    assert!(
        nbits <= dim,
        "hypercube initialization needs at least {nbits} dimensions, got {dim}"
    );
    nbits
}

/// Keep exactly `target` training points, chosen by a seeded permutation.
fn subsample_training_set(dim: usize, target: usize, data: &[f32], seed: u64) -> Vec<f32> {
    let n = data.len() / dim;
    let mut perm: Vec<usize> = (0..n).collect();
    perm.shuffle(&mut StdRng::seed_from_u64(seed));
    let mut out = Vec::with_capacity(target * dim);
    for &pi in perm.iter().take(target) {
        out.extend_from_slice(&data[pi * dim..(pi + 1) * dim]);
    }
    out
}

fn init_random(dim: usize, k: usize, x: &[f32], seed: u64) -> Vec<f32> {
    let n = x.len() / dim;
    let mut perm: Vec<usize> = (0..n).collect();
    perm.shuffle(&mut StdRng::seed_from_u64(seed));
    let mut centroids = Vec::with_capacity(k * dim);
    for &pi in perm.iter().take(k) {
        centroids.extend_from_slice(&x[pi * dim..(pi + 1) * dim]);
    }
    centroids
}

fn init_hypercube(dim: usize, nbits: usize, x: &[f32]) -> Vec<f32> {
    let n = x.len() / dim;
    let mut mean = vec![0.0f32; dim];
    for xi in x.chunks_exact(dim) {
        for (m, &v) in mean.iter_mut().zip(xi) {
            *m += v;
        }
    }
    let mut maxm = 0.0f32;
    for m in mean.iter_mut() {
        *m /= n as f32;
        maxm = maxm.max(m.abs());
    }

    let k = 1usize << nbits;
    let mut centroids = vec![0.0f32; k * dim];
    for (i, cent) in centroids.chunks_exact_mut(dim).enumerate() {
        for (j, c) in cent.iter_mut().enumerate() {
            *c = if j < nbits {
                mean[j] + if (i >> j) & 1 == 1 { maxm } else { -maxm }
            } else {
                mean[j]
            };
        }
    }
    centroids
}

fn init_hypercube_pca(dim: usize, nbits: usize, x: &[f32], seed: u64) -> Vec<f32> {
    let pca = PcaMatrix::train(dim, nbits, x, seed);
    let k = 1usize << nbits;
    let mut centroids = vec![0.0f32; k * dim];
    for (i, cent) in centroids.chunks_exact_mut(dim).enumerate() {
        for (j, c) in cent.iter_mut().enumerate() {
            let mut cj = pca.mean[j];
            for b in 0..nbits {
                let sign = if (i >> b) & 1 == 1 { 1.0 } else { -1.0 };
                cj += sign * pca.eigenvalues[b].sqrt() * pca.components[b * dim + j];
            }
            *c = cj;
        }
    }
    centroids
}

/// Lloyd's iterations over `x`, updating `centroids` in place. Returns the
/// per-iteration objective (total assignment distance), which is
/// non-increasing until the early-stop threshold or the iteration cap.
fn run_lloyd(params: &KmeansParams, dim: usize, x: &[f32], centroids: &mut [f32]) -> Vec<f64> {
    let k = params.k;
    let n = x.len() / dim;
    let metric = params.metric;
    let mut hassign = vec![0.0f32; k];
    let mut objectives = Vec::new();
    let mut prev_obj = f64::INFINITY;

    for iteration in 0..config::KMEANS_MAX_ITERATIONS {
        // assignment is independent per training vector
        let cents: &[f32] = centroids;
        let assignments: Vec<(u32, f32)> = x
            .par_chunks(dim)
            .map(|xi| {
                let (ci, dist) = metric.nearest(xi, cents);
                (ci as u32, dist)
            })
            .collect();

        let objective: f64 = assignments.iter().map(|&(_, d)| d as f64).sum();
        tracing::debug!(iteration, objective, "k-means iteration");
        objectives.push(objective);
        if prev_obj.is_finite()
            && (prev_obj - objective) / prev_obj < config::KMEANS_MIN_IMPROVEMENT
        {
            break;
        }
        prev_obj = objective;

        compute_centroids(dim, k, x, &assignments, &mut hassign, centroids);
        let nsplit = split_clusters(dim, k, n, params.seed, &mut hassign, centroids);
        if nsplit > 0 {
            tracing::debug!(nsplit, "split clusters to repopulate empty centroids");
        }
    }
    objectives
}

/// Recompute centroids as the mean of their assigned points.
///
/// Each rayon worker owns an exclusive range of centroid indexes and scans the
/// full assignment list, so the reduction needs no locks; a partitioned
/// normalization pass divides each sum by its assignment count.
fn compute_centroids(
    dim: usize,
    k: usize,
    x: &[f32],
    assignments: &[(u32, f32)],
    hassign: &mut [f32],
    centroids: &mut [f32],
) {
    centroids.fill(0.0);
    hassign.fill(0.0);

    let workers = rayon::current_num_threads().clamp(1, k);
    let span = k.div_ceil(workers);
    centroids
        .par_chunks_mut(span * dim)
        .zip(hassign.par_chunks_mut(span))
        .enumerate()
        .for_each(|(w, (c_range, h_range))| {
            let c0 = w * span;
            for (xi, &(ci, _)) in x.chunks_exact(dim).zip(assignments) {
                let ci = ci as usize;
                assert!(ci < k, "assignment index {ci} out of range for {k} centroids");
                if ci < c0 || ci >= c0 + h_range.len() {
                    continue;
                }
                let local = ci - c0;
                h_range[local] += 1.0;
                let c = &mut c_range[local * dim..(local + 1) * dim];
                for (cj, &xj) in c.iter_mut().zip(xi) {
                    *cj += xj;
                }
            }
        });

    centroids
        .par_chunks_mut(dim)
        .zip(hassign.par_iter())
        .for_each(|(c, &h)| {
            if h > 0.0 {
                let norm = 1.0 / h;
                for v in c.iter_mut() {
                    *v *= norm;
                }
            }
        });
}

/// Repopulate empty clusters by splitting populated ones.
///
/// A donor is picked with probability proportional to its population, cloned
/// into the empty slot, and the pair is perturbed symmetrically with
/// alternating `(1 ± ε)` factors per coordinate so the two halves separate on
/// the next assignment pass. The donor's estimated count is split in half.
/// Returns the number of splits performed (larger is worse).
fn split_clusters(
    dim: usize,
    k: usize,
    n: usize,
    seed: u64,
    hassign: &mut [f32],
    centroids: &mut [f32],
) -> usize {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut nsplit = 0;
    for ci in 0..k {
        if hassign[ci] != 0.0 {
            continue;
        }
        let mut cj = 0usize;
        loop {
            let p = (hassign[cj] - 1.0) / (n - k) as f32;
            if rng.gen::<f32>() < p {
                break;
            }
            cj = (cj + 1) % k;
        }

        centroids.copy_within(cj * dim..(cj + 1) * dim, ci * dim);
        for j in 0..dim {
            let (up, down) = if j % 2 == 0 { (ci, cj) } else { (cj, ci) };
            centroids[up * dim + j] *= 1.0 + config::CLUSTER_SPLIT_EPSILON;
            centroids[down * dim + j] *= 1.0 - config::CLUSTER_SPLIT_EPSILON;
        }

        hassign[ci] = hassign[cj] / 2.0;
        hassign[cj] -= hassign[ci];
        nsplit += 1;
    }
    nsplit
}
