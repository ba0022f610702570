//! Principal component analysis for the PCA-based centroid initialization.
//!
//! Extracts the top components of a training set's covariance matrix by
//! power iteration with deflation. The matrices involved are per-subspace
//! (a handful of dimensions), so the dense O(d²) covariance is cheap.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Mean, leading eigenvalues, and principal components of a training set.
#[derive(Debug, Clone)]
pub struct PcaMatrix {
    /// Per-dimension mean of the training data.
    pub mean: Vec<f32>,
    /// Eigenvalues of the covariance matrix, descending, one per component.
    pub eigenvalues: Vec<f32>,
    /// Row-major `n_components × dim` matrix of unit-length components.
    pub components: Vec<f32>,
}

impl PcaMatrix {
    /// Extract the top `n_components` principal directions of `data`
    /// (`n × dim`, flat). Deterministic for a fixed `seed`.
    pub fn train(dim: usize, n_components: usize, data: &[f32], seed: u64) -> Self {
        assert!(dim > 0 && data.len() % dim == 0);
        assert!(
            n_components <= dim,
            "cannot extract {n_components} components from {dim} dimensions"
        );
        let n = data.len() / dim;
        assert!(n > 0, "PCA needs at least one training vector");

        let mut mean = vec![0.0f64; dim];
        for row in data.chunks_exact(dim) {
            for (m, &v) in mean.iter_mut().zip(row) {
                *m += v as f64;
            }
        }
        for m in mean.iter_mut() {
            *m /= n as f64;
        }

        let mut cov = vec![0.0f64; dim * dim];
        for row in data.chunks_exact(dim) {
            for i in 0..dim {
                let di = row[i] as f64 - mean[i];
                for j in 0..dim {
                    cov[i * dim + j] += di * (row[j] as f64 - mean[j]);
                }
            }
        }
        for c in cov.iter_mut() {
            *c /= n as f64;
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut eigenvalues = Vec::with_capacity(n_components);
        let mut components = Vec::with_capacity(n_components * dim);
        let mut v = vec![0.0f64; dim];

        for _ in 0..n_components {
            for vi in v.iter_mut() {
                *vi = rng.gen::<f64>() - 0.5;
            }
            let norm = v.iter().map(|x| x * x).sum::<f64>().sqrt().max(1e-12);
            for vi in v.iter_mut() {
                *vi /= norm;
            }

            let mut lambda = 0.0f64;
            for _ in 0..64 {
                let mut w = vec![0.0f64; dim];
                for i in 0..dim {
                    let mut acc = 0.0;
                    for j in 0..dim {
                        acc += cov[i * dim + j] * v[j];
                    }
                    w[i] = acc;
                }
                let norm = w.iter().map(|x| x * x).sum::<f64>().sqrt();
                if norm <= 1e-12 {
                    // remaining variance is zero; keep the current direction
                    lambda = 0.0;
                    break;
                }
                for (vi, wi) in v.iter_mut().zip(&w) {
                    *vi = wi / norm;
                }
                let prev = lambda;
                // |Cv| of a unit vector converges to the leading eigenvalue
                lambda = norm;
                if (lambda - prev).abs() <= 1e-9 * lambda.max(1.0) {
                    break;
                }
            }

            eigenvalues.push(lambda.max(0.0) as f32);
            components.extend(v.iter().map(|&x| x as f32));

            // deflate so the next pass converges to the following component
            for i in 0..dim {
                for j in 0..dim {
                    cov[i * dim + j] -= lambda * v[i] * v[j];
                }
            }
        }

        Self {
            mean: mean.iter().map(|&m| m as f32).collect(),
            eigenvalues,
            components,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_is_per_dimension_average() {
        let data = vec![1.0, 10.0, 3.0, 20.0];
        let pca = PcaMatrix::train(2, 1, &data, 1);
        assert!((pca.mean[0] - 2.0).abs() < 1e-6);
        assert!((pca.mean[1] - 15.0).abs() < 1e-6);
    }

    #[test]
    fn test_dominant_direction_of_diagonal_cloud() {
        // points spread along y = x with small orthogonal jitter
        let mut data = Vec::new();
        for i in 0..200 {
            let t = (i as f32 - 100.0) / 10.0;
            let jitter = if i % 2 == 0 { 0.05 } else { -0.05 };
            data.push(t + jitter);
            data.push(t - jitter);
        }
        let pca = PcaMatrix::train(2, 2, &data, 7);
        let c0 = (pca.components[0], pca.components[1]);
        assert!(
            (c0.0.abs() - c0.1.abs()).abs() < 0.05,
            "first component should point along the diagonal, got {c0:?}"
        );
        assert!(
            pca.eigenvalues[0] > 10.0 * pca.eigenvalues[1],
            "diagonal variance should dominate: {:?}",
            pca.eigenvalues
        );
    }

    #[test]
    fn test_components_are_unit_length() {
        let mut data = Vec::new();
        for i in 0..100 {
            data.push(i as f32 * 0.3);
            data.push((i % 7) as f32);
            data.push(-(i as f32) * 0.1);
        }
        let pca = PcaMatrix::train(3, 2, &data, 3);
        for comp in pca.components.chunks_exact(3) {
            let norm: f32 = comp.iter().map(|x| x * x).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4, "component norm {norm}");
        }
    }
}
