//! ANN benchmark on random vectors: build time, QPS, and Recall@10 for the
//! raw graph vs the PQ-compressed graph.
//!
//! Usage: cargo bench --bench ann_random

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use smallworld::hnsw::knn_search_with_ef;
use smallworld::{DistanceMetric, HnswConfig, HnswIndex, PqConfig};
use std::time::Instant;

const N: usize = 10_000;
const DIM: usize = 32;
const QUERIES: usize = 100;
const K: usize = 10;
const EF: usize = 64;

fn random_data(n: usize, dim: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n * dim).map(|_| rng.gen_range(-1.0..1.0)).collect()
}

fn ground_truth(data: &[f32], queries: &[f32]) -> Vec<Vec<u32>> {
    queries
        .chunks_exact(DIM)
        .map(|q| {
            let mut dists: Vec<(f32, u32)> = data
                .chunks_exact(DIM)
                .enumerate()
                .map(|(i, row)| (DistanceMetric::SquaredL2.distance(q, row), i as u32))
                .collect();
            dists.sort_by(|a, b| (a.0, a.1).partial_cmp(&(b.0, b.1)).unwrap());
            dists.iter().take(K).map(|&(_, id)| id).collect()
        })
        .collect()
}

fn recall(hits: &[(f32, u32)], truth: &[u32]) -> f64 {
    let found = hits.iter().filter(|&&(_, id)| truth.contains(&id)).count();
    found as f64 / truth.len() as f64
}

fn run(label: &str, pq: Option<PqConfig>, data: &[f32], queries: &[f32], truth: &[Vec<u32>]) {
    let config = HnswConfig {
        m: 16,
        m_max0: 32,
        ef_construction: 100,
        metric: DistanceMetric::SquaredL2,
        pq,
        ..HnswConfig::default()
    };
    let mut index = HnswIndex::new(DIM, config);

    let start = Instant::now();
    if index.config.pq.is_some() {
        index.train_quantizer(data).expect("training failed");
    }
    for row in data.chunks_exact(DIM) {
        index.insert(row);
    }
    let build = start.elapsed();

    let start = Instant::now();
    let mut total_recall = 0.0;
    for (qi, q) in queries.chunks_exact(DIM).enumerate() {
        let hits = knn_search_with_ef(&index, q, K, EF);
        total_recall += recall(&hits, &truth[qi]);
    }
    let search = start.elapsed();

    let qps = QUERIES as f64 / search.as_secs_f64();
    let avg_recall = total_recall / QUERIES as f64;
    println!(
        "{label:<12} build {:>7.2?}  qps {qps:>9.0}  recall@{K} {avg_recall:.3}",
        build
    );
}

fn main() {
    println!("smallworld ANN benchmark: {N} random {DIM}-d vectors, ef={EF}");
    let data = random_data(N, DIM, 1);
    let queries = random_data(QUERIES, DIM, 2);
    let truth = ground_truth(&data, &queries);

    run("raw", None, &data, &queries, &truth);
    run("pq 8x8bit", Some(PqConfig::new(8, 8)), &data, &queries, &truth);
}
