//! HNSW search: single-layer beam search and multi-layer KNN.
//!
//! Distances are raw (exact, on stored vectors) or compressed (PQ lookup
//! table), selected once per index instance and transparent to the traversal.
//! Every search terminates with a (possibly short) result set, never an
//! error; ties are broken by ascending node id for determinism.

use crate::hnsw::graph::HnswIndex;
use crate::hnsw::visited::VisitedMap;
use crate::quantization::pq::PqDistanceTable;
use ordered_float::OrderedFloat;
use std::cell::RefCell;
use std::collections::BinaryHeap;

thread_local! {
    /// Reusable visited map per thread, so repeated queries skip the
    /// per-search allocation.
    static SEARCH_VISITED: RefCell<VisitedMap> = RefCell::new(VisitedMap::default());
}

/// Frontier entry: max-heap over negated distance pops the closest candidate
/// first. Equal distances pop the smaller id first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Candidate {
    neg_distance: OrderedFloat<f32>,
    id: u32,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.neg_distance
            .cmp(&other.neg_distance)
            .then(other.id.cmp(&self.id))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Result entry: max-heap over (distance, id) keeps the worst hit on top for
/// O(log ef) eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ResultEntry {
    distance: OrderedFloat<f32>,
    id: u32,
}

impl Ord for ResultEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.distance
            .cmp(&other.distance)
            .then(self.id.cmp(&other.id))
    }
}

impl PartialOrd for ResultEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Best-first beam search over a single layer.
///
/// Expands the closest unvisited candidate's neighbors until no frontier
/// member can beat the current worst of `ef` results. Returns up to `ef`
/// hits as (distance, id), ascending. `visited` is reset on entry and the
/// monotone visited marks guarantee termination.
pub fn search_layer(
    index: &HnswIndex,
    query: &[f32],
    entry_points: &[u32],
    ef: usize,
    layer: usize,
    visited: &mut VisitedMap,
    pq_table: Option<&PqDistanceTable>,
) -> Vec<(f32, u32)> {
    visited.reset();
    let mut candidates: BinaryHeap<Candidate> = BinaryHeap::with_capacity(ef * 2);
    let mut results: BinaryHeap<ResultEntry> = BinaryHeap::with_capacity(ef + 1);
    // cached worst distance avoids repeated heap peeks in the hot loop
    let mut worst_dist = f32::MAX;

    for &ep in entry_points {
        if visited.try_visit(ep) {
            let dist = index.distance_to(query, ep, pq_table);
            candidates.push(Candidate {
                neg_distance: OrderedFloat(-dist),
                id: ep,
            });
            results.push(ResultEntry {
                distance: OrderedFloat(dist),
                id: ep,
            });
        }
    }
    while results.len() > ef {
        results.pop();
    }
    if results.len() >= ef {
        worst_dist = results.peek().map_or(f32::MAX, |r| r.distance.0);
    }

    while let Some(candidate) = candidates.pop() {
        let c_dist = -candidate.neg_distance.0;

        // the closest frontier entry cannot improve the results: done
        if results.len() >= ef && c_dist > worst_dist {
            break;
        }

        let node = candidate.id as usize;
        if layer >= index.neighbors[node].len() {
            continue;
        }

        let neighbor_list = &index.neighbors[node][layer];
        for i in 0..neighbor_list.len() {
            let (_, neighbor_id) = neighbor_list[i];

            // prefetch the next neighbor's payload while scoring this one
            if i + 1 < neighbor_list.len() {
                index.prefetch_node(neighbor_list[i + 1].1);
            }

            if !visited.try_visit(neighbor_id) {
                continue;
            }

            let dist = index.distance_to(query, neighbor_id, pq_table);
            if results.len() < ef || dist < worst_dist {
                candidates.push(Candidate {
                    neg_distance: OrderedFloat(-dist),
                    id: neighbor_id,
                });
                results.push(ResultEntry {
                    distance: OrderedFloat(dist),
                    id: neighbor_id,
                });
                if results.len() > ef {
                    results.pop();
                }
                if results.len() >= ef {
                    worst_dist = results.peek().map_or(f32::MAX, |r| r.distance.0);
                }
            }
        }
    }

    results
        .into_sorted_vec()
        .into_iter()
        .map(|r| (r.distance.0, r.id))
        .collect()
}

/// Multi-layer KNN search using the configured `ef_search`.
pub fn knn_search(index: &HnswIndex, query: &[f32], k: usize) -> Vec<(f32, u32)> {
    knn_search_with_ef(index, query, k, index.config.ef_search)
}

/// Multi-layer KNN search with an explicit beam width.
///
/// Descends greedily from the entry point through every layer above 0, then
/// beam searches layer 0 with `ef` (clamped to at least `k` — the frontier
/// cannot be narrower than the result set it feeds). Returns up to `k` hits
/// as (distance, id), distance ascending, ties by ascending id.
pub fn knn_search_with_ef(
    index: &HnswIndex,
    query: &[f32],
    k: usize,
    ef: usize,
) -> Vec<(f32, u32)> {
    assert_eq!(
        query.len(),
        index.dimension,
        "query length must match the index dimension"
    );
    let entry_point = match index.entry_point {
        Some(ep) => ep,
        None => return Vec::new(),
    };

    // one lookup table per query in PQ mode
    let pq_table = index.build_query_table(query);
    let pq_table = pq_table.as_ref();
    let ef = ef.max(k);

    SEARCH_VISITED.with(|cell| {
        let mut visited = cell.borrow_mut();
        visited.grow(index.node_count as usize);

        let mut current_ep = entry_point;
        for layer in (1..=index.max_layer).rev() {
            let nearest = search_layer(index, query, &[current_ep], 1, layer, &mut visited, pq_table);
            if let Some(&(_, id)) = nearest.first() {
                current_ep = id;
            }
        }

        let mut results = search_layer(index, query, &[current_ep], ef, 0, &mut visited, pq_table);
        results.truncate(k);
        results
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hnsw::distance::DistanceMetric;
    use crate::hnsw::graph::HnswConfig;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn l2_index(dim: usize) -> HnswIndex {
        HnswIndex::new(
            dim,
            HnswConfig {
                metric: DistanceMetric::SquaredL2,
                ..HnswConfig::default()
            },
        )
    }

    fn random_rows(n: usize, dim: usize, seed: u64) -> Vec<Vec<f32>> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n)
            .map(|_| (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect())
            .collect()
    }

    #[test]
    fn test_empty_index_returns_nothing() {
        let index = l2_index(4);
        assert!(knn_search(&index, &[0.0; 4], 5).is_empty());
    }

    #[test]
    fn test_single_node() {
        let mut index = l2_index(2);
        index.insert(&[1.0, 1.0]);
        let hits = knn_search(&index, &[1.0, 1.0], 3);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].1, 0);
        assert!(hits[0].0 < 1e-6);
    }

    #[test]
    fn test_finds_exact_match() {
        let rows = random_rows(80, 4, 1);
        let mut index = l2_index(4);
        for row in &rows {
            index.insert(row);
        }
        let hits = knn_search_with_ef(&index, &rows[37], 1, 80);
        assert_eq!(hits[0].1, 37);
        assert!(hits[0].0 < 1e-6);
    }

    #[test]
    fn test_full_beam_matches_brute_force() {
        let rows = random_rows(200, 4, 2);
        let mut index = l2_index(4);
        for row in &rows {
            index.insert(row);
        }
        let queries = random_rows(5, 4, 3);
        for q in &queries {
            let mut brute: Vec<(f32, u32)> = rows
                .iter()
                .enumerate()
                .map(|(i, row)| (DistanceMetric::SquaredL2.distance(q, row), i as u32))
                .collect();
            brute.sort_by(|a, b| (a.0, a.1).partial_cmp(&(b.0, b.1)).unwrap());

            let hits = knn_search_with_ef(&index, q, 10, rows.len());
            let got: Vec<u32> = hits.iter().map(|&(_, id)| id).collect();
            let want: Vec<u32> = brute.iter().take(10).map(|&(_, id)| id).collect();
            assert_eq!(got, want, "ef == n must reproduce the brute-force top-k");
        }
    }

    #[test]
    fn test_results_sorted_with_id_tiebreak() {
        let mut index = l2_index(2);
        for _ in 0..5 {
            index.insert(&[0.5, 0.5]);
        }
        let hits = knn_search_with_ef(&index, &[0.5, 0.5], 5, 5);
        let ids: Vec<u32> = hits.iter().map(|&(_, id)| id).collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4], "equal distances order by id");
    }

    #[test]
    fn test_k_larger_than_index_truncates() {
        let rows = random_rows(7, 3, 4);
        let mut index = l2_index(3);
        for row in &rows {
            index.insert(row);
        }
        let hits = knn_search(&index, &[0.0; 3], 20);
        assert_eq!(hits.len(), 7);
        for w in hits.windows(2) {
            assert!(w[0].0 <= w[1].0);
        }
    }
}
