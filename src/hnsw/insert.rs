//! HNSW insertion algorithm.
//!
//! Inserts a vector into the graph with bidirectional connections and
//! heuristic neighbor pruning (Algorithm 4 from the HNSW paper). In PQ mode
//! the new vector gets one distance lookup table for the whole insert, so
//! construction runs against compressed payloads at table-lookup cost.

use crate::hnsw::graph::HnswIndex;
use crate::hnsw::search::search_layer;
use crate::hnsw::visited::VisitedMap;

impl HnswIndex {
    /// Insert a vector and return its dense node id.
    ///
    /// The node's layer is drawn from an exponential distribution; layers
    /// above it are descended greedily, layers at or below it are beam
    /// searched with `ef_construction` and linked through the
    /// diversification heuristic.
    pub fn insert(&mut self, vector: &[f32]) -> u32 {
        assert_eq!(
            vector.len(),
            self.dimension,
            "vector length must match the index dimension"
        );
        assert!(
            self.config.pq.is_none() || self.quantizer.is_some(),
            "quantizer must be trained before inserting into a PQ index"
        );

        let internal_id = self.node_count;
        let level = self.random_level();

        // first node: nothing to search or link against
        if self.entry_point.is_none() {
            self.push_payload(vector);
            self.neighbors.push(vec![Vec::new(); level + 1]);
            self.layers.push(level as u8);
            self.node_count += 1;
            self.entry_point = Some(internal_id);
            self.max_layer = level;
            return internal_id;
        }

        let entry_point = self
            .entry_point
            .expect("entry_point is Some after is_none() guard");

        // one lookup table serves every candidate distance of this insert
        let pq_table = self.build_query_table(vector);
        let pq_table = pq_table.as_ref();

        let mut visited = VisitedMap::with_capacity(self.node_count as usize);

        // Phase 1: greedy single-best descent through layers above `level`
        let mut current_ep = entry_point;
        for layer in (level + 1..=self.max_layer).rev() {
            let nearest = search_layer(self, vector, &[current_ep], 1, layer, &mut visited, pq_table);
            if let Some(&(_, id)) = nearest.first() {
                current_ep = id;
            }
        }

        // Phase 2: beam search each layer from min(level, max_layer) down to
        // 0, keeping the heuristically diverse subset as this node's links
        let top = level.min(self.max_layer);
        let mut node_neighbors: Vec<Vec<(f32, u32)>> = vec![Vec::new(); level + 1];
        let mut layer_eps: Vec<u32> = vec![current_ep];
        for layer in (0..=top).rev() {
            let candidates = search_layer(
                self,
                vector,
                &layer_eps,
                self.config.ef_construction,
                layer,
                &mut visited,
                pq_table,
            );

            let m_max = if layer == 0 {
                self.config.m_max0
            } else {
                self.config.m
            };
            node_neighbors[layer] = self.select_neighbors(&candidates, m_max);

            // all candidates seed the next (lower) layer
            layer_eps.clear();
            layer_eps.extend(candidates.iter().map(|&(_, id)| id));
            if layer_eps.is_empty() {
                layer_eps.push(entry_point);
            }
        }

        self.push_payload(vector);
        self.neighbors.push(node_neighbors);
        self.layers.push(level as u8);
        self.node_count += 1;

        // Phase 3: add reverse links; re-prune any neighbor over capacity
        for layer in 0..=top {
            let m_max = if layer == 0 {
                self.config.m_max0
            } else {
                self.config.m
            };

            let links: Vec<(f32, u32)> = self.neighbors[internal_id as usize][layer].clone();
            for &(dist, neighbor_id) in &links {
                let nid = neighbor_id as usize;
                while self.neighbors[nid].len() <= layer {
                    self.neighbors[nid].push(Vec::new());
                }

                // cached distances are symmetric, so the forward distance is
                // also the reverse edge's cached distance; keep the list sorted
                let list = &mut self.neighbors[nid][layer];
                let pos = list.partition_point(|&(d, _)| d <= dist);
                list.insert(pos, (dist, internal_id));

                if self.neighbors[nid][layer].len() > m_max {
                    let candidates = self.neighbors[nid][layer].clone();
                    let pruned = self.select_neighbors(&candidates, m_max);
                    self.neighbors[nid][layer] = pruned;
                }
            }
        }

        // a node above every existing layer becomes the global entry point
        if level > self.max_layer {
            self.max_layer = level;
            self.entry_point = Some(internal_id);
        }

        internal_id
    }

    fn push_payload(&mut self, vector: &[f32]) {
        match &self.quantizer {
            Some(q) => q.encode_into(vector, &mut self.codes),
            None => self.vectors.extend_from_slice(vector),
        }
    }

    /// Heuristic neighbor selection (Algorithm 4 from the HNSW paper).
    ///
    /// Walk candidates in ascending distance; keep one only when it is closer
    /// to the base than to every neighbor kept so far. Crowded candidates are
    /// discarded outright — even when slots remain — which keeps the graph
    /// navigable instead of locally over-clustered.
    pub(crate) fn select_neighbors(
        &self,
        candidates: &[(f32, u32)],
        m: usize,
    ) -> Vec<(f32, u32)> {
        let mut sorted = candidates.to_vec();
        sorted.sort_unstable_by(|a, b| {
            (a.0, a.1)
                .partial_cmp(&(b.0, b.1))
                .unwrap_or(std::cmp::Ordering::Equal)
        });

        let mut selected: Vec<(f32, u32)> = Vec::with_capacity(m.min(sorted.len()));
        let mut cand_buf = vec![0.0f32; self.dimension];
        let mut kept_buf = vec![0.0f32; self.dimension];

        for &(dist_to_base, cid) in &sorted {
            if selected.len() >= m {
                break;
            }
            self.reconstruct_into(cid, &mut cand_buf);
            let diverse = selected.iter().all(|&(_, sid)| {
                self.reconstruct_into(sid, &mut kept_buf);
                dist_to_base <= self.config.metric.distance(&cand_buf, &kept_buf)
            });
            if diverse {
                selected.push((dist_to_base, cid));
            }
        }
        selected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hnsw::distance::DistanceMetric;
    use crate::hnsw::graph::HnswConfig;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn l2_config() -> HnswConfig {
        HnswConfig {
            metric: DistanceMetric::SquaredL2,
            ..HnswConfig::default()
        }
    }

    fn build_random(n: usize, dim: usize, seed: u64) -> HnswIndex {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut index = HnswIndex::new(dim, l2_config());
        for _ in 0..n {
            let v: Vec<f32> = (0..dim).map(|_| rng.gen_range(-1.0..1.0)).collect();
            index.insert(&v);
        }
        index
    }

    #[test]
    fn test_first_insert_becomes_entry_point() {
        let mut index = HnswIndex::new(2, l2_config());
        let id = index.insert(&[1.0, 2.0]);
        assert_eq!(id, 0);
        assert_eq!(index.entry_point, Some(0));
        assert_eq!(index.len(), 1);
        assert_eq!(index.max_layer, index.layers[0] as usize);
    }

    #[test]
    fn test_ids_are_dense_and_every_node_has_layer_zero() {
        let index = build_random(200, 4, 1);
        assert_eq!(index.len(), 200);
        for node in 0..200 {
            assert!(
                !index.neighbors[node].is_empty(),
                "node {node} missing its layer-0 list"
            );
        }
    }

    #[test]
    fn test_neighbor_lists_respect_caps() {
        let index = build_random(400, 8, 2);
        for (node, layers) in index.neighbors.iter().enumerate() {
            for (layer, list) in layers.iter().enumerate() {
                let cap = if layer == 0 {
                    index.config.m_max0
                } else {
                    index.config.m
                };
                assert!(
                    list.len() <= cap,
                    "node {node} layer {layer} has {} links (cap {cap})",
                    list.len()
                );
            }
        }
    }

    #[test]
    fn test_entry_point_sits_on_highest_layer() {
        let index = build_random(300, 4, 3);
        let ep = index.entry_point.unwrap() as usize;
        assert_eq!(index.layers[ep] as usize, index.max_layer);
        let highest = index.layers.iter().map(|&l| l as usize).max().unwrap();
        assert_eq!(index.max_layer, highest);
    }

    #[test]
    fn test_cached_distances_match_recomputation() {
        let index = build_random(150, 4, 4);
        for node in 0..150u32 {
            for list in &index.neighbors[node as usize] {
                for &(cached, nbr) in list {
                    let actual = index
                        .config
                        .metric
                        .distance(index.vector(node), index.vector(nbr));
                    assert!(
                        (cached - actual).abs() < 1e-5,
                        "cached {cached} vs recomputed {actual}"
                    );
                }
            }
        }
    }

    #[test]
    fn test_neighbor_lists_are_sorted_ascending() {
        let index = build_random(250, 4, 5);
        for layers in &index.neighbors {
            for list in layers {
                for w in list.windows(2) {
                    assert!(w[0].0 <= w[1].0, "list out of order: {list:?}");
                }
            }
        }
    }

    #[test]
    fn test_select_neighbors_discards_crowded_candidates() {
        let mut index = HnswIndex::new(2, l2_config());
        let a = index.insert(&[1.0, 0.0]);
        let b = index.insert(&[-1.0, 0.0]);
        let c = index.insert(&[1.05, 0.0]);

        // candidate c is closer to a than to the base, so the heuristic must
        // drop it even though three slots are available
        let candidates = vec![(1.0, a), (1.0, b), (1.1025, c)];
        let selected = index.select_neighbors(&candidates, 3);
        let ids: Vec<u32> = selected.iter().map(|&(_, id)| id).collect();
        assert_eq!(ids, vec![a, b]);
    }
}
