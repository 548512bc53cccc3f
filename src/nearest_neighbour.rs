use crate::data_wrappers::Neighbor;
use crate::distance::Distance;
use crate::node::{Dendrogram, NodeId};
use crate::progress::ProgressSink;
use num_traits::Float;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashMap;

/// Buckets leaves by their significant coordinates. Only leaves sharing a bucket are ever
/// compared, which keeps the neighbour search far below all pairs.
pub(crate) struct NeighbourIndex<'a, T> {
    tree: &'a Dendrogram<T>,
    distance: &'a Distance<T>,
    buckets: HashMap<usize, Vec<NodeId>>,
}

impl<'a, T: Float + Send + Sync> NeighbourIndex<'a, T> {
    pub(crate) fn new(
        tree: &'a Dendrogram<T>,
        leaves: &[NodeId],
        distance: &'a Distance<T>,
    ) -> Self {
        let mut buckets: HashMap<usize, Vec<NodeId>> = HashMap::new();
        for &id in leaves {
            if let Some(leaf) = tree.leaf(id) {
                for coord in distance.significant_coords(&leaf.coords) {
                    buckets.entry(coord).or_default().push(id);
                }
            }
        }
        NeighbourIndex {
            tree,
            distance,
            buckets,
        }
    }

    pub(crate) fn bucket_count(&self) -> usize {
        self.buckets.len()
    }

    /// The candidate neighbours of each leaf, nearest first, aligned with `leaves`. Only
    /// neighbours with a higher match index are listed: the merge step looks for global
    /// minima, so one direction per pair is enough.
    pub(crate) fn neighbours_by_distance(
        &self,
        leaves: &[NodeId],
        progress: &dyn ProgressSink,
    ) -> Vec<Vec<Neighbor<T>>> {
        leaves
            .par_iter()
            .map(|&id| {
                let neighbours = self.neighbours_of(id);
                progress.increment();
                neighbours
            })
            .collect()
    }

    fn neighbours_of(&self, id: NodeId) -> Vec<Neighbor<T>> {
        let Some(leaf) = self.tree.leaf(id) else {
            return Vec::new();
        };

        let mut candidates: Vec<NodeId> = self
            .distance
            .significant_coords(&leaf.coords)
            .filter_map(|coord| self.buckets.get(&coord))
            .flatten()
            .copied()
            .filter(|&other| self.match_index(other) > leaf.index)
            .collect();
        // A candidate sharing several coordinates sits in several buckets
        candidates.sort_unstable();
        candidates.dedup();

        let mut neighbours: Vec<Neighbor<T>> = candidates
            .into_iter()
            .filter_map(|other| {
                self.tree.leaf(other).map(|other_leaf| Neighbor {
                    node: other,
                    distance_squared: self.distance.calc_dist(&leaf.coords, &other_leaf.coords),
                })
            })
            .collect();
        neighbours.sort_by(|a, b| {
            a.distance_squared
                .partial_cmp(&b.distance_squared)
                .unwrap_or(Ordering::Equal)
                .then_with(|| self.match_index(a.node).cmp(&self.match_index(b.node)))
        });
        neighbours
    }

    fn match_index(&self, id: NodeId) -> usize {
        self.tree.leaf(id).map(|leaf| leaf.index).unwrap_or(usize::MAX)
    }
}
