use crate::node::{Dendrogram, NodeId};
use num_traits::Float;
use std::collections::HashMap;

/// A maximal subtree reported as one cluster of matches.
#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryCluster {
    /// The subtree's root.
    pub node: NodeId,
    /// The subtree's leaves, left to right.
    pub leaves: Vec<NodeId>,
    /// 1-based, in left to right tree order.
    pub number: usize,
}

impl PrimaryCluster {
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }
}

/// Selects the primary clusters of a tree.
#[derive(Debug, Clone, Copy)]
pub struct PrimaryClusterFinder<T> {
    min_cluster_size: usize,
    max_cluster_size: usize,
    max_merge_distance: T,
}

impl<T: Float> PrimaryClusterFinder<T> {
    pub fn new(min_cluster_size: usize) -> Self {
        PrimaryClusterFinder {
            min_cluster_size,
            max_cluster_size: usize::MAX,
            max_merge_distance: T::infinity(),
        }
    }

    /// Subtrees with more leaves than this are descended instead of selected.
    pub fn with_max_cluster_size(mut self, max_cluster_size: usize) -> Self {
        self.max_cluster_size = max_cluster_size;
        self
    }

    /// Subtrees merged further apart than this are descended instead of selected.
    pub fn with_max_merge_distance(mut self, max_merge_distance: T) -> Self {
        self.max_merge_distance = max_merge_distance;
        self
    }

    /// Walks the tree depth first from its roots and returns every maximal qualifying subtree,
    /// numbered from 1 in left to right order. No returned cluster contains another.
    pub fn find(&self, tree: &Dendrogram<T>) -> Vec<PrimaryCluster> {
        let mut clusters = Vec::new();
        for &root in tree.roots() {
            let mut stack = vec![root];
            while let Some(id) = stack.pop() {
                let Some(cluster) = tree.cluster(id) else {
                    continue;
                };
                if cluster.leaf_count < self.min_cluster_size {
                    continue;
                }
                if self.qualifies(tree, id) {
                    clusters.push(id);
                } else {
                    stack.push(cluster.second);
                    stack.push(cluster.first);
                }
            }
        }

        let clusters: Vec<PrimaryCluster> = clusters
            .into_iter()
            .enumerate()
            .map(|(i, node)| PrimaryCluster {
                node,
                leaves: tree.ordered_leaves(node),
                number: i + 1,
            })
            .collect();
        tracing::debug!(n_clusters = clusters.len(), "primary clusters found");
        clusters
    }

    fn qualifies(&self, tree: &Dendrogram<T>, id: NodeId) -> bool {
        match tree.cluster(id) {
            Some(cluster) => {
                cluster.leaf_count >= self.min_cluster_size
                    && cluster.leaf_count <= self.max_cluster_size
                    && !(cluster.distance_squared > self.max_merge_distance)
            }
            None => false,
        }
    }
}

/// Renumbers clusters from 1 in the order given.
pub(crate) fn renumber(clusters: &mut [PrimaryCluster]) {
    for (i, cluster) in clusters.iter_mut().enumerate() {
        cluster.number = i + 1;
    }
}

/// Maps the match index of every clustered leaf to its cluster number.
pub fn cluster_numbers<T: Float>(
    tree: &Dendrogram<T>,
    clusters: &[PrimaryCluster],
) -> HashMap<usize, usize> {
    clusters
        .iter()
        .flat_map(|cluster| {
            cluster
                .leaves
                .iter()
                .filter_map(|&leaf| tree.leaf(leaf))
                .map(move |leaf| (leaf.index(), cluster.number))
        })
        .collect()
}
