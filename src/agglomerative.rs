use crate::data_wrappers::Neighbor;
use crate::node::{Dendrogram, NodeId};
use crate::progress::ProgressSink;
use crate::ClusteringError;
use num_traits::Float;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::HashSet;

/// An outer leaf of an active node and the candidate neighbours it still has.
#[derive(Debug)]
struct Endpoint<T> {
    leaf: NodeId,
    neighbours: Vec<Neighbor<T>>,
}

/// A node that has not been merged yet. Only its two outer leaves are tracked, since interior
/// leaves can no longer be merged into anything on their own. A lone leaf has no `second`.
#[derive(Debug)]
struct ActiveNode<T> {
    node: NodeId,
    first: Endpoint<T>,
    second: Option<Endpoint<T>>,
}

impl<T: Float> ActiveNode<T> {
    fn endpoints(&self) -> impl Iterator<Item = &Endpoint<T>> {
        std::iter::once(&self.first).chain(self.second.as_ref())
    }

    fn forget(&mut self, leaves: &HashSet<NodeId>) {
        self.first.neighbours.retain(|n| !leaves.contains(&n.node));
        if let Some(second) = self.second.as_mut() {
            second.neighbours.retain(|n| !leaves.contains(&n.node));
        }
    }
}

/// The closest pair found in one scan: which active node owns the neighbour list, and the
/// neighbour itself. Ordered by distance, then by the match indexes of the pair.
#[derive(Debug, Clone, Copy)]
struct Candidate<T> {
    owner: usize,
    owner_index: usize,
    neighbour_index: usize,
    neighbour: Neighbor<T>,
}

impl<T: Float> Candidate<T> {
    fn compare(&self, other: &Self) -> Ordering {
        self.neighbour
            .distance_squared
            .partial_cmp(&other.neighbour.distance_squared)
            .unwrap_or(Ordering::Equal)
            .then(self.owner_index.cmp(&other.owner_index))
            .then(self.neighbour_index.cmp(&other.neighbour_index))
    }
}

/// Repeatedly merges the globally closest pair of active nodes until one tree remains.
pub(crate) struct AgglomerativeBuilder<'a> {
    progress: &'a dyn ProgressSink,
}

impl<'a> AgglomerativeBuilder<'a> {
    pub(crate) fn new(progress: &'a dyn ProgressSink) -> Self {
        AgglomerativeBuilder { progress }
    }

    /// Builds the cluster tree over `leaves`.
    ///
    /// # Parameters
    /// * `tree` - the arena holding the leaves; cluster nodes are added to it.
    /// * `leaves` - the leaf handles to cluster.
    /// * `neighbours` - the candidate list of each leaf, nearest first, aligned with `leaves`.
    ///
    /// # Returns
    /// * The root nodes, which are also stored as the tree's roots. Leaves without any
    ///   candidate in either direction take no part and are not under any root.
    pub(crate) fn build<T: Float + Send + Sync>(
        &self,
        tree: &mut Dendrogram<T>,
        leaves: &[NodeId],
        neighbours: Vec<Vec<Neighbor<T>>>,
    ) -> Result<Vec<NodeId>, ClusteringError> {
        let mut active = self.initial_active_nodes(leaves, neighbours);
        let n_forced = self.merge_all(tree, &mut active)?;

        let roots: Vec<NodeId> = active.into_iter().map(|active| active.node).collect();
        if n_forced > 0 {
            tracing::debug!(n_forced, "disconnected components joined by forced merges");
        }
        tree.set_roots(roots.clone());
        Ok(roots)
    }

    fn initial_active_nodes<T: Float>(
        &self,
        leaves: &[NodeId],
        neighbours: Vec<Vec<Neighbor<T>>>,
    ) -> Vec<ActiveNode<T>> {
        let referenced: HashSet<NodeId> = neighbours
            .iter()
            .flat_map(|list| list.iter().map(|n| n.node))
            .collect();

        leaves
            .iter()
            .zip(neighbours)
            .filter(|(leaf, list)| !list.is_empty() || referenced.contains(*leaf))
            .map(|(&leaf, list)| ActiveNode {
                node: leaf,
                first: Endpoint {
                    leaf,
                    neighbours: list,
                },
                second: None,
            })
            .collect()
    }

    fn merge_all<T: Float + Send + Sync>(
        &self,
        tree: &mut Dendrogram<T>,
        active: &mut Vec<ActiveNode<T>>,
    ) -> Result<usize, ClusteringError> {
        self.progress.reset(
            &format!("Building clusters for {} matches...", active.len()),
            active.len().saturating_sub(1),
        );

        let mut n_forced = 0;
        while active.len() > 1 {
            match self.find_closest(tree, active) {
                Some(candidate) => {
                    let target = tree.root_of(candidate.neighbour.node);
                    let second = active.iter().position(|a| a.node == target).ok_or_else(|| {
                        ClusteringError::InternalInvariant(format!(
                            "neighbour {} of node {} is not part of an active node",
                            candidate.neighbour_index, candidate.owner_index
                        ))
                    })?;
                    if second == candidate.owner {
                        return Err(ClusteringError::InternalInvariant(format!(
                            "node {} lists its own leaf {} as a neighbour",
                            active[second].node, candidate.neighbour_index
                        )));
                    }
                    // The neighbour's component goes first, the owner of the list second
                    let distance_squared = candidate.neighbour.distance_squared;
                    self.merge(tree, active, second, candidate.owner, distance_squared);
                }
                None => {
                    let (first, second) = largest_pair(tree, active);
                    self.merge(tree, active, first, second, T::infinity());
                    n_forced += 1;
                }
            }
            self.progress.increment();
        }
        self.progress.done();
        Ok(n_forced)
    }

    /// The nearest neighbour over both outer leaves of every active node.
    fn find_closest<T: Float + Send + Sync>(
        &self,
        tree: &Dendrogram<T>,
        active: &[ActiveNode<T>],
    ) -> Option<Candidate<T>> {
        active
            .par_iter()
            .enumerate()
            .flat_map_iter(|(owner, node)| {
                node.endpoints().filter_map(move |endpoint| {
                    endpoint.neighbours.first().map(|neighbour| Candidate {
                        owner,
                        owner_index: match_index(tree, endpoint.leaf),
                        neighbour_index: match_index(tree, neighbour.node),
                        neighbour: *neighbour,
                    })
                })
            })
            .min_by(|a, b| a.compare(b))
    }

    /// Merges the active nodes at positions `first` and `second` into a new cluster node that
    /// takes their place in the active set.
    fn merge<T: Float + Send + Sync>(
        &self,
        tree: &mut Dendrogram<T>,
        active: &mut Vec<ActiveNode<T>>,
        first: usize,
        second: usize,
        distance_squared: T,
    ) {
        let (first, second) = take_pair(active, first, second);
        let cluster = tree.push_cluster(first.node, second.node, distance_squared);

        // The facing leaves of the two children are now interior
        let mut interior = HashSet::new();
        let left = match first.second {
            Some(outer) => {
                interior.insert(outer.leaf);
                first.first
            }
            None => first.first,
        };
        let right = match second.second {
            Some(outer) => {
                interior.insert(second.first.leaf);
                outer
            }
            None => second.first,
        };

        let mut merged = ActiveNode {
            node: cluster,
            first: left,
            second: Some(right),
        };

        if !interior.is_empty() {
            active.par_iter_mut().for_each(|node| node.forget(&interior));
            merged.forget(&interior);
        }
        // No self-references between the two outer leaves of the new node
        let own: HashSet<NodeId> = merged.endpoints().map(|e| e.leaf).collect();
        merged.forget(&own);

        active.push(merged);
    }
}

/// Removes the two nodes from the active set, returning them in the given order.
fn take_pair<T>(
    active: &mut Vec<ActiveNode<T>>,
    first: usize,
    second: usize,
) -> (ActiveNode<T>, ActiveNode<T>) {
    if first > second {
        let first_node = active.swap_remove(first);
        let second_node = active.swap_remove(second);
        (first_node, second_node)
    } else {
        let second_node = active.swap_remove(second);
        let first_node = active.swap_remove(first);
        (first_node, second_node)
    }
}

/// The positions of the two active nodes with the most leaves, larger first. Used when no
/// active node has a neighbour left, i.e. the remaining components are disconnected.
fn largest_pair<T: Float>(tree: &Dendrogram<T>, active: &[ActiveNode<T>]) -> (usize, usize) {
    let mut by_size: Vec<usize> = (0..active.len()).collect();
    by_size.sort_by(|&a, &b| {
        tree.leaf_count(active[b].node)
            .cmp(&tree.leaf_count(active[a].node))
            .then_with(|| {
                match_index(tree, active[a].first.leaf)
                    .cmp(&match_index(tree, active[b].first.leaf))
            })
    });
    (by_size[0], by_size[1])
}

fn match_index<T: Float>(tree: &Dendrogram<T>, leaf: NodeId) -> usize {
    tree.leaf(leaf).map(|leaf| leaf.index).unwrap_or(usize::MAX)
}
