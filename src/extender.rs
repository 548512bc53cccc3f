use crate::data_wrappers::ClusterableMatch;
use crate::hyper_parameters::ClusteringParams;
use crate::node::Dendrogram;
use crate::primary_clusters::PrimaryCluster;
use crate::progress::ProgressSink;
use num_traits::Float;
use rayon::prelude::*;
use std::collections::{BTreeMap, HashSet};

/// Lower-threshold matches assigned to one primary cluster.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendedCluster {
    /// Position of the cluster in the primary cluster list.
    pub cluster: usize,
    /// The added matches, strongest first.
    pub added: Vec<ClusterableMatch>,
}

/// Assigns matches that were too weak for the main pass to the primary cluster they overlap
/// most with.
#[derive(Debug, Clone, Copy)]
pub struct ClusterExtender {
    min_cluster_size: usize,
    min_centimorgans: f64,
    cluster_overlap_fraction: f64,
    match_overlap_fraction: f64,
}

impl ClusterExtender {
    /// An extender taking candidates down to `min_centimorgans_to_cluster`.
    pub fn new(params: &ClusteringParams) -> Self {
        ClusterExtender {
            min_cluster_size: params.min_cluster_size,
            min_centimorgans: params.min_centimorgans_to_cluster,
            cluster_overlap_fraction: params.cluster_overlap_fraction,
            match_overlap_fraction: params.match_overlap_fraction,
        }
    }

    /// Finds the matches to add to each cluster.
    ///
    /// A candidate has a higher index than every clustered leaf, at least `min_centimorgans`
    /// and at least `min_cluster_size` shared matches. It joins the cluster it overlaps most
    /// with, provided that overlap covers enough of the cluster or enough of its own shared
    /// matches.
    ///
    /// # Returns
    /// * One entry per cluster that gained matches, in cluster order.
    pub fn extend<T: Float + Send + Sync>(
        &self,
        tree: &Dendrogram<T>,
        clusters: &[PrimaryCluster],
        matches: &[ClusterableMatch],
        progress: &dyn ProgressSink,
    ) -> Vec<ExtendedCluster> {
        let max_clustered_index = tree
            .all_ordered_leaves()
            .into_iter()
            .filter_map(|leaf| tree.leaf(leaf).map(|leaf| leaf.index()))
            .max();
        let Some(max_clustered_index) = max_clustered_index else {
            return Vec::new();
        };

        let cluster_members: Vec<HashSet<usize>> = clusters
            .iter()
            .map(|cluster| {
                cluster
                    .leaves
                    .iter()
                    .filter_map(|&leaf| tree.leaf(leaf).map(|leaf| leaf.index()))
                    .collect()
            })
            .collect();

        let candidates: Vec<&ClusterableMatch> = matches
            .iter()
            .filter(|m| {
                m.index > max_clustered_index
                    && m.shared_centimorgans() >= self.min_centimorgans
                    && m.coords.len() >= self.min_cluster_size
            })
            .collect();
        progress.reset("Extending clusters...", candidates.len());

        let assignments: Vec<(usize, &ClusterableMatch)> = candidates
            .par_iter()
            .filter_map(|&candidate| {
                let best = self.best_cluster(candidate, &cluster_members);
                progress.increment();
                best.map(|cluster| (cluster, candidate))
            })
            .collect();
        progress.done();

        let mut grouped: BTreeMap<usize, Vec<ClusterableMatch>> = BTreeMap::new();
        for (cluster, candidate) in assignments {
            grouped.entry(cluster).or_default().push(candidate.clone());
        }

        let extended: Vec<ExtendedCluster> = grouped
            .into_iter()
            .map(|(cluster, mut added)| {
                added.sort_by(|a, b| {
                    b.shared_centimorgans()
                        .total_cmp(&a.shared_centimorgans())
                        .then_with(|| a.index.cmp(&b.index))
                });
                ExtendedCluster { cluster, added }
            })
            .collect();

        tracing::debug!(
            n_candidates = candidates.len(),
            n_added = extended.iter().map(|e| e.added.len()).sum::<usize>(),
            n_extended = extended.len(),
            "clusters extended"
        );
        extended
    }

    /// Highest overlap wins, then the larger cluster, then the earlier one.
    fn best_cluster(
        &self,
        candidate: &ClusterableMatch,
        cluster_members: &[HashSet<usize>],
    ) -> Option<usize> {
        cluster_members
            .iter()
            .enumerate()
            .filter_map(|(position, members)| {
                let overlap = candidate
                    .coords
                    .iter()
                    .filter(|coord| members.contains(coord))
                    .count();
                self.qualifies(overlap, members.len(), candidate.coords.len())
                    .then_some((position, overlap, members.len()))
            })
            .min_by(|a, b| b.1.cmp(&a.1).then(b.2.cmp(&a.2)).then(a.0.cmp(&b.0)))
            .map(|(position, _, _)| position)
    }

    fn qualifies(&self, overlap: usize, cluster_size: usize, n_coords: usize) -> bool {
        let overlap = overlap as f64;
        let min = self.min_cluster_size as f64;
        overlap >= min.max(self.cluster_overlap_fraction * cluster_size as f64)
            || overlap >= min.max(self.match_overlap_fraction * n_coords as f64)
    }
}
