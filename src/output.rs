use crate::data_wrappers::ClusterableMatch;
use crate::node::{Dendrogram, NodeId};
use crate::primary_clusters::PrimaryCluster;
use num_traits::Float;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::Write;

/// The finished cluster tree and everything a writer needs to present it.
#[derive(Debug, Clone)]
pub struct ClusteringResult<T> {
    pub tree: Dendrogram<T>,
    /// Maximal clusters, numbered from 1 in tree order.
    pub primary_clusters: Vec<PrimaryCluster>,
    /// Match index to cluster number, for clustered matches only.
    pub cluster_numbers: HashMap<usize, usize>,
    pub immediate_family: HashSet<usize>,
    significance: T,
    min_cluster_size: usize,
    leaves_by_index: HashMap<usize, NodeId>,
}

impl<T: Float> ClusteringResult<T> {
    pub(crate) fn new(
        tree: Dendrogram<T>,
        primary_clusters: Vec<PrimaryCluster>,
        cluster_numbers: HashMap<usize, usize>,
        immediate_family: HashSet<usize>,
        significance: T,
        min_cluster_size: usize,
    ) -> Self {
        let leaves_by_index = tree
            .all_ordered_leaves()
            .into_iter()
            .filter_map(|id| tree.leaf(id).map(|leaf| (leaf.index(), id)))
            .collect();
        ClusteringResult {
            tree,
            primary_clusters,
            cluster_numbers,
            immediate_family,
            significance,
            min_cluster_size,
            leaves_by_index,
        }
    }

    /// Match indexes of every leaf under the roots, in tree order.
    pub fn ordered_match_indexes(&self) -> Vec<usize> {
        self.tree
            .all_ordered_leaves()
            .into_iter()
            .filter_map(|id| self.tree.leaf(id).map(|leaf| leaf.index()))
            .collect()
    }

    pub fn cluster_number(&self, index: usize) -> Option<usize> {
        self.cluster_numbers.get(&index).copied()
    }

    /// The leaf standing for a match, if the match made it into the tree.
    pub fn leaf_of(&self, index: usize) -> Option<NodeId> {
        self.leaves_by_index.get(&index).copied()
    }

    /// The numbers of the other clusters a match is directly correlated with: at least
    /// `min_cluster_size` non-family matches of that cluster must appear directly in the match's
    /// row. Ascending; empty for matches outside the tree.
    pub fn correlated_clusters(&self, index: usize) -> Vec<usize> {
        let Some(leaf) = self.leaf_of(index).and_then(|id| self.tree.leaf(id)) else {
            return Vec::new();
        };
        let own_cluster = self.cluster_number(index);

        let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
        for &(coord, weight) in leaf.coords().entries() {
            if weight < self.significance || self.immediate_family.contains(&coord) {
                continue;
            }
            match self.cluster_number(coord) {
                Some(number) if Some(number) != own_cluster => {
                    *counts.entry(number).or_insert(0) += 1;
                }
                _ => {}
            }
        }
        counts
            .into_iter()
            .filter(|(_, count)| *count >= self.min_cluster_size)
            .map(|(number, _)| number)
            .collect()
    }
}

/// Presents a clustering result. Implementations decide the output format.
pub trait CorrelationWriter<T> {
    type Error: std::error::Error + Send + Sync + 'static;

    fn write(
        &mut self,
        result: &ClusteringResult<T>,
        matches_by_index: &HashMap<usize, &ClusterableMatch>,
    ) -> Result<(), Self::Error>;
}

/// Writes one `index<TAB>cluster<TAB>test id<TAB>cM` line per match in tree order. The cluster
/// column is empty for unclustered matches.
#[derive(Debug)]
pub struct TabSeparatedWriter<W> {
    out: W,
}

impl<W: Write> TabSeparatedWriter<W> {
    pub fn new(out: W) -> Self {
        TabSeparatedWriter { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<T: Float, W: Write> CorrelationWriter<T> for TabSeparatedWriter<W> {
    type Error = std::io::Error;

    fn write(
        &mut self,
        result: &ClusteringResult<T>,
        matches_by_index: &HashMap<usize, &ClusterableMatch>,
    ) -> Result<(), Self::Error> {
        for index in result.ordered_match_indexes() {
            let cluster = result
                .cluster_number(index)
                .map(|number| number.to_string())
                .unwrap_or_default();
            match matches_by_index.get(&index) {
                Some(m) => writeln!(
                    self.out,
                    "{index}\t{cluster}\t{}\t{:.1}",
                    m.record.test_id,
                    m.shared_centimorgans()
                )?,
                None => writeln!(self.out, "{index}\t{cluster}\t\t")?,
            }
        }
        self.out.flush()
    }
}
