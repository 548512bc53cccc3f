use crate::agglomerative::AgglomerativeBuilder;
use crate::data_wrappers::{to_float, ClusterableMatch};
use crate::distance::Distance;
use crate::extender::ClusterExtender;
use crate::hyper_parameters::ClusteringParams;
use crate::matrix::CorrelationMatrix;
use crate::nearest_neighbour::NeighbourIndex;
use crate::node::{Dendrogram, NodeId};
use crate::output::{ClusteringResult, CorrelationWriter};
use crate::primary_clusters::{cluster_numbers, renumber, PrimaryCluster, PrimaryClusterFinder};
use crate::progress::{ProgressSink, SuppressProgress};
use crate::validation::DataValidator;
use crate::ClusteringError;
use num_traits::Float;
use rayon::prelude::*;
use std::collections::{HashMap, HashSet};
use std::marker::PhantomData;

/// Clusters DNA matches by the similarity of their shared match lists. Generic over floating
/// point numeric types.
pub struct SharedClustering<'a, T> {
    params: ClusteringParams,
    progress: &'a dyn ProgressSink,
    _weights: PhantomData<T>,
}

impl<'a, T: Float + Send + Sync> SharedClustering<'a, T> {
    /// Creates a clusterer using a custom parameter configuration.
    ///
    /// # Parameters
    /// * `params` - the clustering parameters. Out of range values are clamped as the builder
    ///   would clamp them.
    /// * `progress` - receives progress of each phase; use `SuppressProgress` to ignore it.
    ///
    /// # Examples
    /// ```
    ///use shared_clustering::{
    ///    ClusteringParams, DistanceMetric, SharedClustering, SuppressProgress,
    ///};
    ///
    ///let params = ClusteringParams::builder()
    ///    .min_cluster_size(4)
    ///    .dist_metric(DistanceMetric::OverlapWeighted)
    ///    .build();
    ///let clusterer: SharedClustering<f64> = SharedClustering::new(params, &SuppressProgress);
    /// ```
    pub fn new(params: ClusteringParams, progress: &'a dyn ProgressSink) -> Self {
        SharedClustering {
            params: params.validated(),
            progress,
            _weights: PhantomData,
        }
    }

    /// Creates a clusterer using the default parameters.
    pub fn default_params(progress: &'a dyn ProgressSink) -> Self {
        Self::new(ClusteringParams::default(), progress)
    }

    pub fn params(&self) -> &ClusteringParams {
        &self.params
    }

    /// Clusters the matches.
    ///
    /// Matches at or above the clusterable threshold are correlated and merged into a tree,
    /// whose maximal subtrees of at least `min_cluster_size` matches become the primary
    /// clusters. When `min_centimorgans_to_cluster` is below the clusterable threshold, weaker
    /// matches are then added to the clusters they overlap with and those clusters are rebuilt.
    ///
    /// # Parameters
    /// * `matches` - the matches, each with a unique index. The coords of a match are the
    ///   indexes of the matches on its shared match list.
    ///
    /// # Returns
    /// * The cluster tree, the primary clusters and each clustered match's cluster number.
    ///
    /// # Errors
    /// * `EmptyDataset` if no matches are given, `DuplicateIndex` or `NonFiniteCentimorgans`
    ///   for malformed input, and `NoClusterableMatches` if nothing reaches the clusterable
    ///   threshold.
    pub fn cluster(
        &self,
        matches: &[ClusterableMatch],
    ) -> Result<ClusteringResult<T>, ClusteringError> {
        DataValidator::new(matches).validate_input_data()?;

        let floor = self.params.clusterable_floor();
        let max_index = matches
            .iter()
            .filter(|m| m.shared_centimorgans() >= floor)
            .map(|m| m.index)
            .max()
            .ok_or(ClusteringError::NoClusterableMatches(floor))?;

        let to_correlate: Vec<&ClusterableMatch> = matches
            .iter()
            .filter(|m| m.index <= max_index && self.passes_filter(m))
            .collect();
        if to_correlate.is_empty() {
            return Err(ClusteringError::NoClusterableMatches(floor));
        }

        let immediate_family = self.immediate_family(&to_correlate);
        tracing::info!(
            n_matches = matches.len(),
            n_correlated = to_correlate.len(),
            n_immediate_family = immediate_family.len(),
            "clustering matches"
        );

        let matrix_builder = self.params.matrix_builder;
        let matrix: CorrelationMatrix<T> = matrix_builder.correlate(
            &to_correlate,
            &immediate_family,
            self.params.lowest_clusterable_centimorgans,
            self.progress,
        )?;
        let significance = matrix_builder.significance_threshold::<T>();
        let distance = Distance::new(
            self.params.dist_metric,
            significance,
            immediate_family.iter().copied(),
        );

        let indexes: Vec<usize> = to_correlate.iter().map(|m| m.index).collect();
        let mut tree = self.cluster_matches(&indexes, &matrix, &distance, self.progress)?;

        let mut primary_clusters = PrimaryClusterFinder::new(self.params.min_cluster_size)
            .with_max_cluster_size(self.params.max_cluster_size)
            .with_max_merge_distance(to_float(self.params.max_merge_distance))
            .find(&tree);
        tracing::info!(
            n_leaves = tree.all_ordered_leaves().len(),
            n_clusters = primary_clusters.len(),
            "primary clusters found"
        );

        if self.params.min_centimorgans_to_cluster < floor {
            self.recluster(&mut tree, &mut primary_clusters, matches, &matrix, &distance)?;
        }

        renumber(&mut primary_clusters);
        let cluster_numbers = cluster_numbers(&tree, &primary_clusters);
        tracing::info!(
            n_clusters = primary_clusters.len(),
            n_clustered = cluster_numbers.len(),
            "clustering finished"
        );

        Ok(ClusteringResult::new(
            tree,
            primary_clusters,
            cluster_numbers,
            immediate_family,
            significance,
            self.params.min_cluster_size,
        ))
    }

    /// Clusters the matches and hands the result to `writer`.
    ///
    /// # Returns
    /// * The result that was written.
    pub fn cluster_and_write<W>(
        &self,
        matches: &[ClusterableMatch],
        writer: &mut W,
    ) -> Result<ClusteringResult<T>, ClusteringError>
    where
        W: CorrelationWriter<T>,
    {
        let result = self.cluster(matches)?;
        let matches_by_index: HashMap<usize, &ClusterableMatch> =
            matches.iter().map(|m| (m.index, m)).collect();
        writer
            .write(&result, &matches_by_index)
            .map_err(|e| ClusteringError::Output(Box::new(e)))?;
        Ok(result)
    }

    fn passes_filter(&self, clusterable_match: &ClusterableMatch) -> bool {
        self.params.test_ids_to_filter.is_empty()
            || self
                .params
                .test_ids_to_filter
                .contains(&clusterable_match.record.test_id)
    }

    /// Matches over the family threshold, unless they make up more than half of the matches.
    fn immediate_family(&self, matches: &[&ClusterableMatch]) -> HashSet<usize> {
        let family: HashSet<usize> = matches
            .iter()
            .filter(|m| m.shared_centimorgans() > self.params.immediate_family_centimorgans)
            .map(|m| m.index)
            .collect();
        if family.len() * 2 > matches.len() {
            tracing::warn!(
                n_immediate_family = family.len(),
                n_matches = matches.len(),
                "most matches are immediate family, treating none of them as such"
            );
            return HashSet::new();
        }
        family
    }

    /// Builds a tree over the given matches, one leaf per match from its matrix row.
    fn cluster_matches(
        &self,
        indexes: &[usize],
        matrix: &CorrelationMatrix<T>,
        distance: &Distance<T>,
        progress: &dyn ProgressSink,
    ) -> Result<Dendrogram<T>, ClusteringError> {
        let mut tree = Dendrogram::new();
        let mut leaves: Vec<NodeId> = Vec::with_capacity(indexes.len());
        for &index in indexes {
            let row = matrix.row(index).ok_or_else(|| {
                ClusteringError::InternalInvariant(format!("match {index} has no correlation row"))
            })?;
            leaves.push(tree.push_leaf(index, row));
        }

        progress.reset(
            &format!("Finding closest pairwise distances for {} matches...", leaves.len()),
            leaves.len(),
        );
        let neighbours = {
            let index = NeighbourIndex::new(&tree, &leaves, distance);
            tracing::debug!(n_buckets = index.bucket_count(), "neighbour index built");
            index.neighbours_by_distance(&leaves, progress)
        };

        AgglomerativeBuilder::new(progress).build(&mut tree, &leaves, neighbours)?;
        Ok(tree)
    }

    /// Adds the lower threshold matches to the clusters they overlap and rebuilds each extended
    /// cluster on its own. Rebuilt subtrees take the place of the clusters they replace.
    fn recluster(
        &self,
        tree: &mut Dendrogram<T>,
        primary_clusters: &mut [PrimaryCluster],
        matches: &[ClusterableMatch],
        matrix: &CorrelationMatrix<T>,
        distance: &Distance<T>,
    ) -> Result<(), ClusteringError> {
        // Matches with a row were already correlated in the main pass
        let candidates: Vec<ClusterableMatch> = matches
            .iter()
            .filter(|m| !matrix.contains_row(m.index) && self.passes_filter(m))
            .cloned()
            .collect();
        let extended = ClusterExtender::new(&self.params).extend(
            tree,
            primary_clusters,
            &candidates,
            self.progress,
        );
        if extended.is_empty() {
            return Ok(());
        }

        for extended_cluster in &extended {
            self.params
                .matrix_builder
                .extend_matrix(matrix, &extended_cluster.added);
        }

        self.progress.reset(
            &format!("Reclustering {} primary clusters...", extended.len()),
            extended.len(),
        );
        let rebuilt: Vec<(usize, Dendrogram<T>)> = {
            let tree: &Dendrogram<T> = tree;
            let primary_clusters: &[PrimaryCluster] = primary_clusters;
            extended
                .par_iter()
                .map(|extended_cluster| {
                    let indexes: Vec<usize> = primary_clusters[extended_cluster.cluster]
                        .leaves
                        .iter()
                        .filter_map(|&leaf| tree.leaf(leaf).map(|leaf| leaf.index()))
                        .chain(extended_cluster.added.iter().map(|m| m.index))
                        .collect();
                    let subtree =
                        self.cluster_matches(&indexes, matrix, distance, &SuppressProgress);
                    self.progress.increment();
                    subtree.map(|subtree| (extended_cluster.cluster, subtree))
                })
                .collect::<Result<_, _>>()?
        };

        for (position, subtree) in rebuilt {
            let Some(&root) = subtree.roots().first() else {
                continue;
            };
            let cluster = &mut primary_clusters[position];
            let existing_leaves: HashMap<usize, NodeId> = cluster
                .leaves
                .iter()
                .filter_map(|&leaf| tree.leaf(leaf).map(|l| (l.index(), leaf)))
                .collect();
            let n_kept = subtree
                .ordered_leaf_indexes(root)
                .iter()
                .filter(|index| existing_leaves.contains_key(index))
                .count();
            if n_kept < existing_leaves.len() {
                tracing::warn!(
                    cluster = position + 1,
                    n_lost = existing_leaves.len() - n_kept,
                    "rebuilt cluster would lose matches, keeping the original"
                );
                continue;
            }
            let grafted = tree.graft(&subtree, root, &existing_leaves);
            tree.replace_node(cluster.node, grafted)?;
            cluster.node = grafted;
            cluster.leaves = tree.ordered_leaves(grafted);
        }
        self.progress.done();

        Ok(())
    }
}
