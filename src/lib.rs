//! Agglomerative hierarchical clustering of DNA matches by their shared match lists, in Rust.
//! Generic over floating point numeric types.
//!
//! Every DNA match comes with a list of the other matches it shares DNA with. Matches
//! descending from the same ancestral couple tend to appear on each other's lists, so grouping
//! matches whose lists look alike recovers those ancestral lines. The clustering works in
//! three stages:
//!  1. The shared match lists are turned into a sparse correlation matrix, one row per match.
//!     Two weighting policies are available (see `MatrixBuilder`);
//!  2. Rows are merged bottom up into a binary tree, always joining the globally closest pair.
//!     Only rows sharing at least one direct correlation are ever compared, which keeps this
//!     near linear in the size of the shared match lists; and
//!  3. The maximal subtrees with enough matches are reported as numbered clusters. Optionally,
//!     matches too weak for the main pass are then added to the clusters they overlap most
//!     with, and those clusters are rebuilt.
//!
//! The result is meant to be presented as a heat map of the matrix with rows and columns in
//! tree order, which is left to a `CorrelationWriter`.
//!
//! # Examples
//! ```
//!use shared_clustering::{
//!    ClusterableMatch, ClusteringParams, MatchRecord, SharedClustering, SuppressProgress,
//!};
//!
//!// Two families of four matches that only share matches within the family
//!let matches: Vec<ClusterableMatch> = (0..8)
//!    .map(|index| {
//!        let family = index / 4 * 4;
//!        let record = MatchRecord::new(format!("match-{index}"), 100.0 - index as f64);
//!        ClusterableMatch::new(index, record, family..family + 4)
//!    })
//!    .collect();
//!
//!// The two families never meet, so they are only joined by a forced merge at infinity
//!let params = ClusteringParams::builder().max_merge_distance(100.0).build();
//!let clusterer: SharedClustering<f64> = SharedClustering::new(params, &SuppressProgress);
//!let result = clusterer.cluster(&matches).unwrap();
//!assert_eq!(result.primary_clusters.len(), 2);
//!assert_eq!(result.cluster_number(0), result.cluster_number(3));
//!assert_ne!(result.cluster_number(0), result.cluster_number(4));
//! ```

pub use crate::clustering::SharedClustering;
pub use crate::data_wrappers::{ClusterableMatch, MatchRecord, Neighbor, SparseRow};
pub use crate::distance::{Distance, DistanceMetric};
pub use crate::error::ClusteringError;
pub use crate::extender::{ClusterExtender, ExtendedCluster};
pub use crate::hyper_parameters::{ClusteringParams, ClusteringParamsBuilder};
pub use crate::matrix::{CorrelationMatrix, MatrixBuilder};
pub use crate::node::{ClusterNode, Dendrogram, LeafNode, Node, NodeId};
pub use crate::output::{ClusteringResult, CorrelationWriter, TabSeparatedWriter};
pub use crate::primary_clusters::{cluster_numbers, PrimaryCluster, PrimaryClusterFinder};
pub use crate::progress::{ProgressSink, SuppressProgress, TracingProgress};

mod agglomerative;
mod clustering;
mod data_wrappers;
mod distance;
mod error;
mod extender;
mod hyper_parameters;
mod matrix;
mod nearest_neighbour;
mod node;
mod output;
mod primary_clusters;
mod progress;
mod validation;
