use crate::distance::DistanceMetric;
use crate::matrix::MatrixBuilder;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

// Defaults for parameters
const MIN_CLUSTER_SIZE_DEFAULT: usize = 3;
const MAX_CLUSTER_SIZE_DEFAULT: usize = usize::MAX; // Set to a value that will never be triggered
const MAX_MERGE_DISTANCE_DEFAULT: f64 = f64::INFINITY;
const MIN_CENTIMORGANS_TO_CLUSTER_DEFAULT: f64 = 20.0;
const LOWEST_CLUSTERABLE_CENTIMORGANS_DEFAULT: f64 = 20.0;
const IMMEDIATE_FAMILY_CENTIMORGANS_DEFAULT: f64 = 200.0;
const DISTANCE_METRIC_DEFAULT: DistanceMetric = DistanceMetric::EuclideanSquared;
const CLUSTER_OVERLAP_FRACTION_DEFAULT: f64 = 0.35;
const MATCH_OVERLAP_FRACTION_DEFAULT: f64 = 0.5;
const DIRECT_CORRELATION_VALUE_DEFAULT: f64 = 2.0;

// Valid minimums/left bounds of parameters
const MIN_CLUSTER_SIZE_MINIMUM: usize = 2;
const MAX_CLUSTER_SIZE_MINIMUM: usize = 2;

/// A wrapper around the parameters used when clustering matches. Use
/// `ClusteringParams::builder()` to tune them, or `ClusteringParams::default()` otherwise.
/// Missing fields take their defaults when deserializing. Deserialized values are not
/// clamped until they are handed to a `SharedClustering`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusteringParams {
    pub(crate) min_cluster_size: usize,
    pub(crate) max_cluster_size: usize,
    pub(crate) max_merge_distance: f64,
    pub(crate) min_centimorgans_to_cluster: f64,
    pub(crate) lowest_clusterable_centimorgans: f64,
    pub(crate) immediate_family_centimorgans: f64,
    pub(crate) matrix_builder: MatrixBuilder,
    pub(crate) dist_metric: DistanceMetric,
    pub(crate) cluster_overlap_fraction: f64,
    pub(crate) match_overlap_fraction: f64,
    pub(crate) test_ids_to_filter: HashSet<String>,
}

/// Builder object to set custom clustering parameters.
#[derive(Debug, Clone, Default)]
pub struct ClusteringParamsBuilder {
    min_cluster_size: Option<usize>,
    max_cluster_size: Option<usize>,
    max_merge_distance: Option<f64>,
    min_centimorgans_to_cluster: Option<f64>,
    lowest_clusterable_centimorgans: Option<f64>,
    immediate_family_centimorgans: Option<f64>,
    matrix_builder: Option<MatrixBuilder>,
    dist_metric: Option<DistanceMetric>,
    cluster_overlap_fraction: Option<f64>,
    match_overlap_fraction: Option<f64>,
    test_ids_to_filter: Option<HashSet<String>>,
}

impl Default for ClusteringParams {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ClusteringParams {
    /// Enters the builder pattern, allowing custom parameters to be set using various setter
    /// methods.
    ///
    /// # Returns
    /// * the parameter configuration builder
    pub fn builder() -> ClusteringParamsBuilder {
        ClusteringParamsBuilder::default()
    }

    pub fn min_cluster_size(&self) -> usize {
        self.min_cluster_size
    }

    pub fn max_cluster_size(&self) -> usize {
        self.max_cluster_size
    }

    pub fn min_centimorgans_to_cluster(&self) -> f64 {
        self.min_centimorgans_to_cluster
    }

    /// The threshold matches must reach to take part in the main clustering pass.
    pub fn clusterable_floor(&self) -> f64 {
        self.min_centimorgans_to_cluster
            .max(self.lowest_clusterable_centimorgans)
    }

    pub fn matrix_builder(&self) -> MatrixBuilder {
        self.matrix_builder
    }

    pub fn dist_metric(&self) -> DistanceMetric {
        self.dist_metric
    }

    /// Runs every value through the builder's checks.
    pub(crate) fn validated(self) -> ClusteringParams {
        ClusteringParams::builder()
            .min_cluster_size(self.min_cluster_size)
            .max_cluster_size(self.max_cluster_size)
            .max_merge_distance(self.max_merge_distance)
            .min_centimorgans_to_cluster(self.min_centimorgans_to_cluster)
            .lowest_clusterable_centimorgans(self.lowest_clusterable_centimorgans)
            .immediate_family_centimorgans(self.immediate_family_centimorgans)
            .matrix_builder(self.matrix_builder)
            .dist_metric(self.dist_metric)
            .cluster_overlap_fraction(self.cluster_overlap_fraction)
            .match_overlap_fraction(self.match_overlap_fraction)
            .test_ids_to_filter(self.test_ids_to_filter)
            .build()
    }
}

impl ClusteringParamsBuilder {
    /// Sets the minimum cluster size - the number of matches a subtree needs before it is
    /// reported as a primary cluster. Also the minimum overlap a lower threshold match needs
    /// with a cluster to be added to it. Defaults to 3.
    ///
    /// # Parameters
    /// * min_cluster_size - the minimum cluster size
    ///
    /// # Returns
    /// * the parameter configuration builder
    pub fn min_cluster_size(mut self, min_cluster_size: usize) -> ClusteringParamsBuilder {
        let valid_min_cluster_size = ClusteringParamsBuilder::validate_input_left_bound(
            min_cluster_size,
            MIN_CLUSTER_SIZE_MINIMUM,
            "min_cluster_size",
        );
        self.min_cluster_size = Some(valid_min_cluster_size);
        self
    }

    /// Sets the maximum cluster size. Subtrees with more matches than this are split into
    /// their children rather than reported as one cluster. Unbounded by default.
    ///
    /// # Parameters
    /// * max_cluster_size - the maximum cluster size
    ///
    /// # Returns
    /// * the parameter configuration builder
    pub fn max_cluster_size(mut self, max_cluster_size: usize) -> ClusteringParamsBuilder {
        let valid_max_cluster_size = ClusteringParamsBuilder::validate_input_left_bound(
            max_cluster_size,
            MAX_CLUSTER_SIZE_MINIMUM,
            "max_cluster_size",
        );
        self.max_cluster_size = Some(valid_max_cluster_size);
        self
    }

    /// Sets the maximum squared merge distance of a primary cluster. Subtrees merged further
    /// apart are split into their children. Unbounded by default, so forced merges of
    /// disconnected components can still form a cluster.
    pub fn max_merge_distance(mut self, max_merge_distance: f64) -> ClusteringParamsBuilder {
        self.max_merge_distance = Some(if max_merge_distance.is_nan() {
            tracing::warn!("max_merge_distance cannot be NaN. Set to infinity.");
            MAX_MERGE_DISTANCE_DEFAULT
        } else {
            max_merge_distance
        });
        self
    }

    /// Sets the lowest shared centimorgans of a match that can be clustered. Values below the
    /// lowest clusterable threshold do not take part in the main pass; instead they are used
    /// to extend the clusters found. Defaults to 20.
    pub fn min_centimorgans_to_cluster(mut self, centimorgans: f64) -> ClusteringParamsBuilder {
        self.min_centimorgans_to_cluster = Some(Self::validate_non_negative(
            centimorgans,
            "min_centimorgans_to_cluster",
        ));
        self
    }

    /// Sets the shared centimorgans below which matches never appear on a shared match list.
    /// Their rows and columns are left out of the correlation matrix. Defaults to 20.
    pub fn lowest_clusterable_centimorgans(mut self, centimorgans: f64) -> ClusteringParamsBuilder {
        self.lowest_clusterable_centimorgans = Some(Self::validate_non_negative(
            centimorgans,
            "lowest_clusterable_centimorgans",
        ));
        self
    }

    /// Sets the shared centimorgans above which a match counts as immediate family.
    /// Defaults to 200.
    pub fn immediate_family_centimorgans(mut self, centimorgans: f64) -> ClusteringParamsBuilder {
        self.immediate_family_centimorgans = Some(Self::validate_non_negative(
            centimorgans,
            "immediate_family_centimorgans",
        ));
        self
    }

    /// Sets the policy used to build the correlation matrix. Defaults to appearance weighted
    /// without indirect reduction. A count based direct value must be positive, and the
    /// indirect value cannot be negative.
    pub fn matrix_builder(mut self, matrix_builder: MatrixBuilder) -> ClusteringParamsBuilder {
        let matrix_builder = match matrix_builder {
            MatrixBuilder::AppearanceWeighted {
                max_indirect_percentage,
            } => MatrixBuilder::AppearanceWeighted {
                max_indirect_percentage: Self::validate_range(
                    max_indirect_percentage,
                    0.0,
                    100.0,
                    "max_indirect_percentage",
                ),
            },
            MatrixBuilder::CountBased {
                direct_correlation_value,
                indirect_correlation_value,
            } => MatrixBuilder::CountBased {
                direct_correlation_value: Self::validate_positive(
                    direct_correlation_value,
                    DIRECT_CORRELATION_VALUE_DEFAULT,
                    "direct_correlation_value",
                ),
                indirect_correlation_value: Self::validate_non_negative(
                    indirect_correlation_value,
                    "indirect_correlation_value",
                ),
            },
        };
        self.matrix_builder = Some(matrix_builder);
        self
    }

    /// Sets the distance metric used between correlation rows. Defaults to squared Euclidean.
    pub fn dist_metric(mut self, dist_metric: DistanceMetric) -> ClusteringParamsBuilder {
        self.dist_metric = Some(dist_metric);
        self
    }

    /// Sets the fraction of a cluster's matches a lower threshold match must share to join
    /// it. Defaults to 0.35.
    pub fn cluster_overlap_fraction(mut self, fraction: f64) -> ClusteringParamsBuilder {
        self.cluster_overlap_fraction = Some(Self::validate_range(
            fraction,
            0.0,
            1.0,
            "cluster_overlap_fraction",
        ));
        self
    }

    /// Sets the fraction of its own shared matches a lower threshold match must have in a
    /// cluster to join it. Defaults to 0.5.
    pub fn match_overlap_fraction(mut self, fraction: f64) -> ClusteringParamsBuilder {
        self.match_overlap_fraction = Some(Self::validate_range(
            fraction,
            0.0,
            1.0,
            "match_overlap_fraction",
        ));
        self
    }

    /// Restricts clustering to the matches with these test ids. Empty means no restriction.
    pub fn test_ids_to_filter<I, S>(mut self, test_ids: I) -> ClusteringParamsBuilder
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.test_ids_to_filter = Some(test_ids.into_iter().map(Into::into).collect());
        self
    }

    /// Finishes the building of the parameter configuration.
    ///
    /// # Returns
    /// * The completed clustering parameter configuration.
    pub fn build(self) -> ClusteringParams {
        ClusteringParams {
            min_cluster_size: self.min_cluster_size.unwrap_or(MIN_CLUSTER_SIZE_DEFAULT),
            max_cluster_size: self.max_cluster_size.unwrap_or(MAX_CLUSTER_SIZE_DEFAULT),
            max_merge_distance: self.max_merge_distance.unwrap_or(MAX_MERGE_DISTANCE_DEFAULT),
            min_centimorgans_to_cluster: self
                .min_centimorgans_to_cluster
                .unwrap_or(MIN_CENTIMORGANS_TO_CLUSTER_DEFAULT),
            lowest_clusterable_centimorgans: self
                .lowest_clusterable_centimorgans
                .unwrap_or(LOWEST_CLUSTERABLE_CENTIMORGANS_DEFAULT),
            immediate_family_centimorgans: self
                .immediate_family_centimorgans
                .unwrap_or(IMMEDIATE_FAMILY_CENTIMORGANS_DEFAULT),
            matrix_builder: self.matrix_builder.unwrap_or_default(),
            dist_metric: self.dist_metric.unwrap_or(DISTANCE_METRIC_DEFAULT),
            cluster_overlap_fraction: self
                .cluster_overlap_fraction
                .unwrap_or(CLUSTER_OVERLAP_FRACTION_DEFAULT),
            match_overlap_fraction: self
                .match_overlap_fraction
                .unwrap_or(MATCH_OVERLAP_FRACTION_DEFAULT),
            test_ids_to_filter: self.test_ids_to_filter.unwrap_or_default(),
        }
    }

    fn validate_input_left_bound(input_param: usize, left_bound: usize, param: &str) -> usize {
        if input_param < left_bound {
            tracing::warn!(
                "{param} ({input_param}) cannot be lower than {left_bound}. Set to {left_bound}."
            );
            left_bound
        } else {
            input_param
        }
    }

    fn validate_non_negative(input_param: f64, param: &str) -> f64 {
        Self::validate_range(input_param, 0.0, f64::INFINITY, param)
    }

    fn validate_positive(input_param: f64, default: f64, param: &str) -> f64 {
        if input_param > 0.0 && input_param.is_finite() {
            input_param
        } else {
            tracing::warn!("{param} ({input_param}) must be positive. Set to {default}.");
            default
        }
    }

    fn validate_range(input_param: f64, lower: f64, upper: f64, param: &str) -> f64 {
        if input_param.is_nan() {
            tracing::warn!("{param} cannot be NaN. Set to {lower}.");
            lower
        } else if input_param < lower || input_param > upper {
            let clamped = input_param.clamp(lower, upper);
            tracing::warn!(
                "{param} ({input_param}) must be in {lower}..={upper}. Set to {clamped}."
            );
            clamped
        } else {
            input_param
        }
    }
}
