use shared_clustering::{
    ClusterableMatch, ClusteringError, ClusteringParams, ClusteringResult, CorrelationMatrix,
    CorrelationWriter, DistanceMetric, MatchRecord, MatrixBuilder, ProgressSink,
    SharedClustering, SuppressProgress, TabSeparatedWriter,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[test]
fn count_based_weights() {
    // 3 and 4 appear together on three lists but never on each other's
    let matches = vec![
        clusterable(0, 50.0, [0, 3, 4]),
        clusterable(1, 50.0, [1, 3, 4]),
        clusterable(2, 50.0, [2, 3, 4]),
        clusterable(3, 50.0, [3]),
        clusterable(4, 50.0, [4]),
    ];
    let builder = MatrixBuilder::CountBased {
        direct_correlation_value: 2.0,
        indirect_correlation_value: 0.1,
    };
    let matrix: CorrelationMatrix<f64> = builder
        .correlate(&refs(&matches), &HashSet::new(), 20.0, &SuppressProgress)
        .unwrap();

    assert_eq!(matrix.width(), 5);
    assert!((matrix.get(3, 4) - 0.3).abs() < 1e-9);
    assert!((matrix.get(4, 3) - 0.3).abs() < 1e-9);
    assert_eq!(matrix.get(0, 3), 2.0);
    assert_eq!(matrix.get(3, 3), 2.0);
    // Matches 0 and 1 never appear together
    assert_eq!(matrix.get(0, 1), 0.0);
}

#[test]
fn count_based_indirect_weight_is_capped() {
    // Twenty lists hold both 20 and 21, which would add up to 2.0 uncapped
    let mut matches: Vec<ClusterableMatch> =
        (0..20).map(|i| clusterable(i, 50.0, [i, 20, 21])).collect();
    matches.push(clusterable(20, 50.0, [20]));
    matches.push(clusterable(21, 50.0, [21]));
    let builder = MatrixBuilder::CountBased {
        direct_correlation_value: 2.0,
        indirect_correlation_value: 0.1,
    };
    let matrix: CorrelationMatrix<f32> = builder
        .correlate(&refs(&matches), &HashSet::new(), 20.0, &SuppressProgress)
        .unwrap();
    assert_eq!(matrix.get(20, 21), 1.0);
    assert_eq!(matrix.get(20, 20), 2.0);
}

#[test]
fn count_based_rows_cover_family_with_the_highest_index() {
    // Match 3 is immediate family and has the highest index of all
    let matches = vec![
        clusterable(0, 50.0, [0, 1, 2]),
        clusterable(1, 45.0, [0, 1, 2]),
        clusterable(2, 40.0, [0, 1, 2]),
        clusterable(3, 300.0, [0, 1, 2, 3]),
    ];
    let builder = MatrixBuilder::CountBased {
        direct_correlation_value: 2.0,
        indirect_correlation_value: 0.1,
    };
    let matrix: CorrelationMatrix<f64> = builder
        .correlate(&refs(&matches), &HashSet::from([3]), 20.0, &SuppressProgress)
        .unwrap();
    assert_eq!(matrix.width(), 4);
    assert!(matrix.contains_row(3));
    assert_eq!(matrix.get(3, 0), 2.0);
    assert_eq!(matrix.get(3, 3), 2.0);

    let params = ClusteringParams::builder().matrix_builder(builder).build();
    let result = SharedClustering::<f64>::new(params, &SuppressProgress)
        .cluster(&matches)
        .unwrap();
    assert_eq!(result.immediate_family, HashSet::from([3]));
    let mut indexes = result.ordered_match_indexes();
    indexes.sort_unstable();
    assert_eq!(indexes, vec![0, 1, 2, 3]);
}

#[test]
fn appearance_weighted_weights() {
    let matches = vec![
        clusterable(0, 90.0, [0, 1, 2]),
        clusterable(1, 80.0, [0, 1]),
        clusterable(2, 70.0, [0, 2]),
    ];
    let matrix: CorrelationMatrix<f64> = MatrixBuilder::default()
        .correlate(&refs(&matches), &HashSet::new(), 20.0, &SuppressProgress)
        .unwrap();

    // 1 appears on two lists and 2 is on one of them
    assert!((matrix.get(1, 2) - 0.5).abs() < 1e-9);
    assert!((matrix.get(1, 0) - 2.0).abs() < 1e-9);
    assert!((matrix.get(0, 1) - (1.0 + 2.0 / 3.0)).abs() < 1e-9);
    assert!((matrix.get(0, 0) - 2.0).abs() < 1e-9);
}

#[test]
fn appearance_weighted_drops_unclusterable_columns() {
    // Match 3 is too distant to be clustered
    let matches = vec![
        clusterable(0, 90.0, [0, 1, 2, 3]),
        clusterable(1, 80.0, [0, 1, 2]),
        clusterable(2, 70.0, [0, 1, 2]),
        clusterable(3, 10.0, [0, 3]),
    ];
    let matrix: CorrelationMatrix<f64> = MatrixBuilder::default()
        .correlate(&refs(&matches), &HashSet::new(), 20.0, &SuppressProgress)
        .unwrap();
    assert_eq!(matrix.get(0, 3), 0.0);
    assert_eq!(matrix.get(3, 0), 0.0);
    assert!(matrix.get(0, 1) >= 1.0);
}

#[test]
fn appearance_weighted_reduces_indirect_cells() {
    let matches = vec![
        clusterable(0, 90.0, [0, 1, 2]),
        clusterable(1, 80.0, [0, 1]),
        clusterable(2, 70.0, [0, 2]),
    ];
    let builder = MatrixBuilder::AppearanceWeighted {
        max_indirect_percentage: 0.0,
    };
    let matrix: CorrelationMatrix<f64> = builder
        .correlate(&refs(&matches), &HashSet::new(), 20.0, &SuppressProgress)
        .unwrap();
    assert_eq!(matrix.get(1, 2), 0.0);
    assert!((matrix.get(1, 0) - 2.0).abs() < 1e-9);
}

#[test]
fn direct_weights_are_symmetric_for_mutual_lists() {
    let matches = families(&[4, 3, 5]);
    let builder = MatrixBuilder::CountBased {
        direct_correlation_value: 2.0,
        indirect_correlation_value: 0.1,
    };
    let matrix: CorrelationMatrix<f64> = builder
        .correlate(&refs(&matches), &HashSet::new(), 20.0, &SuppressProgress)
        .unwrap();
    let significance: f64 = builder.significance_threshold();
    for a in 0..matches.len() {
        for b in 0..matches.len() {
            assert_eq!(
                matrix.get(a, b) >= significance,
                matrix.get(b, a) >= significance,
                "cells ({a}, {b}) and ({b}, {a}) disagree"
            );
        }
    }
}

#[test]
fn cluster() {
    let matches = families(&[4, 4]);
    let params = ClusteringParams::builder().max_merge_distance(100.0).build();
    let result = SharedClustering::<f64>::new(params, &SuppressProgress)
        .cluster(&matches)
        .unwrap();

    assert_eq!(result.tree.roots().len(), 1);
    assert_eq!(result.primary_clusters.len(), 2);
    // First four matches form one cluster
    assert_eq!(1, numbers(&result, 0..4).len());
    // Next four are a second cluster
    assert_eq!(1, numbers(&result, 4..8).len());
    assert_ne!(result.cluster_number(0), result.cluster_number(4));
}

#[test]
fn whole_connected_tree_is_one_cluster_by_default() {
    let mut matches = families(&[4, 4]);
    // Match 0 links the two families
    matches[0] = clusterable(0, 100.0, 0..8);
    let result = SharedClustering::<f64>::default_params(&SuppressProgress)
        .cluster(&matches)
        .unwrap();
    let root = result.tree.roots()[0];
    assert!(!result.tree.cluster(root).unwrap().is_forced());
    assert_eq!(result.primary_clusters.len(), 1);
    assert_eq!(result.primary_clusters[0].number, 1);
}

#[test]
fn single_root_holds_every_leaf_exactly_once() {
    let matches = families(&[5, 3, 6, 4]);
    let result = SharedClustering::<f32>::default_params(&SuppressProgress)
        .cluster(&matches)
        .unwrap();

    assert_eq!(result.tree.roots().len(), 1);
    let mut indexes = result.ordered_match_indexes();
    assert_eq!(indexes.len(), matches.len());
    indexes.sort_unstable();
    assert_eq!(indexes, (0..matches.len()).collect::<Vec<_>>());
    let root = result.tree.roots()[0];
    assert_eq!(result.tree.leaf_count(root), matches.len());
}

#[test]
fn three_mutual_matches_form_one_root() {
    // 0 and 2 each list only 1, and 1 lists both; every row comes out the same
    let matches = vec![
        clusterable(0, 50.0, [1]),
        clusterable(1, 40.0, [0, 2]),
        clusterable(2, 30.0, [1]),
    ];
    let result = SharedClustering::<f64>::default_params(&SuppressProgress)
        .cluster(&matches)
        .unwrap();

    assert_eq!(result.tree.roots().len(), 1);
    let root = result.tree.roots()[0];
    assert_eq!(result.tree.leaf_count(root), 3);
    let root = result.tree.cluster(root).unwrap();
    assert_eq!(root.distance_squared(), 0.0);
    // With all distances equal, 0 and 1 merge first
    assert_eq!(result.tree.ordered_leaf_indexes(root.second()), vec![1, 0]);
    assert_eq!(result.ordered_match_indexes(), vec![2, 1, 0]);
    assert_eq!(result.primary_clusters.len(), 1);
}

#[test]
fn neighbour_goes_before_the_match_listing_it() {
    let matches = vec![clusterable(0, 50.0, [0, 1]), clusterable(1, 40.0, [0, 1])];
    let result = SharedClustering::<f64>::default_params(&SuppressProgress)
        .cluster(&matches)
        .unwrap();
    assert_eq!(result.ordered_match_indexes(), vec![1, 0]);
}

#[test]
fn primary_clusters_are_disjoint_and_large_enough() {
    let matches = families(&[5, 2, 6, 4]);
    let params = ClusteringParams::builder()
        .min_cluster_size(3)
        .max_merge_distance(1000.0)
        .build();
    let result = SharedClustering::<f64>::new(params, &SuppressProgress)
        .cluster(&matches)
        .unwrap();

    // The family of two is too small to form a cluster
    assert_eq!(result.primary_clusters.len(), 3);
    let mut seen = HashSet::new();
    for (i, cluster) in result.primary_clusters.iter().enumerate() {
        assert_eq!(cluster.number, i + 1);
        assert!(cluster.len() >= 3);
        for leaf in &cluster.leaves {
            assert!(seen.insert(*leaf), "leaf {leaf} is in two clusters");
        }
    }
    assert_eq!(result.cluster_number(5), None);
    assert_eq!(result.cluster_number(6), None);
    assert_eq!(result.cluster_numbers.len(), 15);
}

#[test]
fn clusters_are_numbered_in_tree_order() {
    let matches = families(&[4, 4, 4]);
    let params = ClusteringParams::builder().max_merge_distance(100.0).build();
    let result = SharedClustering::<f64>::new(params, &SuppressProgress)
        .cluster(&matches)
        .unwrap();
    let in_order: Vec<usize> = result
        .ordered_match_indexes()
        .into_iter()
        .filter_map(|index| result.cluster_number(index))
        .collect();
    let mut sorted = in_order.clone();
    sorted.sort_unstable();
    assert_eq!(in_order, sorted);
}

#[test]
fn overlap_weighted_metric() {
    let matches = families(&[4, 5]);
    let params = ClusteringParams::builder()
        .dist_metric(DistanceMetric::OverlapWeighted)
        .matrix_builder(MatrixBuilder::CountBased {
            direct_correlation_value: 2.0,
            indirect_correlation_value: 0.1,
        })
        .max_merge_distance(100.0)
        .build();
    let result = SharedClustering::<f64>::new(params, &SuppressProgress)
        .cluster(&matches)
        .unwrap();
    assert_eq!(result.primary_clusters.len(), 2);
    assert_eq!(1, numbers(&result, 0..4).len());
    assert_eq!(1, numbers(&result, 4..9).len());
}

#[test]
fn extension_admits_borderline_overlap() {
    let mut matches = families(&[10, 4]);
    // 4 of the 10 leaves of the first cluster, but only 4 of its 10 own shared matches
    matches.push(clusterable(14, 15.0, [0, 1, 2, 3, 14, 100, 101, 102, 103, 104]));
    // 3 of 10 clears neither fraction
    matches.push(clusterable(15, 14.0, [0, 1, 2, 15, 100, 101, 102, 103]));
    // Too weak even for extension
    matches.push(clusterable(16, 5.0, [0, 1, 2, 3, 4, 5, 16]));

    let params = ClusteringParams::builder()
        .min_centimorgans_to_cluster(10.0)
        .max_merge_distance(100.0)
        .build();
    let result = SharedClustering::<f64>::new(params, &SuppressProgress)
        .cluster(&matches)
        .unwrap();

    assert_eq!(result.primary_clusters.len(), 2);
    assert_eq!(result.cluster_number(14), result.cluster_number(0));
    assert_eq!(result.primary_clusters[0].len(), 11);
    assert_eq!(result.cluster_number(15), None);
    assert_eq!(result.cluster_number(16), None);
    assert_eq!(result.leaf_of(15), None);
}

#[test]
fn reclustering_keeps_original_leaves() {
    let mut matches = families(&[5, 4]);
    matches.push(clusterable(9, 12.0, [0, 1, 2, 9]));
    matches.push(clusterable(10, 11.0, [5, 6, 7, 8, 10]));
    let params = ClusteringParams::builder()
        .min_centimorgans_to_cluster(10.0)
        .max_merge_distance(100.0)
        .build();
    let unextended = SharedClustering::<f64>::new(
        ClusteringParams::builder().max_merge_distance(100.0).build(),
        &SuppressProgress,
    )
    .cluster(&matches)
    .unwrap();
    let result = SharedClustering::<f64>::new(params, &SuppressProgress)
        .cluster(&matches)
        .unwrap();

    // Leaves of the main pass keep their handles
    for index in 0..9 {
        assert_eq!(result.leaf_of(index), unextended.leaf_of(index));
    }
    let mut indexes = result.ordered_match_indexes();
    indexes.sort_unstable();
    assert_eq!(indexes, (0..11).collect::<Vec<_>>());
    assert_eq!(result.tree.roots().len(), 1);
    assert_eq!(result.cluster_number(9), result.cluster_number(0));
    assert_eq!(result.cluster_number(10), result.cluster_number(5));
    let root = result.tree.roots()[0];
    assert_eq!(result.tree.leaf_count(root), 11);
}

#[test]
fn correlated_clusters() {
    // Match 0 belongs with 1 to 3, but also shares 4 to 6 of the second family
    let mut matches = vec![clusterable(0, 100.0, 0..7)];
    for index in 1..4 {
        matches.push(clusterable(index, 90.0, 0..4));
    }
    for index in 4..7 {
        matches.push(clusterable(index, 80.0, [0, 4, 5, 6, 7]));
    }
    matches.push(clusterable(7, 70.0, 4..8));

    let params = ClusteringParams::builder().max_cluster_size(4).build();
    let result = SharedClustering::<f64>::new(params, &SuppressProgress)
        .cluster(&matches)
        .unwrap();

    assert_eq!(result.primary_clusters.len(), 2);
    let first = result.cluster_number(0).unwrap();
    let second = result.cluster_number(4).unwrap();
    assert_eq!(result.cluster_number(3), Some(first));
    assert_ne!(first, second);
    assert_eq!(result.correlated_clusters(0), vec![second]);
    assert!(result.correlated_clusters(1).is_empty());
    // Only one member of the first cluster is on the lists of the second
    assert!(result.correlated_clusters(4).is_empty());
    assert!(result.correlated_clusters(99).is_empty());
}

#[test]
fn immediate_family() {
    let mut matches = families(&[4, 4]);
    matches[0].record.shared_centimorgans = 1700.0;
    let result = SharedClustering::<f64>::default_params(&SuppressProgress)
        .cluster(&matches)
        .unwrap();
    assert_eq!(result.immediate_family, HashSet::from([0]));

    // Mostly close relatives: nobody is treated as immediate family
    let mut matches = families(&[3]);
    matches[0].record.shared_centimorgans = 900.0;
    matches[1].record.shared_centimorgans = 800.0;
    let result = SharedClustering::<f64>::default_params(&SuppressProgress)
        .cluster(&matches)
        .unwrap();
    assert!(result.immediate_family.is_empty());
}

#[test]
fn test_id_filter() {
    let matches = families(&[4, 4]);
    let params = ClusteringParams::builder()
        .test_ids_to_filter(["match-4", "match-5", "match-6", "match-7"])
        .build();
    let result = SharedClustering::<f64>::new(params, &SuppressProgress)
        .cluster(&matches)
        .unwrap();
    let mut indexes = result.ordered_match_indexes();
    indexes.sort_unstable();
    assert_eq!(indexes, vec![4, 5, 6, 7]);

    let params = ClusteringParams::builder()
        .test_ids_to_filter(["nobody"])
        .build();
    let result = SharedClustering::<f64>::new(params, &SuppressProgress).cluster(&matches);
    assert!(matches!(result, Err(ClusteringError::NoClusterableMatches(_))));
}

#[test]
fn empty_data() {
    let result = SharedClustering::<f64>::default_params(&SuppressProgress).cluster(&[]);
    assert!(matches!(result, Err(ClusteringError::EmptyDataset)));
}

#[test]
fn nothing_clusterable() {
    let matches = vec![
        clusterable(0, 15.0, [0, 1]),
        clusterable(1, 12.0, [0, 1]),
    ];
    let result = SharedClustering::<f64>::default_params(&SuppressProgress).cluster(&matches);
    match result {
        Err(ClusteringError::NoClusterableMatches(floor)) => assert_eq!(floor, 20.0),
        other => panic!("expected NoClusterableMatches, got {other:?}"),
    }
}

#[test]
fn duplicate_index() {
    let matches = vec![
        clusterable(0, 50.0, [0, 1]),
        clusterable(0, 40.0, [0, 1]),
    ];
    let result = SharedClustering::<f64>::default_params(&SuppressProgress).cluster(&matches);
    let err = result.unwrap_err();
    assert!(matches!(err, ClusteringError::DuplicateIndex(_)));
    assert!(err.is_input_error());
}

#[test]
fn params_from_json() {
    let params: ClusteringParams = serde_json::from_str(
        r#"{
            "min_cluster_size": 4,
            "min_centimorgans_to_cluster": 6.0,
            "dist_metric": "OverlapWeighted",
            "matrix_builder": {
                "CountBased": { "direct_correlation_value": 2.0, "indirect_correlation_value": 0.1 }
            }
        }"#,
    )
    .unwrap();
    assert_eq!(params.min_cluster_size(), 4);
    assert_eq!(params.min_centimorgans_to_cluster(), 6.0);
    assert_eq!(params.dist_metric(), DistanceMetric::OverlapWeighted);
    assert_eq!(
        params.matrix_builder(),
        MatrixBuilder::CountBased {
            direct_correlation_value: 2.0,
            indirect_correlation_value: 0.1
        }
    );
    // Unset values take the defaults
    assert_eq!(params.max_cluster_size(), ClusteringParams::default().max_cluster_size());
    assert_eq!(params.clusterable_floor(), 20.0);
}

#[test]
fn params_from_json_are_clamped_by_the_clusterer() {
    let params: ClusteringParams = serde_json::from_str(
        r#"{
            "min_cluster_size": 1,
            "matrix_builder": {
                "CountBased": { "direct_correlation_value": 0.0, "indirect_correlation_value": 0.1 }
            }
        }"#,
    )
    .unwrap();
    assert_eq!(params.min_cluster_size(), 1);

    let clusterer = SharedClustering::<f64>::new(params, &SuppressProgress);
    assert_eq!(clusterer.params().min_cluster_size(), 2);
    assert_eq!(
        clusterer.params().matrix_builder(),
        MatrixBuilder::CountBased {
            direct_correlation_value: 2.0,
            indirect_correlation_value: 0.1
        }
    );
    let result = clusterer.cluster(&families(&[3, 3])).unwrap();
    assert_eq!(result.ordered_match_indexes().len(), 6);
}

#[test]
fn matches_from_json() {
    let matches: Vec<ClusterableMatch> = serde_json::from_str(
        r#"[
            {
                "index": 0,
                "match": { "test_id": "a", "shared_centimorgans": 55.5 },
                "coords": [0, 1]
            },
            {
                "index": 1,
                "match": { "test_id": "b", "shared_centimorgans": 32.0 },
                "coords": [1, 0]
            }
        ]"#,
    )
    .unwrap();
    assert_eq!(matches[1].coords.iter().copied().collect::<Vec<_>>(), vec![0, 1]);
    assert_eq!(matches[0].record.test_id, "a");
    assert_eq!(matches[0].shared_centimorgans(), 55.5);
}

#[test]
fn progress_is_reported() {
    let progress = RecordingProgress::default();
    let matches = families(&[4, 4]);
    SharedClustering::<f64>::new(ClusteringParams::default(), &progress)
        .cluster(&matches)
        .unwrap();

    let labels = progress.labels.lock().unwrap();
    assert_eq!(labels.first().map(String::as_str), Some("Correlating data..."));
    assert!(labels.iter().any(|label| label.starts_with("Building clusters")));
    assert_eq!(labels.last().map(String::as_str), Some("Done"));
    // Two matrix passes per match, one neighbour list per leaf and seven merges
    assert!(progress.increments.load(Ordering::Relaxed) >= 16 + 8 + 7);
}

#[test]
fn cluster_and_write() {
    let matches = families(&[4, 4]);
    let params = ClusteringParams::builder().max_merge_distance(100.0).build();
    let clusterer = SharedClustering::<f64>::new(params, &SuppressProgress);
    let mut writer = TabSeparatedWriter::new(Vec::new());
    let result = clusterer.cluster_and_write(&matches, &mut writer).unwrap();

    let output = String::from_utf8(writer.into_inner()).unwrap();
    let lines: Vec<&str> = output.lines().collect();
    assert_eq!(lines.len(), 8);
    let first: Vec<&str> = lines[0].split('\t').collect();
    let index: usize = first[0].parse().unwrap();
    assert_eq!(first[1], result.cluster_number(index).unwrap().to_string());
    assert_eq!(first[2], format!("match-{index}"));
}

#[test]
fn writer_errors_are_reported() {
    let matches = families(&[4]);
    let result = SharedClustering::<f64>::default_params(&SuppressProgress)
        .cluster_and_write(&matches, &mut FailingWriter);
    assert!(matches!(result, Err(ClusteringError::Output(_))));
}

#[derive(Default)]
struct RecordingProgress {
    labels: Mutex<Vec<String>>,
    increments: AtomicUsize,
}

impl ProgressSink for RecordingProgress {
    fn reset(&self, label: &str, _total_steps: usize) {
        self.labels.lock().unwrap().push(label.to_string());
    }

    fn increment(&self) {
        self.increments.fetch_add(1, Ordering::Relaxed);
    }
}

struct FailingWriter;

impl CorrelationWriter<f64> for FailingWriter {
    type Error = std::io::Error;

    fn write(
        &mut self,
        _result: &ClusteringResult<f64>,
        _matches_by_index: &HashMap<usize, &ClusterableMatch>,
    ) -> Result<(), Self::Error> {
        Err(std::io::Error::new(std::io::ErrorKind::Other, "disk full"))
    }
}

fn clusterable(
    index: usize,
    shared_centimorgans: f64,
    coords: impl IntoIterator<Item = usize>,
) -> ClusterableMatch {
    let record = MatchRecord::new(format!("match-{index}"), shared_centimorgans);
    ClusterableMatch::new(index, record, coords)
}

fn refs(matches: &[ClusterableMatch]) -> Vec<&ClusterableMatch> {
    matches.iter().collect()
}

/// Consecutive groups of matches that each share exactly the members of their own group.
fn families(sizes: &[usize]) -> Vec<ClusterableMatch> {
    let mut matches = Vec::new();
    let mut start = 0;
    for &size in sizes {
        for index in start..start + size {
            matches.push(clusterable(index, 100.0 - index as f64, start..start + size));
        }
        start += size;
    }
    matches
}

fn numbers(
    result: &ClusteringResult<f64>,
    indexes: std::ops::Range<usize>,
) -> HashSet<Option<usize>> {
    indexes.map(|index| result.cluster_number(index)).collect()
}
