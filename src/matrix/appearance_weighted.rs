use super::{max_referenced_index, CorrelationMatrix};
use crate::data_wrappers::{to_float, ClusterableMatch};
use crate::progress::ProgressSink;
use crate::ClusteringError;
use num_traits::Float;
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

pub(super) struct AppearanceWeighted<'a> {
    pub(super) max_indirect_percentage: f64,
    pub(super) lowest_clusterable_centimorgans: f64,
    pub(super) progress: &'a dyn ProgressSink,
}

impl<'a> AppearanceWeighted<'a> {
    pub(super) fn correlate<T: Float + Send + Sync>(
        &self,
        matches: &[&ClusterableMatch],
        immediate_family: &HashSet<usize>,
    ) -> Result<CorrelationMatrix<T>, ClusteringError> {
        self.progress.reset("Correlating data...", matches.len() * 2);

        let match_indexes: HashSet<usize> = matches.iter().map(|m| m.index).collect();

        // Every match appears at least once, in its own list
        let mut appearances: HashMap<usize, usize> = HashMap::new();
        for coord in matches.iter().flat_map(|m| m.coords.iter()) {
            if match_indexes.contains(coord) {
                *appearances.entry(*coord).or_insert(0) += 1;
            }
        }

        let clusterable: Vec<&ClusterableMatch> = matches
            .iter()
            .copied()
            .filter(|m| m.shared_centimorgans() >= self.lowest_clusterable_centimorgans)
            .collect();
        let max_index = max_referenced_index(clusterable.iter().copied()).ok_or(
            ClusteringError::NoClusterableMatches(self.lowest_clusterable_centimorgans),
        )?;
        let clusterable_indexes: HashSet<usize> = clusterable.iter().map(|m| m.index).collect();

        let matrix = CorrelationMatrix::new(max_index);

        matches.par_iter().for_each(|m| {
            if m.index <= max_index {
                extend_matrix_direct(&matrix, m, T::one());
            }
            self.progress.increment();
        });

        // Immediate family lists only top up cells that are already direct
        matches.par_iter().for_each(|m| {
            let only_if_direct = immediate_family.contains(&m.index);
            extend_matrix_indirect(&matrix, m, &appearances, only_if_direct);
            self.progress.increment();
        });

        remove_filtered_coords(&matrix, &clusterable_indexes);
        self.reduce_indirect_coords(&matrix, clusterable_indexes.len());

        tracing::debug!(
            rows = matrix.len(),
            width = matrix.width(),
            "appearance weighted matrix built"
        );
        self.progress.done();
        Ok(matrix)
    }

    fn reduce_indirect_coords<T: Float + Send + Sync>(
        &self,
        matrix: &CorrelationMatrix<T>,
        n_clusterable: usize,
    ) {
        if self.max_indirect_percentage >= 100.0 {
            return;
        }

        let one = T::one();
        let total_coords = n_clusterable * matrix.len();
        let n_direct = matrix.par_count_cells(|cell| cell >= one);
        let n_indirect = matrix.par_count_cells(|cell| is_indirect(cell));
        let max_allowed =
            (total_coords.saturating_sub(n_direct) as f64 * self.max_indirect_percentage / 100.0)
                as usize;

        if n_indirect <= max_allowed {
            return;
        }

        let min_allowed = if max_allowed == 0 {
            one
        } else {
            let mut indirect = matrix.collect_cells(|cell| is_indirect(cell));
            nth_largest(&mut indirect, max_allowed)
        };
        tracing::debug!(n_indirect, max_allowed, "discarding weakest indirect correlations");

        matrix.par_for_each_row_mut(|_, row| {
            for cell in row.iter_mut() {
                if *cell < min_allowed {
                    *cell = T::zero();
                }
            }
        });
    }
}

/// Match A appearing on the shared match list of match C adds `1 / appearances(A)` to the
/// cell of every other match B on that list. If A appears on 4 lists and B is on 3 of them,
/// `row(A)[B]` ends up at 0.75.
fn extend_matrix_indirect<T: Float + Send + Sync>(
    matrix: &CorrelationMatrix<T>,
    clusterable_match: &ClusterableMatch,
    appearances: &HashMap<usize, usize>,
    only_if_direct: bool,
) {
    let one = T::one();
    for coord1 in clusterable_match.coords.iter() {
        let Some(&n_appearances) = appearances.get(coord1) else {
            continue;
        };
        let increment = one / to_float::<T>(n_appearances as f64);
        matrix.update_row(*coord1, |row| {
            for coord2 in clusterable_match.coords.range(..row.len()) {
                if !only_if_direct || row[*coord2] >= one {
                    row[*coord2] = row[*coord2] + increment;
                }
            }
        });
    }
}

/// Match B appearing on the shared match list of match A adds `increment` to `row(A)[B]`.
pub(super) fn extend_matrix_direct<T: Float + Send + Sync>(
    matrix: &CorrelationMatrix<T>,
    clusterable_match: &ClusterableMatch,
    increment: T,
) {
    matrix.update_row(clusterable_match.index, |row| {
        for coord2 in clusterable_match.coords.range(..row.len()) {
            row[*coord2] = row[*coord2] + increment;
        }
    });
}

/// Matches below the clusterable threshold never appear on shared match lists, so neither
/// their rows nor their columns carry usable signal.
fn remove_filtered_coords<T: Float + Send + Sync>(
    matrix: &CorrelationMatrix<T>,
    clusterable_indexes: &HashSet<usize>,
) {
    matrix.par_for_each_row_mut(|index, row| {
        let keep_row = clusterable_indexes.contains(&index);
        for (coord, cell) in row.iter_mut().enumerate() {
            if !keep_row || !clusterable_indexes.contains(&coord) {
                *cell = T::zero();
            }
        }
    });
}

fn is_indirect<T: Float>(cell: T) -> bool {
    cell > T::zero() && cell < T::one()
}

/// The `n`th largest value (1-based), reordering `values` in the process.
fn nth_largest<T: Float>(values: &mut [T], n: usize) -> T {
    let position = n.min(values.len()) - 1;
    let (_, nth, _) = values.select_nth_unstable_by(position, |a, b| {
        b.partial_cmp(a).unwrap_or(Ordering::Equal)
    });
    *nth
}
