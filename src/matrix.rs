use crate::data_wrappers::{to_float, ClusterableMatch, SparseRow};
use crate::progress::ProgressSink;
use crate::ClusteringError;
use dashmap::DashMap;
use num_traits::Float;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

mod appearance_weighted;
mod count_based;

use appearance_weighted::AppearanceWeighted;
use count_based::CountBased;

/// The policy used to turn shared match lists into correlation weights.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MatrixBuilder {
    /// Weights are the fraction of shared match lists containing match A that also contain
    /// match B (0 to 1), plus 1 when A and B appear directly on each other's lists (1 to 2).
    /// Below 100, `max_indirect_percentage` discards the weakest indirect-only weights so that
    /// at most that percentage of the non-direct cells stay populated.
    AppearanceWeighted { max_indirect_percentage: f64 },
    /// Each shared list containing both A and B adds `indirect_correlation_value`, up to half
    /// of `direct_correlation_value`. Appearing directly sets the weight to
    /// `direct_correlation_value`.
    CountBased {
        direct_correlation_value: f64,
        indirect_correlation_value: f64,
    },
}

impl Default for MatrixBuilder {
    fn default() -> Self {
        MatrixBuilder::AppearanceWeighted {
            max_indirect_percentage: 100.0,
        }
    }
}

impl MatrixBuilder {
    /// Builds the correlation matrix for the given matches.
    ///
    /// # Parameters
    /// * `matches` - the matches to correlate.
    /// * `immediate_family` - indexes of the matches whose lists must not contribute indirect
    ///   weight.
    /// * `lowest_clusterable_centimorgans` - matches below this never appear on shared match
    ///   lists, so their rows and columns are not clustered.
    /// * `progress` - receives a step per match and pass.
    ///
    /// # Returns
    /// * The matrix, with rows `max_index + 1` wide where `max_index` is the largest index
    ///   referenced by a match at or above the clusterable threshold. An error if no match
    ///   reaches that threshold.
    pub fn correlate<T: Float + Send + Sync>(
        &self,
        matches: &[&ClusterableMatch],
        immediate_family: &HashSet<usize>,
        lowest_clusterable_centimorgans: f64,
        progress: &dyn ProgressSink,
    ) -> Result<CorrelationMatrix<T>, ClusteringError> {
        match *self {
            MatrixBuilder::AppearanceWeighted {
                max_indirect_percentage,
            } => AppearanceWeighted {
                max_indirect_percentage,
                lowest_clusterable_centimorgans,
                progress,
            }
            .correlate(matches, immediate_family),
            MatrixBuilder::CountBased {
                direct_correlation_value,
                indirect_correlation_value,
            } => CountBased {
                direct_correlation_value: to_float(direct_correlation_value),
                indirect_correlation_value: to_float(indirect_correlation_value),
                lowest_clusterable_centimorgans,
                progress,
            }
            .correlate(matches, immediate_family),
        }
    }

    /// Adds direct correlation rows for matches that were not part of the main pass,
    /// leaving every other row untouched. Rows keep the width of the existing matrix.
    pub fn extend_matrix<T: Float + Send + Sync>(
        &self,
        matrix: &CorrelationMatrix<T>,
        matches: &[ClusterableMatch],
    ) {
        for clusterable_match in matches {
            match *self {
                MatrixBuilder::AppearanceWeighted { .. } => {
                    appearance_weighted::extend_matrix_direct(matrix, clusterable_match, T::one())
                }
                MatrixBuilder::CountBased {
                    direct_correlation_value,
                    ..
                } => count_based::extend_matrix_direct(
                    matrix,
                    clusterable_match,
                    to_float(direct_correlation_value),
                ),
            }
        }
    }

    /// The lowest weight that only a direct correlation can produce.
    pub fn significance_threshold<T: Float>(&self) -> T {
        match *self {
            MatrixBuilder::AppearanceWeighted { .. } => T::one(),
            MatrixBuilder::CountBased {
                direct_correlation_value,
                ..
            } => to_float(direct_correlation_value),
        }
    }
}

/// A sparse correlation matrix: one dense row per correlated match index, every row the same
/// width. Rows are created on first use and can be updated from several threads at once.
#[derive(Debug)]
pub struct CorrelationMatrix<T> {
    rows: DashMap<usize, Vec<T>>,
    width: usize,
}

impl<T: Float + Send + Sync> CorrelationMatrix<T> {
    pub fn new(max_index: usize) -> Self {
        CorrelationMatrix {
            rows: DashMap::new(),
            width: max_index + 1,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn max_index(&self) -> usize {
        self.width - 1
    }

    /// The number of rows present.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains_row(&self, index: usize) -> bool {
        self.rows.contains_key(&index)
    }

    /// The weight at `(row, column)`, zero for absent rows or out of range columns.
    pub fn get(&self, row: usize, column: usize) -> T {
        self.rows
            .get(&row)
            .and_then(|cells| cells.get(column).copied())
            .unwrap_or_else(T::zero)
    }

    /// The nonzero cells of a row, if the row exists.
    pub fn row(&self, index: usize) -> Option<SparseRow<T>> {
        self.rows.get(&index).map(|cells| SparseRow::from_dense(cells.value()))
    }

    /// Row indexes in ascending order.
    pub fn indexes(&self) -> Vec<usize> {
        let mut indexes: Vec<usize> = self.rows.iter().map(|entry| *entry.key()).collect();
        indexes.sort_unstable();
        indexes
    }

    /// Runs `update` on a row, creating it zeroed if absent. The row stays locked for the
    /// duration of the call.
    pub(crate) fn update_row<F>(&self, index: usize, update: F)
    where
        F: FnOnce(&mut [T]),
    {
        let mut row = self
            .rows
            .entry(index)
            .or_insert_with(|| vec![T::zero(); self.width]);
        update(row.value_mut());
    }

    pub(crate) fn par_for_each_row_mut<F>(&self, update: F)
    where
        F: Fn(usize, &mut [T]) + Send + Sync,
    {
        self.rows.par_iter_mut().for_each(|mut entry| {
            let index = *entry.key();
            update(index, entry.value_mut());
        });
    }

    pub(crate) fn par_count_cells<P>(&self, predicate: P) -> usize
    where
        P: Fn(T) -> bool + Send + Sync,
    {
        self.rows
            .par_iter()
            .map(|entry| entry.value().iter().filter(|&&cell| predicate(cell)).count())
            .sum()
    }

    pub(crate) fn collect_cells<P>(&self, predicate: P) -> Vec<T>
    where
        P: Fn(T) -> bool + Send + Sync,
    {
        self.rows
            .par_iter()
            .flat_map_iter(|entry| {
                entry
                    .value()
                    .iter()
                    .copied()
                    .filter(|&cell| predicate(cell))
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

/// The largest index referenced by any of the matches, counting their own indexes.
fn max_referenced_index<'a, I>(matches: I) -> Option<usize>
where
    I: IntoIterator<Item = &'a ClusterableMatch>,
{
    matches
        .into_iter()
        .map(|clusterable_match| {
            clusterable_match
                .index
                .max(clusterable_match.max_coord().unwrap_or(0))
        })
        .max()
}
