use super::{max_referenced_index, CorrelationMatrix};
use crate::data_wrappers::ClusterableMatch;
use crate::progress::ProgressSink;
use crate::ClusteringError;
use num_traits::Float;
use rayon::prelude::*;
use std::collections::HashSet;

pub(super) struct CountBased<'a, T> {
    pub(super) direct_correlation_value: T,
    pub(super) indirect_correlation_value: T,
    pub(super) lowest_clusterable_centimorgans: f64,
    pub(super) progress: &'a dyn ProgressSink,
}

impl<'a, T: Float + Send + Sync> CountBased<'a, T> {
    pub(super) fn correlate(
        &self,
        matches: &[&ClusterableMatch],
        immediate_family: &HashSet<usize>,
    ) -> Result<CorrelationMatrix<T>, ClusteringError> {
        self.progress.reset("Correlating data...", matches.len() * 2);

        // Immediate family lists contribute direct correlations only
        let (family, others): (Vec<&ClusterableMatch>, Vec<&ClusterableMatch>) = matches
            .iter()
            .copied()
            .partition(|m| immediate_family.contains(&m.index));

        // Family rows are sized in too, whatever their index
        let max_index = max_referenced_index(
            matches
                .iter()
                .copied()
                .filter(|m| m.shared_centimorgans() >= self.lowest_clusterable_centimorgans),
        )
        .ok_or(ClusteringError::NoClusterableMatches(
            self.lowest_clusterable_centimorgans,
        ))?;

        let matrix = CorrelationMatrix::new(max_index);

        family.par_iter().for_each(|m| {
            if m.index <= max_index {
                extend_matrix_direct(&matrix, m, self.direct_correlation_value);
            }
            self.progress.increment();
            self.progress.increment();
        });

        others.par_iter().for_each(|m| {
            self.extend_matrix_indirect(&matrix, m);
            self.progress.increment();
        });

        // An indirect correlation never outweighs half of a direct one
        let max_indirect = self.direct_correlation_value / (T::one() + T::one());
        matrix.par_for_each_row_mut(|_, row| {
            for cell in row.iter_mut() {
                *cell = cell.min(max_indirect);
            }
        });

        // Direct values are (re)applied last so that the cap above never touches them
        matches.par_iter().for_each(|m| {
            if m.index <= max_index {
                extend_matrix_direct(&matrix, m, self.direct_correlation_value);
            }
        });
        others.par_iter().for_each(|_| self.progress.increment());

        tracing::debug!(
            rows = matrix.len(),
            width = matrix.width(),
            family = family.len(),
            "count based matrix built"
        );
        self.progress.done();
        Ok(matrix)
    }

    /// Each shared match list containing both A and B adds the indirect value to `row(A)[B]`.
    /// The owner of the list only counts towards its own diagonal.
    fn extend_matrix_indirect(
        &self,
        matrix: &CorrelationMatrix<T>,
        clusterable_match: &ClusterableMatch,
    ) {
        let own_index = clusterable_match.index;
        for coord1 in clusterable_match.coords.iter().copied() {
            if coord1 > matrix.max_index() {
                continue;
            }
            matrix.update_row(coord1, |row| {
                if coord1 == own_index {
                    row[coord1] = row[coord1] + self.indirect_correlation_value;
                } else {
                    for coord2 in clusterable_match.coords.range(..row.len()) {
                        if *coord2 != own_index {
                            row[*coord2] = row[*coord2] + self.indirect_correlation_value;
                        }
                    }
                }
            });
        }
    }
}

/// Match B appearing on the shared match list of match A sets `row(A)[B]` to the direct value.
pub(super) fn extend_matrix_direct<T: Float + Send + Sync>(
    matrix: &CorrelationMatrix<T>,
    clusterable_match: &ClusterableMatch,
    direct_correlation_value: T,
) {
    matrix.update_row(clusterable_match.index, |row| {
        for coord2 in clusterable_match.coords.range(..row.len()) {
            row[*coord2] = direct_correlation_value;
        }
    });
}
