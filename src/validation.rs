use crate::data_wrappers::ClusterableMatch;
use crate::ClusteringError;
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct DataValidator<'a> {
    matches: &'a [ClusterableMatch],
}

impl<'a> DataValidator<'a> {
    pub(crate) fn new(matches: &'a [ClusterableMatch]) -> Self {
        Self { matches }
    }

    pub(crate) fn validate_input_data(&self) -> Result<(), ClusteringError> {
        if self.matches.is_empty() {
            return Err(ClusteringError::EmptyDataset);
        }
        let mut seen = HashSet::with_capacity(self.matches.len());
        for clusterable_match in self.matches {
            if !seen.insert(clusterable_match.index) {
                return Err(ClusteringError::DuplicateIndex(format!(
                    "index {} is used by more than one match (test id {})",
                    clusterable_match.index, clusterable_match.record.test_id
                )));
            }
            if !clusterable_match.shared_centimorgans().is_finite() {
                return Err(ClusteringError::NonFiniteCentimorgans(format!(
                    "match {} (test id {}) shares {} cM",
                    clusterable_match.index,
                    clusterable_match.record.test_id,
                    clusterable_match.shared_centimorgans()
                )));
            }
        }
        self.warn_dangling_coords(&seen);
        Ok(())
    }

    /// Coordinates naming no supplied match are tolerated; they only ever add columns.
    fn warn_dangling_coords(&self, indexes: &HashSet<usize>) {
        let n_dangling = self
            .matches
            .iter()
            .flat_map(|m| m.coords.iter())
            .filter(|coord| !indexes.contains(coord))
            .count();
        if n_dangling > 0 {
            tracing::warn!(n_dangling, "shared match lists reference unknown match indexes");
        }
    }
}
