use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::node::NodeId;

/// The details of one DNA match, as supplied by whatever loaded the matches.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MatchRecord {
    pub test_id: String,
    pub name: String,
    pub shared_centimorgans: f64,
    pub shared_segments: u32,
    pub longest_block: f64,
    pub common_ancestors: Vec<String>,
}

impl MatchRecord {
    pub fn new(test_id: impl Into<String>, shared_centimorgans: f64) -> Self {
        MatchRecord {
            test_id: test_id.into(),
            shared_centimorgans,
            ..Default::default()
        }
    }

    pub fn has_common_ancestors(&self) -> bool {
        !self.common_ancestors.is_empty()
    }
}

/// A match that can be clustered: a dense index, the underlying record, and the indexes of
/// the other matches appearing on its shared match list ("coords").
///
/// By convention the coords of a match include its own index, which is how the loaders
/// produce them; nothing here depends on it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterableMatch {
    pub index: usize,
    #[serde(rename = "match")]
    pub record: MatchRecord,
    pub coords: BTreeSet<usize>,
}

impl ClusterableMatch {
    pub fn new(index: usize, record: MatchRecord, coords: impl IntoIterator<Item = usize>) -> Self {
        ClusterableMatch {
            index,
            record,
            coords: coords.into_iter().collect(),
        }
    }

    pub fn shared_centimorgans(&self) -> f64 {
        self.record.shared_centimorgans
    }

    pub fn max_coord(&self) -> Option<usize> {
        self.coords.iter().next_back().copied()
    }

    /// Returns a copy of this match with additional shared matches merged into its coords.
    pub fn with_coords(&self, extra: impl IntoIterator<Item = usize>) -> Self {
        let mut coords = self.coords.clone();
        coords.extend(extra);
        ClusterableMatch {
            index: self.index,
            record: self.record.clone(),
            coords,
        }
    }
}

/// The nonzero cells of one correlation matrix row, ascending by coordinate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseRow<T> {
    entries: Vec<(usize, T)>,
}

impl<T: Float> SparseRow<T> {
    pub fn from_dense(row: &[T]) -> Self {
        let entries = row
            .iter()
            .enumerate()
            .filter(|(_, value)| **value != T::zero())
            .map(|(coord, value)| (coord, *value))
            .collect();
        SparseRow { entries }
    }

    /// Builds a row from arbitrary entries. Zero weights are dropped and later duplicates win.
    pub fn from_entries(entries: impl IntoIterator<Item = (usize, T)>) -> Self {
        let mut entries: Vec<(usize, T)> = entries.into_iter().collect();
        entries.sort_by_key(|(coord, _)| *coord);
        entries.reverse();
        entries.dedup_by_key(|(coord, _)| *coord);
        entries.reverse();
        entries.retain(|(_, value)| *value != T::zero());
        SparseRow { entries }
    }

    pub fn entries(&self) -> &[(usize, T)] {
        &self.entries
    }

    pub fn get(&self, coord: usize) -> T {
        self.entries
            .binary_search_by_key(&coord, |(c, _)| *c)
            .map(|pos| self.entries[pos].1)
            .unwrap_or_else(|_| T::zero())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A candidate merge partner of a leaf: the other leaf and the squared distance to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor<T> {
    pub node: NodeId,
    pub distance_squared: T,
}

pub(crate) fn to_float<T: Float>(value: f64) -> T {
    T::from(value).unwrap_or_else(T::nan)
}
