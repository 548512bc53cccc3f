use crate::data_wrappers::SparseRow;
use num_traits::Float;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Possible distance metrics that can be used when calculating the distances between the
/// correlation rows of two matches.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Squared Euclidean distance over the union of both rows' coordinates. Every direct
    /// coordinate seeds the neighbour search.
    EuclideanSquared,
    /// Squared Euclidean distance divided by the number of direct coordinates the two rows
    /// share. Immediate family coordinates neither count towards the overlap nor seed the
    /// neighbour search, which suits trees containing very close relatives.
    OverlapWeighted,
}

/// A distance metric bound to the matrix it measures: the weight at which a cell counts as a
/// direct correlation, and the immediate family indexes to ignore.
#[derive(Debug, Clone, PartialEq)]
pub struct Distance<T> {
    metric: DistanceMetric,
    significance: T,
    excluded: HashSet<usize>,
}

impl<T: Float> Distance<T> {
    pub fn new(
        metric: DistanceMetric,
        significance: T,
        immediate_family: impl IntoIterator<Item = usize>,
    ) -> Self {
        Distance {
            metric,
            significance,
            excluded: immediate_family.into_iter().collect(),
        }
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn significance(&self) -> T {
        self.significance
    }

    /// The squared distance between two rows. Symmetric and non-negative.
    pub fn calc_dist(&self, a: &SparseRow<T>, b: &SparseRow<T>) -> T {
        match self.metric {
            DistanceMetric::EuclideanSquared => euclidean_distance_squared(a, b),
            DistanceMetric::OverlapWeighted => {
                let dist = euclidean_distance_squared(a, b);
                let overlap = self.count_overlap(a, b);
                if overlap > 1 {
                    dist / T::from(overlap).unwrap_or_else(T::one)
                } else {
                    dist
                }
            }
        }
    }

    /// The coordinates of a row strong enough to seed the neighbour search.
    pub fn significant_coords<'r>(
        &'r self,
        row: &'r SparseRow<T>,
    ) -> impl Iterator<Item = usize> + 'r {
        row.entries()
            .iter()
            .filter(move |(coord, value)| *value >= self.significance && self.includes(*coord))
            .map(|(coord, _)| *coord)
    }

    fn includes(&self, coord: usize) -> bool {
        match self.metric {
            DistanceMetric::EuclideanSquared => true,
            DistanceMetric::OverlapWeighted => !self.excluded.contains(&coord),
        }
    }

    fn count_overlap(&self, a: &SparseRow<T>, b: &SparseRow<T>) -> usize {
        merge_join(a, b)
            .filter(|(coord, x, y)| {
                *x >= self.significance && *y >= self.significance && self.includes(*coord)
            })
            .count()
    }
}

pub(crate) fn euclidean_distance_squared<T: Float>(a: &SparseRow<T>, b: &SparseRow<T>) -> T {
    merge_join(a, b)
        .map(|(_, x, y)| (x - y) * (x - y))
        .fold(T::zero(), std::ops::Add::add)
}

/// Walks the union of two rows' coordinates in order, yielding zero for a missing cell.
fn merge_join<'r, T: Float>(
    a: &'r SparseRow<T>,
    b: &'r SparseRow<T>,
) -> impl Iterator<Item = (usize, T, T)> + 'r {
    let (a, b) = (a.entries(), b.entries());
    let (mut i, mut j) = (0, 0);
    std::iter::from_fn(move || match (a.get(i), b.get(j)) {
        (Some(&(ca, va)), Some(&(cb, vb))) => {
            if ca == cb {
                i += 1;
                j += 1;
                Some((ca, va, vb))
            } else if ca < cb {
                i += 1;
                Some((ca, va, T::zero()))
            } else {
                j += 1;
                Some((cb, T::zero(), vb))
            }
        }
        (Some(&(ca, va)), None) => {
            i += 1;
            Some((ca, va, T::zero()))
        }
        (None, Some(&(cb, vb))) => {
            j += 1;
            Some((cb, T::zero(), vb))
        }
        (None, None) => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(entries: &[(usize, f64)]) -> SparseRow<f64> {
        SparseRow::from_entries(entries.iter().copied())
    }

    #[test]
    fn euclidean_covers_union_of_coordinates() {
        let a = row(&[(0, 2.0), (1, 1.0)]);
        let b = row(&[(1, 2.0), (3, 0.5)]);
        // (2-0)^2 + (1-2)^2 + (0-0.5)^2
        assert_eq!(euclidean_distance_squared(&a, &b), 5.25);
        assert_eq!(euclidean_distance_squared(&b, &a), 5.25);
        assert_eq!(euclidean_distance_squared(&a, &a), 0.0);
    }

    #[test]
    fn overlap_weighted_divides_by_shared_direct_coords() {
        let distance = Distance::new(DistanceMetric::OverlapWeighted, 1.0, [9]);
        let a = row(&[(0, 2.0), (1, 1.0), (2, 1.0), (9, 1.0)]);
        let b = row(&[(1, 2.0), (2, 1.5), (9, 1.0)]);
        // Raw distance 4 + 1 + 0.25 = 5.25, overlap on 1 and 2 only (9 is family)
        assert_eq!(distance.calc_dist(&a, &b), 2.625);
    }

    #[test]
    fn significant_coords_skip_weak_and_family_cells() {
        let a = row(&[(0, 2.0), (1, 0.5), (4, 1.0), (9, 1.5)]);
        let euclidean = Distance::new(DistanceMetric::EuclideanSquared, 1.0, [9]);
        assert_eq!(euclidean.significant_coords(&a).collect::<Vec<_>>(), vec![0, 4, 9]);
        let overlap = Distance::new(DistanceMetric::OverlapWeighted, 1.0, [9]);
        assert_eq!(overlap.significant_coords(&a).collect::<Vec<_>>(), vec![0, 4]);
    }
}
