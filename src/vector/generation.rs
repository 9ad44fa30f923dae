//! Immutable index generations and exact nearest-neighbor search.
//!
//! A generation is built once, published behind an `Arc`, and never mutated.
//! Readers that hold an `Arc<Generation>` keep a consistent view even while a
//! rebuild publishes a replacement.

use crate::ProjectId;
use crate::vector::{VectorDimension, VectorError};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::cmp::Ordering;

/// Above this many entries the distance scan runs on the rayon pool.
const PARALLEL_SCAN_THRESHOLD: usize = 2048;

/// A single search hit: a position in the generation and its squared L2 distance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Neighbor {
    pub position: usize,
    pub distance: f32,
}

impl Neighbor {
    fn cmp_by_distance(&self, other: &Self) -> Ordering {
        self.distance
            .total_cmp(&other.distance)
            .then(self.position.cmp(&other.position))
    }
}

/// One atomically published snapshot of the vector index.
///
/// Vectors are stored in a single flat buffer; the entry at position `p`
/// occupies `vectors[p * dim..(p + 1) * dim]` and belongs to `ids[p]`.
#[derive(Debug, Clone)]
pub struct Generation {
    dimension: VectorDimension,
    ids: Vec<ProjectId>,
    vectors: Vec<f32>,
    built_at: DateTime<Utc>,
}

impl Generation {
    /// Create an empty generation.
    #[must_use]
    pub fn empty(dimension: VectorDimension) -> Self {
        Self {
            dimension,
            ids: Vec::new(),
            vectors: Vec::new(),
            built_at: Utc::now(),
        }
    }

    /// Assemble a generation from a position mapping and a flat vector buffer.
    ///
    /// Fails unless `vectors.len() == ids.len() * dimension`.
    pub fn from_parts(
        dimension: VectorDimension,
        ids: Vec<ProjectId>,
        vectors: Vec<f32>,
    ) -> Result<Self, VectorError> {
        if vectors.len() != ids.len() * dimension.get() {
            return Err(VectorError::InconsistentGeneration {
                vectors: vectors.len() / dimension.get(),
                ids: ids.len(),
            });
        }
        Ok(Self {
            dimension,
            ids,
            vectors,
            built_at: Utc::now(),
        })
    }

    /// Assemble a generation from `(id, vector)` pairs, validating each vector.
    pub fn from_entries(
        dimension: VectorDimension,
        entries: impl IntoIterator<Item = (ProjectId, Vec<f32>)>,
    ) -> Result<Self, VectorError> {
        let mut ids = Vec::new();
        let mut vectors = Vec::new();
        for (id, vector) in entries {
            dimension.validate_vector(&vector)?;
            ids.push(id);
            vectors.extend_from_slice(&vector);
        }
        Self::from_parts(dimension, ids, vectors)
    }

    pub(crate) fn with_built_at(mut self, built_at: DateTime<Utc>) -> Self {
        self.built_at = built_at;
        self
    }

    #[must_use]
    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    #[must_use]
    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    /// Project at `position`, or `None` if the position is out of range.
    #[must_use]
    pub fn project_id(&self, position: usize) -> Option<ProjectId> {
        self.ids.get(position).copied()
    }

    #[must_use]
    pub fn vector(&self, position: usize) -> Option<&[f32]> {
        let dim = self.dimension.get();
        self.vectors.get(position * dim..(position + 1) * dim)
    }

    pub fn ids(&self) -> &[ProjectId] {
        &self.ids
    }

    pub fn entries(&self) -> impl Iterator<Item = (ProjectId, &[f32])> {
        self.ids
            .iter()
            .copied()
            .zip(self.vectors.chunks_exact(self.dimension.get()))
    }

    /// Exact k-nearest-neighbor search by squared L2 distance.
    ///
    /// Results are sorted ascending by distance with ties broken by ascending
    /// position. An empty generation yields an empty result.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>, VectorError> {
        self.dimension.validate_vector(query)?;
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let dim = self.dimension.get();
        let distance_at = |(position, vector): (usize, &[f32])| Neighbor {
            position,
            distance: squared_l2(query, vector),
        };

        let mut neighbors: Vec<Neighbor> = if self.len() >= PARALLEL_SCAN_THRESHOLD {
            self.vectors
                .par_chunks_exact(dim)
                .enumerate()
                .map(distance_at)
                .collect()
        } else {
            self.vectors
                .chunks_exact(dim)
                .enumerate()
                .map(distance_at)
                .collect()
        };

        if k < neighbors.len() {
            neighbors.select_nth_unstable_by(k - 1, Neighbor::cmp_by_distance);
            neighbors.truncate(k);
        }
        neighbors.sort_unstable_by(Neighbor::cmp_by_distance);
        Ok(neighbors)
    }
}

/// Squared Euclidean distance between two equal-length vectors.
#[inline]
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = x - y;
            diff * diff
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(value: u32) -> ProjectId {
        ProjectId::new(value).unwrap()
    }

    fn dim(value: usize) -> VectorDimension {
        VectorDimension::new(value).unwrap()
    }

    #[test]
    fn test_from_parts_rejects_length_mismatch() {
        let result = Generation::from_parts(dim(2), vec![id(1), id(2)], vec![0.0, 1.0, 2.0]);
        assert!(matches!(
            result,
            Err(VectorError::InconsistentGeneration { ids: 2, .. })
        ));
    }

    #[test]
    fn test_search_sorted_by_distance() {
        let generation = Generation::from_entries(
            dim(2),
            vec![
                (id(1), vec![5.0, 5.0]),
                (id(2), vec![0.0, 0.0]),
                (id(3), vec![1.0, 0.0]),
                (id(4), vec![3.0, 0.0]),
            ],
        )
        .unwrap();

        let hits = generation.search(&[0.0, 0.0], 3).unwrap();
        let positions: Vec<usize> = hits.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![1, 2, 3]);
        assert_eq!(hits[0].distance, 0.0);
        assert_eq!(hits[1].distance, 1.0);
        assert_eq!(hits[2].distance, 9.0);
    }

    #[test]
    fn test_search_ties_break_by_position() {
        let generation = Generation::from_entries(
            dim(1),
            vec![(id(7), vec![1.0]), (id(8), vec![-1.0]), (id(9), vec![1.0])],
        )
        .unwrap();

        let hits = generation.search(&[0.0], 10).unwrap();
        let positions: Vec<usize> = hits.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);

        let top_two = generation.search(&[0.0], 2).unwrap();
        assert_eq!(
            top_two.iter().map(|n| n.position).collect::<Vec<_>>(),
            vec![0, 1]
        );
    }

    #[test]
    fn test_search_empty_generation() {
        let generation = Generation::empty(dim(3));
        assert!(generation.search(&[0.0, 0.0, 0.0], 5).unwrap().is_empty());
    }

    #[test]
    fn test_search_rejects_wrong_query_dimension() {
        let generation = Generation::from_entries(dim(2), vec![(id(1), vec![0.0, 0.0])]).unwrap();
        assert!(matches!(
            generation.search(&[0.0], 1),
            Err(VectorError::DimensionMismatch {
                expected: 2,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_parallel_scan_matches_sequential_order() {
        let count = PARALLEL_SCAN_THRESHOLD + 10;
        let entries = (0..count).map(|i| (id(i as u32 + 1), vec![i as f32, 0.0]));
        let generation = Generation::from_entries(dim(2), entries).unwrap();

        let hits = generation.search(&[100.0, 0.0], 5).unwrap();
        let positions: Vec<usize> = hits.iter().map(|n| n.position).collect();
        assert_eq!(positions, vec![100, 99, 101, 98, 102]);
        assert!(hits.windows(2).all(|w| w[0].distance <= w[1].distance));
    }

    #[test]
    fn test_vector_and_project_lookup() {
        let generation =
            Generation::from_entries(dim(2), vec![(id(4), vec![1.0, 2.0]), (id(5), vec![3.0, 4.0])])
                .unwrap();
        assert_eq!(generation.vector(1), Some(&[3.0, 4.0][..]));
        assert_eq!(generation.project_id(0), Some(id(4)));
        assert_eq!(generation.project_id(2), None);
        assert_eq!(generation.vector(2), None);
    }
}
