//! Exact nearest-neighbor index over embedding rows.

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::Embedding;
use crate::error::{EmbeddingError, Result};
use crate::similarity::squared_euclidean;

/// A search hit: the row ordinal and its squared euclidean distance to the
/// query.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Neighbor {
    /// Row position in the index, in insertion order.
    pub row: usize,

    /// Squared euclidean distance to the query.
    pub distance: f32,
}

/// An immutable index for exhaustive vector lookups.
///
/// Rows are stored in one contiguous buffer in insertion order, so row `i`
/// always corresponds to the `i`-th vector passed to [`VectorIndex::build`].
/// Search compares the query against every row; there is no approximate
/// structure, so recall is always 100%.
#[derive(Debug, Clone, Default)]
pub struct VectorIndex {
    /// Row-major storage, `rows * dimension` values.
    data: Vec<f32>,

    /// Shared dimension of every row. Zero for the empty index.
    dimension: usize,

    /// Number of rows.
    rows: usize,
}

impl VectorIndex {
    /// The empty index. Searching it always yields no results.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build an index from equal-length vectors.
    ///
    /// An empty input gives the empty index. Vectors of differing lengths, or
    /// zero-length vectors, are rejected with `DimensionMismatch`.
    pub fn build(vectors: Vec<Embedding>) -> Result<Self> {
        let Some(first) = vectors.first() else {
            return Ok(Self::empty());
        };

        let dimension = first.len();
        if dimension == 0 {
            return Err(EmbeddingError::DimensionMismatch {
                expected: 1,
                actual: 0,
            });
        }

        let rows = vectors.len();
        let mut data = Vec::with_capacity(rows * dimension);
        for vector in vectors {
            if vector.len() != dimension {
                return Err(EmbeddingError::DimensionMismatch {
                    expected: dimension,
                    actual: vector.len(),
                });
            }
            data.extend(vector);
        }

        debug!("Built vector index with {rows} rows of dimension {dimension}");

        Ok(Self {
            data,
            dimension,
            rows,
        })
    }

    /// Get the number of rows in the index.
    pub fn len(&self) -> usize {
        self.rows
    }

    /// Check if the index is empty.
    pub fn is_empty(&self) -> bool {
        self.rows == 0
    }

    /// Dimension of the indexed vectors, or `None` for the empty index.
    pub fn dimension(&self) -> Option<usize> {
        (self.rows > 0).then_some(self.dimension)
    }

    /// Get a row by ordinal.
    pub fn row(&self, row: usize) -> Option<&[f32]> {
        if row >= self.rows {
            return None;
        }
        let start = row * self.dimension;
        self.data.get(start..start + self.dimension)
    }

    /// Search for the `k` rows closest to `query`.
    ///
    /// Results are ordered by ascending squared distance, ties broken by the
    /// smaller row ordinal. At most `min(k, len())` results are returned.
    /// Searching the empty index returns no results regardless of the query.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<Neighbor>> {
        if self.is_empty() {
            return Ok(Vec::new());
        }

        if query.len() != self.dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: self.dimension,
                actual: query.len(),
            });
        }

        if k == 0 {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(OrderedFloat<f32>, usize)> = Vec::with_capacity(self.rows);
        for (row, values) in self.data.chunks_exact(self.dimension).enumerate() {
            let distance = squared_euclidean(query, values)?;
            scored.push((OrderedFloat(distance), row));
        }

        let k = k.min(self.rows);
        if k < scored.len() {
            scored.select_nth_unstable(k - 1);
            scored.truncate(k);
        }
        // Tuples order by distance first, then by row.
        scored.sort_unstable();

        Ok(scored
            .into_iter()
            .map(|(distance, row)| Neighbor {
                row,
                distance: distance.0,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn rows(hits: &[Neighbor]) -> Vec<usize> {
        hits.iter().map(|n| n.row).collect()
    }

    #[test]
    fn test_build_empty() {
        let index = VectorIndex::build(Vec::new()).unwrap();
        assert!(index.is_empty());
        assert_eq!(index.dimension(), None);
        assert!(index.search(&[1.0, 2.0], 3).unwrap().is_empty());
    }

    #[test]
    fn test_index_search() {
        let index = VectorIndex::build(vec![
            vec![1.0, 0.0, 0.0],
            vec![0.0, 1.0, 0.0],
            vec![0.7, 0.7, 0.0],
        ])
        .unwrap();

        let results = index.search(&[1.0, 0.0, 0.0], 2).unwrap();

        assert_eq!(rows(&results), vec![0, 2]);
        assert!(results[0].distance.abs() < 1e-6);
    }

    #[test]
    fn test_exact_match_ranks_first() {
        let vectors: Vec<Embedding> = (0..16)
            .map(|i| vec![i as f32 * 10.0, (i % 4) as f32 * 3.0, -(i as f32)])
            .collect();
        let index = VectorIndex::build(vectors.clone()).unwrap();

        for (i, v) in vectors.iter().enumerate() {
            let hits = index.search(v, 3).unwrap();
            assert_eq!(hits[0].row, i);
            assert!(hits[0].distance.abs() < 1e-6);
        }
    }

    #[test]
    fn test_ties_break_by_row() {
        let index = VectorIndex::build(vec![
            vec![0.0, 1.0],
            vec![1.0, 0.0],
            vec![0.0, -1.0],
            vec![-1.0, 0.0],
        ])
        .unwrap();

        let results = index.search(&[0.0, 0.0], 4).unwrap();
        assert_eq!(rows(&results), vec![0, 1, 2, 3]);

        let results = index.search(&[0.0, 0.0], 2).unwrap();
        assert_eq!(rows(&results), vec![0, 1]);
    }

    #[test]
    fn test_k_clamped_to_row_count() {
        let index = VectorIndex::build(vec![vec![1.0], vec![2.0]]).unwrap();
        assert_eq!(index.search(&[0.0], 10).unwrap().len(), 2);
        assert!(index.search(&[0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_build_dimension_mismatch() {
        let err = VectorIndex::build(vec![vec![1.0, 0.0], vec![1.0]]).unwrap_err();
        assert!(matches!(
            err,
            EmbeddingError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        ));
    }

    #[test]
    fn test_query_dimension_mismatch() {
        let index = VectorIndex::build(vec![vec![1.0, 0.0, 0.0]]).unwrap();
        let result = index.search(&[1.0, 0.0], 1);
        assert!(matches!(
            result,
            Err(EmbeddingError::DimensionMismatch {
                expected: 3,
                actual: 2
            })
        ));

        assert!(matches!(
            index.search(&[1.0], 0),
            Err(EmbeddingError::DimensionMismatch { .. })
        ));
        assert!(index.search(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn test_row_lookup() {
        let index = VectorIndex::build(vec![vec![1.0, 2.0], vec![3.0, 4.0]]).unwrap();
        assert_eq!(index.row(1), Some(&[3.0, 4.0][..]));
        assert_eq!(index.row(2), None);
    }
}
