//! Semantic nearest-neighbor ranking over the vector store.
//!
//! Computes the Euclidean distance from the query vector to every matrix
//! row, keeps the `top_k` closest via partial selection, and drops anything
//! at or beyond the distance threshold. Candidates surviving the threshold
//! get a similarity score derived from the distance.

use serde::{Deserialize, Serialize};

use crate::search::round_to;
use crate::search::store::ProductStore;

/// A ranked candidate, shared by the semantic and fuzzy rankers.
///
/// For semantic matches `score` is the similarity percentage
/// (`100 / (1 + distance)`, 2 decimals) and `raw_metric` the distance
/// (4 decimals). For fuzzy matches `score` is the token-sort ratio rounded
/// to 2 decimals and `raw_metric` the unrounded ratio, both on 0-100.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedMatch {
    pub id: u64,
    pub code: String,
    pub description: String,
    pub score: f64,
    pub raw_metric: f64,
}

#[derive(Debug, thiserror::Error)]
pub enum RankError {
    #[error("query dimension mismatch: store has {expected}, query has {got}")]
    DimensionMismatch { expected: usize, got: usize },
}

/// Rank catalog entries by ascending Euclidean distance to `query`.
///
/// Returns at most `top_k` matches, all strictly under `max_distance`,
/// sorted by non-decreasing distance with ties broken by store order.
/// An empty store yields an empty result; a query whose dimensionality
/// differs from the store's is an error.
pub fn rank(
    query: &[f32],
    store: &ProductStore,
    top_k: usize,
    max_distance: f64,
) -> Result<Vec<RankedMatch>, RankError> {
    if store.is_empty() || top_k == 0 {
        return Ok(Vec::new());
    }
    if query.len() != store.dimensionality() {
        return Err(RankError::DimensionMismatch {
            expected: store.dimensionality(),
            got: query.len(),
        });
    }

    let mut distances: Vec<(usize, f64)> = (0..store.size())
        .map(|row| (row, l2_distance(query, store.row(row))))
        .collect();

    // Partial selection: only the top_k closest need ordering.
    let by_distance_then_row = |a: &(usize, f64), b: &(usize, f64)| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    };
    if distances.len() > top_k {
        distances.select_nth_unstable_by(top_k - 1, by_distance_then_row);
        distances.truncate(top_k);
    }
    distances.sort_by(by_distance_then_row);

    Ok(distances
        .into_iter()
        .filter(|&(_, distance)| distance < max_distance)
        .map(|(row, distance)| {
            let entry = store.entry(row);
            let similarity = 1.0 / (1.0 + distance);
            RankedMatch {
                id: entry.id,
                code: entry.code.clone(),
                description: entry.description.clone(),
                score: round_to(similarity * 100.0, 2),
                raw_metric: round_to(distance, 4),
            }
        })
        .collect())
}

/// Euclidean distance between the query and one matrix row.
fn l2_distance(query: &[f32], row: &[f32]) -> f64 {
    query
        .iter()
        .zip(row.iter())
        .map(|(q, v)| {
            let d = (q - v) as f64;
            d * d
        })
        .sum::<f64>()
        .sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::store::{CatalogEntry, EmbeddingRecord};

    fn store_of(vectors: Vec<Vec<f32>>) -> ProductStore {
        let records = vectors
            .into_iter()
            .enumerate()
            .map(|(i, vector)| EmbeddingRecord {
                entry: CatalogEntry {
                    id: i as u64 + 1,
                    code: format!("EAN{}", i + 1),
                    description: format!("product {}", i + 1),
                },
                vector,
            })
            .collect();
        ProductStore::from_records(records).unwrap()
    }

    #[test]
    fn test_empty_store_yields_empty_result() {
        let store = ProductStore::empty(3);
        let matches = rank(&[1.0, 0.0, 0.0], &store, 5, 1.0).unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn test_dimension_mismatch_is_error() {
        let store = store_of(vec![vec![1.0, 0.0, 0.0]]);
        let result = rank(&[1.0, 0.0], &store, 5, 1.0);
        assert!(matches!(
            result,
            Err(RankError::DimensionMismatch {
                expected: 3,
                got: 2
            })
        ));
    }

    #[test]
    fn test_sorted_by_ascending_distance() {
        let store = store_of(vec![
            vec![0.0, 0.9],
            vec![0.0, 0.1],
            vec![0.0, 0.5],
        ]);

        let matches = rank(&[0.0, 0.0], &store, 5, 1.0).unwrap();
        assert_eq!(matches.len(), 3);
        let ids: Vec<u64> = matches.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![2, 3, 1]);
        assert!(matches[0].raw_metric <= matches[1].raw_metric);
        assert!(matches[1].raw_metric <= matches[2].raw_metric);
    }

    #[test]
    fn test_threshold_excludes_distant_matches() {
        let store = store_of(vec![vec![0.5, 0.0], vec![2.0, 0.0]]);

        let matches = rank(&[0.0, 0.0], &store, 5, 1.0).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].id, 1);
    }

    #[test]
    fn test_distance_equal_to_threshold_is_excluded() {
        let store = store_of(vec![vec![1.0, 0.0]]);

        let matches = rank(&[0.0, 0.0], &store, 5, 1.0).unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn test_top_k_limits_results() {
        let store = store_of((0..10).map(|i| vec![i as f32 * 0.01, 0.0]).collect());

        let matches = rank(&[0.0, 0.0], &store, 3, 1.0).unwrap();
        assert_eq!(matches.len(), 3);
        let ids: Vec<u64> = matches.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_top_k_zero_yields_empty() {
        let store = store_of(vec![vec![0.0, 0.0]]);
        let matches = rank(&[0.0, 0.0], &store, 0, 1.0).unwrap();
        assert!(matches.is_empty());
    }

    #[test]
    fn test_ties_broken_by_store_order() {
        let store = store_of(vec![
            vec![0.5, 0.0],
            vec![-0.5, 0.0],
            vec![0.0, 0.5],
        ]);

        let matches = rank(&[0.0, 0.0], &store, 2, 1.0).unwrap();
        let ids: Vec<u64> = matches.iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn test_similarity_scoring_and_rounding() {
        // Distance 0.05 -> similarity 100/1.05 = 95.238... -> 95.24
        let store = store_of(vec![vec![1.05, 0.0]]);

        let matches = rank(&[1.0, 0.0], &store, 5, 1.0).unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].score, 95.24);
        assert_eq!(matches[0].raw_metric, 0.05);
    }

    #[test]
    fn test_never_returns_more_than_top_k_nor_over_threshold() {
        let store = store_of((0..50).map(|i| vec![i as f32 * 0.1, 0.0]).collect());

        for top_k in [1usize, 5, 20] {
            let matches = rank(&[0.0, 0.0], &store, top_k, 1.0).unwrap();
            assert!(matches.len() <= top_k);
            assert!(matches.iter().all(|m| m.raw_metric < 1.0));
        }
    }
}
