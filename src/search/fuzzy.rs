//! Lexical fallback ranking for queries the embedding space cannot place.
//!
//! Scores every catalog description against the query with a token-sort
//! ratio: both sides are lowercased, split on non-alphanumerics, their
//! tokens sorted and rejoined, then compared with an indel-normalized
//! similarity on a 0-100 scale. Token order is irrelevant, so
//! "red large shirt" and "large shirt red" score 100.
//!
//! Intentionally a linear scan. Catalogs are hundreds to low thousands of
//! entries and the fallback only runs when semantic search comes up empty.

use crate::search::round_to;
use crate::search::semantic::RankedMatch;
use crate::search::store::ProductStore;

/// Rank catalog entries by descending token-sort similarity to `query`.
///
/// Returns at most `top_k` matches sorted by non-increasing score, ties
/// broken by store order. An empty store yields an empty result.
pub fn rank(query: &str, store: &ProductStore, top_k: usize) -> Vec<RankedMatch> {
    let mut scored: Vec<(usize, f64)> = (0..store.size())
        .map(|row| (row, token_sort_ratio(query, &store.entry(row).description)))
        .collect();

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.truncate(top_k);

    scored
        .into_iter()
        .map(|(row, score)| {
            let entry = store.entry(row);
            RankedMatch {
                id: entry.id,
                code: entry.code.clone(),
                description: entry.description.clone(),
                score: round_to(score, 2),
                raw_metric: score,
            }
        })
        .collect()
}

/// Token-order-insensitive similarity ratio on a 0-100 scale.
pub fn token_sort_ratio(a: &str, b: &str) -> f64 {
    indel_ratio(&sort_tokens(a), &sort_tokens(b))
}

/// Lowercase, split on non-alphanumerics, sort the tokens, rejoin.
fn sort_tokens(s: &str) -> String {
    let mut tokens: Vec<String> = s
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

/// Indel-normalized similarity: `200 * lcs / (len_a + len_b)`, where lcs is
/// the longest common subsequence length. 100.0 for two empty strings.
fn indel_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let total = a.len() + b.len();
    if total == 0 {
        return 100.0;
    }

    200.0 * lcs_length(&a, &b) as f64 / total as f64
}

/// Longest common subsequence length, two-row dynamic programming.
fn lcs_length(a: &[char], b: &[char]) -> usize {
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];

    for &ca in a {
        for (j, &cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
