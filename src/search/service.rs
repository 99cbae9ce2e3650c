//! High-level search service.
//!
//! Composes input correction, query embedding, semantic ranking and the
//! fuzzy fallback into one query-in/result-out operation. Query-time
//! failures from the embedding provider or the rankers never escape this
//! boundary: the caller is typically an automated agent loop, and "no
//! match" and "search failed" must look identical to it.

use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::search::semantic::RankedMatch;
use crate::search::store::ProductStore;
use crate::search::{fuzzy, normalize, semantic, Embedder};

/// Outcome of one search call. Both match lists are always present;
/// `fuzzy_matches` is only populated when `semantic_matches` is empty.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// The query as received (trimmed).
    pub query_original: String,
    /// The query actually embedded, after vocabulary correction.
    pub query_used: String,
    /// Semantic candidates by ascending distance.
    pub semantic_matches: Vec<RankedMatch>,
    /// Lexical fallback candidates by descending score.
    pub fuzzy_matches: Vec<RankedMatch>,
}

/// Tuning knobs for the service.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Maximum candidates returned per query.
    pub top_k: usize,
    /// Maximum Euclidean distance for a plausible semantic match.
    pub max_distance: f64,
    /// Similarity cutoff for input correction.
    pub correction_cutoff: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            top_k: super::DEFAULT_TOP_K,
            max_distance: super::DEFAULT_MAX_DISTANCE,
            correction_cutoff: super::DEFAULT_CORRECTION_CUTOFF,
        }
    }
}

/// Product search over one published store.
///
/// The store reference lives behind a lock so an out-of-process index
/// rebuild can be swapped in atomically; searches clone the `Arc` once and
/// run against that snapshot, so a concurrent swap never exposes a
/// partially-built store.
pub struct SearchService {
    embedder: Box<dyn Embedder>,
    store: RwLock<Arc<ProductStore>>,
    options: SearchOptions,
}

impl SearchService {
    pub fn new(
        embedder: Box<dyn Embedder>,
        store: Arc<ProductStore>,
        options: SearchOptions,
    ) -> Self {
        Self {
            embedder,
            store: RwLock::new(store),
            options,
        }
    }

    /// Snapshot of the currently published store.
    pub fn store(&self) -> Arc<ProductStore> {
        self.store
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Publish a fully built replacement store.
    pub fn swap_store(&self, store: Arc<ProductStore>) {
        log::info!(
            "publishing rebuilt store: {} entries, {} dimensions",
            store.size(),
            store.dimensionality()
        );
        *self.store.write().unwrap_or_else(|e| e.into_inner()) = store;
    }

    /// Resolve a free-text product description to catalog candidates.
    ///
    /// Always returns a well-formed `SearchResult`; provider and ranking
    /// failures are logged and yield the empty result pair.
    pub fn search(&self, raw_query: &str) -> SearchResult {
        let store = self.store();

        let query_original = raw_query.trim().to_string();
        let query_used = normalize::correct(
            &query_original,
            store.descriptions(),
            self.options.correction_cutoff,
        );
        if query_used != query_original {
            log::info!("input corrected from {query_original:?} to {query_used:?}");
        }

        let mut result = SearchResult {
            query_original,
            query_used,
            semantic_matches: Vec::new(),
            fuzzy_matches: Vec::new(),
        };

        let query_vector = match self.embedder.embed_query(&result.query_used) {
            Ok(vector) => vector,
            Err(e) => {
                log::error!("embedding provider failed: {e}");
                return result;
            }
        };

        match semantic::rank(
            &query_vector,
            &store,
            self.options.top_k,
            self.options.max_distance,
        ) {
            Ok(matches) => result.semantic_matches = matches,
            Err(e) => {
                log::error!("semantic ranking failed: {e}");
                return result;
            }
        }

        if result.semantic_matches.is_empty() {
            log::info!(
                "no semantic match under distance {}, falling back to fuzzy matching",
                self.options.max_distance
            );
            result.fuzzy_matches = fuzzy::rank(&result.query_used, &store, self.options.top_k);
        } else {
            log::info!("found {} semantic matches", result.semantic_matches.len());
        }

        result
    }
}
