//! In-memory vector store over the product catalog.
//!
//! Holds every catalog entry alongside a dense row-major f32 matrix of
//! embeddings, so distance computation is a single pass over contiguous
//! memory. Built once at startup and read-only afterward.

use serde::{Deserialize, Serialize};

/// A product catalog entry. Identity is `id`; `code` is the external
/// product code (e.g. EAN) and `description` is free text up to ~4000 chars.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: u64,
    pub code: String,
    pub description: String,
}

/// A catalog entry paired with its embedding vector.
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingRecord {
    pub entry: CatalogEntry,
    pub vector: Vec<f32>,
}

/// Errors raised while building a store or loading one from disk.
///
/// All of these are fatal at startup: a store is either fully usable or
/// not constructed at all.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store contains no entries")]
    EmptyStore,

    #[error("invalid file format: {0}")]
    InvalidFormat(String),

    #[error("version mismatch: file version {0}, supported version {1}")]
    VersionMismatch(u8, u8),

    #[error("checksum mismatch: file may be corrupted")]
    ChecksumMismatch,

    #[error("model mismatch: index was built with a different embedding model")]
    ModelMismatch,

    #[error("inconsistent vector length for entry {id}: expected {expected}, got {got}")]
    InconsistentDimensions {
        id: u64,
        expected: usize,
        got: usize,
    },
}

/// Immutable in-memory vector store.
///
/// Row `i` of the matrix is the embedding of `entries()[i]`; the two run
/// strictly in parallel. Safe to share across threads once constructed.
#[derive(Debug)]
pub struct ProductStore {
    entries: Vec<CatalogEntry>,
    /// Row-major, `entries.len() * dimensions` values.
    matrix: Vec<f32>,
    dimensions: usize,
}

impl ProductStore {
    /// Create a store with no entries.
    ///
    /// Searching an empty store yields empty results rather than an error,
    /// so callers can bring a service up before the first index build.
    pub fn empty(dimensions: usize) -> Self {
        Self {
            entries: Vec::new(),
            matrix: Vec::new(),
            dimensions,
        }
    }

    /// Build a store from embedding records.
    ///
    /// Fails if the record list is empty or any vector length differs from
    /// the first record's.
    pub fn from_records(records: Vec<EmbeddingRecord>) -> Result<Self, LoadError> {
        let first = records.first().ok_or(LoadError::EmptyStore)?;
        let dimensions = first.vector.len();
        if dimensions == 0 {
            return Err(LoadError::InvalidFormat(
                "zero-dimensional embedding vectors".to_string(),
            ));
        }

        let mut entries = Vec::with_capacity(records.len());
        let mut matrix = Vec::with_capacity(records.len() * dimensions);

        for record in records {
            if record.vector.len() != dimensions {
                return Err(LoadError::InconsistentDimensions {
                    id: record.entry.id,
                    expected: dimensions,
                    got: record.vector.len(),
                });
            }
            entries.push(record.entry);
            matrix.extend_from_slice(&record.vector);
        }

        Ok(Self {
            entries,
            matrix,
            dimensions,
        })
    }

    /// Number of catalog entries in the store.
    pub fn size(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Embedding dimensionality shared by every stored vector.
    pub fn dimensionality(&self) -> usize {
        self.dimensions
    }

    /// Catalog entries in matrix row order.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Entry backing matrix row `row`.
    pub fn entry(&self, row: usize) -> &CatalogEntry {
        &self.entries[row]
    }

    /// The full dense matrix, row-major.
    pub fn matrix(&self) -> &[f32] {
        &self.matrix
    }

    /// Embedding vector of matrix row `row`.
    pub fn row(&self, row: usize) -> &[f32] {
        let start = row * self.dimensions;
        &self.matrix[start..start + self.dimensions]
    }

    /// All descriptions in store order; the vocabulary for input correction.
    pub fn descriptions(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.description.as_str())
    }
}
