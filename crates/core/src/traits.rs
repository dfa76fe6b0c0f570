use crate::error::IndexError;
use crate::models::{DocumentId, IndexEntry, SearchResult};
use async_trait::async_trait;
use std::collections::HashSet;

/// Capability the retriever needs from a vector store. `BruteForceIndex` is
/// the exact reference implementation; an approximate structure may swap in
/// behind this trait as long as it owns up to being approximate.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Batch insert, atomic with respect to concurrent searches: a search
    /// never observes part of a batch. Fails with
    /// [`IndexError::DimensionMismatch`] if any vector disagrees with the
    /// dimensionality established by the first successful insert (or with
    /// the rest of the batch), in which case nothing is inserted.
    async fn insert(&self, entries: Vec<IndexEntry>) -> Result<(), IndexError>;

    /// Removes every entry belonging to `document` in one atomic step and
    /// returns how many were removed. Unknown ids remove nothing and are
    /// not an error.
    async fn delete_by_document(&self, document: DocumentId) -> Result<usize, IndexError>;

    /// Top-`k` entries by descending cosine similarity; equal scores order
    /// by ascending fragment id. `scope` restricts candidates to the given
    /// documents. Zero-magnitude vectors never appear in results.
    async fn search(
        &self,
        query: &[f32],
        k: usize,
        scope: Option<&HashSet<DocumentId>>,
    ) -> Result<Vec<SearchResult>, IndexError>;

    /// Dimensionality established by the first successful insert, if any.
    async fn dimensions(&self) -> Option<usize>;

    async fn entry_count(&self) -> usize;

    async fn document_count(&self) -> usize;
}
