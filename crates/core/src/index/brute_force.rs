use crate::error::IndexError;
use crate::models::{DocumentId, FragmentId, IndexEntry, SearchResult, Span};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::debug;

/// Exact in-process vector index: a single flat `f32` arena scanned in full
/// per query, with top-k kept in a bounded min-heap. At tens of thousands of
/// entries the scan is cheap enough that nothing approximate is needed; an
/// approximate index can replace it behind [`VectorIndex`].
///
/// Readers share the lock; insert and delete hold it exclusively only for
/// the structural mutation. Embedding always happens before the lock is
/// touched, so the critical section stays bounded.
pub struct BruteForceIndex {
    state: RwLock<IndexState>,
}

struct Slot {
    fragment_id: FragmentId,
    span: Span,
    text: String,
    norm: f64,
    deleted: bool,
}

#[derive(Default)]
struct IndexState {
    dimensions: Option<usize>,
    /// Slot `i` occupies `[i * dim, (i + 1) * dim)`.
    vectors: Vec<f32>,
    slots: Vec<Slot>,
    by_fragment: HashMap<FragmentId, usize>,
    by_document: HashMap<DocumentId, Vec<usize>>,
    dead: usize,
}

/// Serializable image of the live entries, for carrying the index across
/// process runs. Tombstones are not part of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSnapshot {
    pub dimensions: Option<usize>,
    pub entries: Vec<IndexEntry>,
}

struct Candidate {
    score: f64,
    fragment_id: FragmentId,
    slot: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // greater = better: higher score, then lower fragment id
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.fragment_id.cmp(&self.fragment_id))
    }
}

fn norm_of(vector: &[f32]) -> f64 {
    vector
        .iter()
        .map(|value| f64::from(*value) * f64::from(*value))
        .sum::<f64>()
        .sqrt()
}

impl Default for BruteForceIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl BruteForceIndex {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(IndexState::default()),
        }
    }

    pub fn from_snapshot(snapshot: IndexSnapshot) -> Result<Self, IndexError> {
        let index = Self::new();
        {
            let mut state = index.write_state();
            state.dimensions = snapshot.dimensions;
        }
        index.insert_entries(snapshot.entries)?;
        Ok(index)
    }

    pub fn snapshot(&self) -> IndexSnapshot {
        let state = self.read_state();
        let dim = state.dimensions.unwrap_or(0);

        let entries = state
            .slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.deleted)
            .map(|(slot_index, slot)| IndexEntry {
                fragment_id: slot.fragment_id,
                span: slot.span,
                text: slot.text.clone(),
                vector: state.vectors[slot_index * dim..(slot_index + 1) * dim].to_vec(),
            })
            .collect();

        IndexSnapshot {
            dimensions: state.dimensions,
            entries,
        }
    }

    fn read_state(&self) -> RwLockReadGuard<'_, IndexState> {
        self.state.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, IndexState> {
        self.state.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn insert_entries(&self, entries: Vec<IndexEntry>) -> Result<(), IndexError> {
        if entries.is_empty() {
            return Ok(());
        }

        let mut state = self.write_state();

        // Validate the whole batch before touching anything, so a rejected
        // batch inserts nothing.
        let expected = state.dimensions.unwrap_or(entries[0].vector.len());
        for entry in &entries {
            if entry.vector.len() != expected {
                return Err(IndexError::DimensionMismatch {
                    expected,
                    actual: entry.vector.len(),
                });
            }
        }
        state.dimensions.get_or_insert(expected);

        let count = entries.len();
        for entry in entries {
            state.add(entry);
        }

        debug!(entries = count, dimensions = expected, "indexed batch");
        Ok(())
    }

    fn delete_document_entries(&self, document: DocumentId) -> usize {
        let mut state = self.write_state();
        let removed = state.delete_document(document);
        state.maybe_compact();
        if removed > 0 {
            debug!(document = %document, removed, "evicted document entries");
        }
        removed
    }

    fn search_entries(
        &self,
        query: &[f32],
        k: usize,
        scope: Option<&HashSet<DocumentId>>,
    ) -> Result<Vec<SearchResult>, IndexError> {
        let state = self.read_state();

        let Some(dim) = state.dimensions else {
            return Ok(Vec::new());
        };
        if query.len() != dim {
            return Err(IndexError::DimensionMismatch {
                expected: dim,
                actual: query.len(),
            });
        }

        let query_norm = norm_of(query);
        if k == 0 || query_norm == 0.0 {
            return Ok(Vec::new());
        }

        let mut heap: BinaryHeap<Reverse<Candidate>> = BinaryHeap::with_capacity(k + 1);
        for (slot_index, slot) in state.slots.iter().enumerate() {
            if slot.deleted || slot.norm == 0.0 {
                continue;
            }
            if let Some(scope) = scope {
                if !scope.contains(&slot.fragment_id.document) {
                    continue;
                }
            }

            let stored = &state.vectors[slot_index * dim..(slot_index + 1) * dim];
            let dot: f64 = stored
                .iter()
                .zip(query)
                .map(|(a, b)| f64::from(*a) * f64::from(*b))
                .sum();

            heap.push(Reverse(Candidate {
                score: dot / (slot.norm * query_norm),
                fragment_id: slot.fragment_id,
                slot: slot_index,
            }));
            if heap.len() > k {
                heap.pop();
            }
        }

        let mut candidates: Vec<Candidate> =
            heap.into_iter().map(|Reverse(candidate)| candidate).collect();
        candidates.sort_by(|left, right| right.cmp(left));

        Ok(candidates
            .into_iter()
            .enumerate()
            .map(|(position, candidate)| {
                let slot = &state.slots[candidate.slot];
                SearchResult {
                    fragment_id: slot.fragment_id,
                    span: slot.span,
                    text: slot.text.clone(),
                    score: candidate.score,
                    rank: position + 1,
                }
            })
            .collect())
    }
}

impl IndexState {
    fn add(&mut self, entry: IndexEntry) {
        // re-inserting an id replaces the old entry
        if let Some(old_slot) = self.by_fragment.remove(&entry.fragment_id) {
            self.slots[old_slot].deleted = true;
            self.dead += 1;
        }

        let slot = self.slots.len();
        let norm = norm_of(&entry.vector);
        self.vectors.extend_from_slice(&entry.vector);
        self.slots.push(Slot {
            fragment_id: entry.fragment_id,
            span: entry.span,
            text: entry.text,
            norm,
            deleted: false,
        });
        self.by_fragment.insert(entry.fragment_id, slot);
        self.by_document
            .entry(entry.fragment_id.document)
            .or_default()
            .push(slot);
    }

    fn delete_document(&mut self, document: DocumentId) -> usize {
        let Some(slots) = self.by_document.remove(&document) else {
            return 0;
        };

        let mut removed = 0;
        for slot in slots {
            if self.slots[slot].deleted {
                continue;
            }
            let fragment_id = self.slots[slot].fragment_id;
            self.slots[slot].deleted = true;
            self.by_fragment.remove(&fragment_id);
            self.dead += 1;
            removed += 1;
        }
        removed
    }

    /// Rebuild the arena once tombstones outnumber live slots.
    fn maybe_compact(&mut self) {
        if self.dead == 0 || self.dead * 2 <= self.slots.len() {
            return;
        }

        let dim = self.dimensions.unwrap_or(0);
        let live = self.slots.len() - self.dead;
        let mut vectors = Vec::with_capacity(live * dim);
        let mut slots = Vec::with_capacity(live);
        self.by_fragment.clear();
        self.by_document.clear();

        let old_vectors = std::mem::take(&mut self.vectors);
        for (old_slot, slot) in std::mem::take(&mut self.slots).into_iter().enumerate() {
            if slot.deleted {
                continue;
            }
            let new_slot = slots.len();
            vectors.extend_from_slice(&old_vectors[old_slot * dim..(old_slot + 1) * dim]);
            self.by_fragment.insert(slot.fragment_id, new_slot);
            self.by_document
                .entry(slot.fragment_id.document)
                .or_default()
                .push(new_slot);
            slots.push(slot);
        }

        self.vectors = vectors;
        self.slots = slots;
        self.dead = 0;
    }
}

#[async_trait]
impl VectorIndex for BruteForceIndex {
    async fn insert(&self, entries: Vec<IndexEntry>) -> Result<(), IndexError> {
        self.insert_entries(entries)
    }

    async fn delete_by_document(&self, document: DocumentId) -> Result<usize, IndexError> {
        Ok(self.delete_document_entries(document))
    }

    async fn search(
        &self,
        query: &[f32],
        k: usize,
        scope: Option<&HashSet<DocumentId>>,
    ) -> Result<Vec<SearchResult>, IndexError> {
        self.search_entries(query, k, scope)
    }

    async fn dimensions(&self) -> Option<usize> {
        self.read_state().dimensions
    }

    async fn entry_count(&self) -> usize {
        let state = self.read_state();
        state.slots.len() - state.dead
    }

    async fn document_count(&self) -> usize {
        self.read_state().by_document.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn entry(document: DocumentId, ordinal: u32, vector: Vec<f32>) -> IndexEntry {
        IndexEntry {
            fragment_id: FragmentId { document, ordinal },
            span: Span {
                start: 0,
                end: 8,
            },
            text: format!("fragment {ordinal}"),
            vector,
        }
    }

    #[tokio::test]
    async fn search_ranks_by_descending_cosine() {
        let index = BruteForceIndex::new();
        let document = DocumentId::new();
        index
            .insert(vec![
                entry(document, 0, vec![1.0, 0.0]),
                entry(document, 1, vec![0.6, 0.8]),
                entry(document, 2, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 3, None).await.unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].fragment_id.ordinal, 0);
        assert!((hits[0].score - 1.0).abs() < 1e-9);
        assert_eq!(hits[1].fragment_id.ordinal, 1);
        assert_eq!(hits[2].fragment_id.ordinal, 2);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
        }
        assert_eq!(
            hits.iter().map(|hit| hit.rank).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );
    }

    #[tokio::test]
    async fn search_never_returns_more_than_k() {
        let index = BruteForceIndex::new();
        let document = DocumentId::new();
        let entries = (0..5)
            .map(|ordinal| entry(document, ordinal, vec![1.0, ordinal as f32]))
            .collect();
        index.insert(entries).await.unwrap();

        assert_eq!(index.search(&[1.0, 1.0], 3, None).await.unwrap().len(), 3);
        assert_eq!(index.search(&[1.0, 1.0], 10, None).await.unwrap().len(), 5);
        assert!(index.search(&[1.0, 1.0], 0, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn equal_scores_order_by_ascending_fragment_id() {
        let index = BruteForceIndex::new();
        let document = DocumentId::new();
        // scrambled insert order, identical vectors
        index
            .insert(vec![
                entry(document, 2, vec![0.5, 0.5]),
                entry(document, 0, vec![0.5, 0.5]),
                entry(document, 1, vec![0.5, 0.5]),
            ])
            .await
            .unwrap();

        let hits = index.search(&[0.5, 0.5], 3, None).await.unwrap();
        assert_eq!(
            hits.iter().map(|hit| hit.fragment_id.ordinal).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
    }

    #[tokio::test]
    async fn dimensionality_is_established_by_first_insert() {
        let index = BruteForceIndex::new();
        let document = DocumentId::new();
        index
            .insert(vec![entry(document, 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        assert_eq!(index.dimensions().await, Some(2));

        let result = index
            .insert(vec![entry(document, 1, vec![1.0, 0.0, 0.0])])
            .await;
        assert_eq!(
            result,
            Err(IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            })
        );
        assert_eq!(index.entry_count().await, 1);
    }

    #[tokio::test]
    async fn inconsistent_batch_inserts_nothing() {
        let index = BruteForceIndex::new();
        let document = DocumentId::new();
        let result = index
            .insert(vec![
                entry(document, 0, vec![1.0, 0.0]),
                entry(document, 1, vec![1.0, 0.0, 0.0]),
            ])
            .await;

        assert!(result.is_err());
        assert_eq!(index.entry_count().await, 0);
        assert_eq!(index.dimensions().await, None);
    }

    #[tokio::test]
    async fn delete_removes_one_document_and_leaves_scores_unchanged() {
        let index = BruteForceIndex::new();
        let doc_a = DocumentId::new();
        let doc_b = DocumentId::new();
        index
            .insert(vec![
                entry(doc_a, 0, vec![1.0, 0.0]),
                entry(doc_a, 1, vec![0.0, 1.0]),
                entry(doc_b, 0, vec![0.6, 0.8]),
                entry(doc_b, 1, vec![0.8, 0.6]),
            ])
            .await
            .unwrap();

        let before = index.search(&[1.0, 0.0], 10, None).await.unwrap();
        let score_of = |hits: &[SearchResult], id: FragmentId| {
            hits.iter().find(|hit| hit.fragment_id == id).map(|hit| hit.score)
        };
        let kept = FragmentId {
            document: doc_b,
            ordinal: 1,
        };
        let kept_score = score_of(&before, kept).unwrap();

        assert_eq!(index.delete_by_document(doc_a).await.unwrap(), 2);
        assert_eq!(index.entry_count().await, 2);
        assert_eq!(index.document_count().await, 1);

        let after = index.search(&[1.0, 0.0], 10, None).await.unwrap();
        assert!(after.iter().all(|hit| hit.fragment_id.document == doc_b));
        assert_eq!(score_of(&after, kept), Some(kept_score));
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let index = BruteForceIndex::new();
        let document = DocumentId::new();
        index
            .insert(vec![entry(document, 0, vec![1.0, 0.0])])
            .await
            .unwrap();

        assert_eq!(index.delete_by_document(document).await.unwrap(), 1);
        assert_eq!(index.delete_by_document(document).await.unwrap(), 0);
        assert_eq!(index.delete_by_document(DocumentId::new()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn zero_magnitude_vectors_never_surface() {
        let index = BruteForceIndex::new();
        let document = DocumentId::new();
        index
            .insert(vec![
                entry(document, 0, vec![0.0, 0.0]),
                entry(document, 1, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let hits = index.search(&[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fragment_id.ordinal, 1);

        assert!(index.search(&[0.0, 0.0], 10, None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn scope_restricts_the_candidate_set() {
        let index = BruteForceIndex::new();
        let doc_a = DocumentId::new();
        let doc_b = DocumentId::new();
        index
            .insert(vec![
                entry(doc_a, 0, vec![1.0, 0.0]),
                entry(doc_b, 0, vec![1.0, 0.0]),
            ])
            .await
            .unwrap();

        let scope = HashSet::from([doc_b]);
        let hits = index.search(&[1.0, 0.0], 10, Some(&scope)).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].fragment_id.document, doc_b);

        let unknown = HashSet::from([DocumentId::new()]);
        assert!(index
            .search(&[1.0, 0.0], 10, Some(&unknown))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn query_dimension_mismatch_is_an_error() {
        let index = BruteForceIndex::new();
        let document = DocumentId::new();
        index
            .insert(vec![entry(document, 0, vec![1.0, 0.0])])
            .await
            .unwrap();

        let result = index.search(&[1.0, 0.0, 0.0], 1, None).await;
        assert_eq!(
            result.unwrap_err(),
            IndexError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        );
    }

    #[tokio::test]
    async fn compaction_keeps_surviving_entries_searchable() {
        let index = BruteForceIndex::new();
        let docs: Vec<DocumentId> = (0..3).map(|_| DocumentId::new()).collect();
        for document in &docs {
            index
                .insert(vec![
                    entry(*document, 0, vec![1.0, 0.0]),
                    entry(*document, 1, vec![0.0, 1.0]),
                ])
                .await
                .unwrap();
        }

        // deleting two of three documents tips tombstones past half and
        // triggers a rebuild
        index.delete_by_document(docs[0]).await.unwrap();
        index.delete_by_document(docs[1]).await.unwrap();
        assert_eq!(index.entry_count().await, 2);
        assert_eq!(index.document_count().await, 1);

        let hits = index.search(&[1.0, 0.0], 10, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits.iter().all(|hit| hit.fragment_id.document == docs[2]));
        assert!((hits[0].score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn reinserting_a_fragment_replaces_it() {
        let index = BruteForceIndex::new();
        let document = DocumentId::new();
        index
            .insert(vec![entry(document, 0, vec![1.0, 0.0])])
            .await
            .unwrap();
        index
            .insert(vec![entry(document, 0, vec![0.0, 1.0])])
            .await
            .unwrap();

        assert_eq!(index.entry_count().await, 1);
        let hits = index.search(&[0.0, 1.0], 1, None).await.unwrap();
        assert!((hits[0].score - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn snapshot_round_trips_through_disk() {
        let index = BruteForceIndex::new();
        let document = DocumentId::new();
        index
            .insert(vec![
                entry(document, 0, vec![1.0, 0.0]),
                entry(document, 1, vec![0.0, 1.0]),
            ])
            .await
            .unwrap();

        let dir = tempdir().unwrap();
        let path = dir.path().join("index.json");
        let encoded = serde_json::to_string(&index.snapshot()).unwrap();
        fs::write(&path, encoded).unwrap();

        let decoded: IndexSnapshot =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let restored = BruteForceIndex::from_snapshot(decoded).unwrap();

        assert_eq!(restored.entry_count().await, 2);
        assert_eq!(restored.dimensions().await, Some(2));
        let hits = restored.search(&[1.0, 0.0], 1, None).await.unwrap();
        assert_eq!(hits[0].fragment_id.ordinal, 0);
        assert!((hits[0].score - 1.0).abs() < 1e-9);
    }
}
