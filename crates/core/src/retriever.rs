use crate::embeddings::Embedder;
use crate::error::{IndexError, IngestError, RetrieveError};
use crate::fragmenter::{fragment_document, FragmenterConfig};
use crate::models::{Document, DocumentId, IndexEntry, SearchResult};
use crate::traits::VectorIndex;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct RetrieverOptions {
    pub fragmenter: FragmenterConfig,
    /// Maximum simultaneous outstanding calls to the embedding provider
    /// during ingestion.
    pub embed_fan_out: usize,
    /// Budget for the single query-embedding call; past it the retrieval
    /// fails fast instead of hanging the caller.
    pub query_timeout: Duration,
}

impl Default for RetrieverOptions {
    fn default() -> Self {
        Self {
            fragmenter: FragmenterConfig::default(),
            embed_fan_out: 4,
            query_timeout: Duration::from_secs(10),
        }
    }
}

/// Per-document ingestion outcome. Fragment-level failures are collected
/// here rather than aborting the batch; the caller decides whether to retry
/// the missing ordinals.
#[derive(Debug, Clone, Serialize)]
pub struct IngestionOutcome {
    pub document_id: DocumentId,
    pub fragment_count: usize,
    /// Ordinals that made it into the index.
    pub indexed: Vec<u32>,
    pub failures: Vec<FragmentFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FragmentFailure {
    pub ordinal: u32,
    pub reason: FailureReason,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureReason {
    Embed { message: String, retryable: bool },
    DimensionMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestionStatus {
    /// Every fragment is searchable.
    Complete,
    /// Indexed with gaps; `failures` lists the missing ordinals.
    Degraded,
    /// Fragments existed but none could be indexed.
    Failed,
    /// The document had no text. Nothing to do, nothing wrong.
    Empty,
}

impl IngestionOutcome {
    pub fn status(&self) -> IngestionStatus {
        if self.fragment_count == 0 {
            IngestionStatus::Empty
        } else if self.indexed.is_empty() {
            IngestionStatus::Failed
        } else if self.failures.is_empty() {
            IngestionStatus::Complete
        } else {
            IngestionStatus::Degraded
        }
    }
}

/// Ties the pipeline together: fragment on ingest, vectorize through the
/// provider boundary, store in the index, and answer query-time retrieval.
pub struct Retriever<E, V>
where
    E: Embedder,
    V: VectorIndex,
{
    embedder: E,
    index: V,
    options: RetrieverOptions,
}

impl<E, V> Retriever<E, V>
where
    E: Embedder,
    V: VectorIndex,
{
    pub fn new(embedder: E, index: V, options: RetrieverOptions) -> Self {
        Self {
            embedder,
            index,
            options,
        }
    }

    pub fn index(&self) -> &V {
        &self.index
    }

    /// Fragments the document, vectorizes every fragment (bounded fan-out),
    /// and inserts the survivors as one atomic batch. All vectorization
    /// attempts resolve before the insert, so abandoning the call never
    /// leaves a partial batch visible to queries.
    pub async fn ingest_document(
        &self,
        document: &Document,
    ) -> Result<IngestionOutcome, IngestError> {
        let fragments = fragment_document(document, self.options.fragmenter)?;
        let fragment_count = fragments.len();

        if fragments.is_empty() {
            return Ok(IngestionOutcome {
                document_id: document.id,
                fragment_count: 0,
                indexed: Vec::new(),
                failures: Vec::new(),
            });
        }

        let fan_out = self.options.embed_fan_out.max(1);
        let mut attempts = stream::iter(fragments)
            .map(|fragment| async move {
                let vector = self.embedder.embed(&fragment.text).await;
                (fragment, vector)
            })
            .buffer_unordered(fan_out)
            .collect::<Vec<_>>()
            .await;
        attempts.sort_by_key(|(fragment, _)| fragment.id);

        let mut expected = self.index.dimensions().await;
        let mut entries = Vec::new();
        let mut indexed = Vec::new();
        let mut failures = Vec::new();

        for (fragment, attempt) in attempts {
            let ordinal = fragment.id.ordinal;
            match attempt {
                Ok(vector) => {
                    let dim = *expected.get_or_insert(vector.len());
                    if vector.len() != dim {
                        warn!(
                            fragment = %fragment.id,
                            expected = dim,
                            actual = vector.len(),
                            "fragment vector has wrong dimensionality, skipping"
                        );
                        failures.push(FragmentFailure {
                            ordinal,
                            reason: FailureReason::DimensionMismatch {
                                expected: dim,
                                actual: vector.len(),
                            },
                        });
                    } else {
                        indexed.push(ordinal);
                        entries.push(IndexEntry::from_fragment(fragment, vector));
                    }
                }
                Err(error) => {
                    warn!(
                        fragment = %fragment.id,
                        retryable = error.is_retryable(),
                        %error,
                        "fragment embedding failed"
                    );
                    failures.push(FragmentFailure {
                        ordinal,
                        reason: FailureReason::Embed {
                            message: error.to_string(),
                            retryable: error.is_retryable(),
                        },
                    });
                }
            }
        }

        if !entries.is_empty() {
            self.index.insert(entries).await?;
        }

        debug!(
            document = %document.id,
            fragments = fragment_count,
            indexed = indexed.len(),
            failed = failures.len(),
            "document ingested"
        );

        Ok(IngestionOutcome {
            document_id: document.id,
            fragment_count,
            indexed,
            failures,
        })
    }

    /// Idempotent: removing an absent document is a no-op success.
    pub async fn remove_document(&self, document: DocumentId) -> Result<usize, IndexError> {
        self.index.delete_by_document(document).await
    }

    /// Vectorizes the query under the configured timeout and returns the
    /// ranked fragments for context assembly. An empty result list is a
    /// valid outcome; a query that cannot be vectorized is not.
    pub async fn retrieve_context(
        &self,
        query: &str,
        k: usize,
        scope: Option<&HashSet<DocumentId>>,
    ) -> Result<Vec<SearchResult>, RetrieveError> {
        let embedding = tokio::time::timeout(self.options.query_timeout, self.embedder.embed(query));

        let vector = match embedding.await {
            Ok(Ok(vector)) => vector,
            Ok(Err(error)) => return Err(RetrieveError::QueryEmbedding(error)),
            Err(_) => {
                return Err(RetrieveError::QueryTimeout {
                    ms: self.options.query_timeout.as_millis() as u64,
                })
            }
        };

        Ok(self.index.search(&vector, k, scope).await?)
    }
}
