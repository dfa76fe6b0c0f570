pub mod citation;
pub mod context;
pub mod embeddings;
pub mod error;
pub mod fragmenter;
pub mod index;
pub mod models;
pub mod retriever;
pub mod traits;

pub use citation::{extract_author, format_citation, CitationStyle, UNKNOWN_AUTHOR};
pub use context::{assemble, AssembledContext, Citation, FRAGMENT_SEPARATOR};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, HttpEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{EmbedError, IndexError, IngestError, RetrieveError};
pub use fragmenter::{
    fragment_document, fragment_text, FragmenterConfig, DEFAULT_BOUNDARY_WINDOW,
    DEFAULT_MAX_CHARS, DEFAULT_OVERLAP_CHARS,
};
pub use index::{BruteForceIndex, IndexSnapshot};
pub use models::{
    Document, DocumentId, FileType, Fragment, FragmentId, IndexEntry, SearchResult, Span,
};
pub use retriever::{
    FailureReason, FragmentFailure, IngestionOutcome, IngestionStatus, Retriever,
    RetrieverOptions,
};
pub use traits::VectorIndex;
