use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct DocumentId(pub Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(value)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Pdf,
    Word,
    Text,
    Markdown,
    Other,
}

impl FileType {
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "pdf" => FileType::Pdf,
            "doc" | "docx" => FileType::Word,
            "txt" => FileType::Text,
            "md" | "markdown" => FileType::Markdown,
            _ => FileType::Other,
        }
    }
}

/// An uploaded document after text extraction. Immutable once stored;
/// replacing its content is delete-then-insert, never mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub title: String,
    pub file_type: FileType,
    pub text: String,
    pub ingested_at: DateTime<Utc>,
}

impl Document {
    pub fn new(title: impl Into<String>, file_type: FileType, text: impl Into<String>) -> Self {
        Self {
            id: DocumentId::new(),
            title: title.into(),
            file_type,
            text: text.into(),
            ingested_at: Utc::now(),
        }
    }

    /// Sha-256 of the decoded text, so callers can detect an unchanged
    /// re-upload before paying for re-ingestion.
    pub fn content_digest(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.text.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

/// Half-open `[start, end)` offsets into the document text, counted in
/// characters (not bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct FragmentId {
    pub document: DocumentId,
    pub ordinal: u32,
}

impl fmt::Display for FragmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.document, self.ordinal)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    pub id: FragmentId,
    pub span: Span,
    pub text: String,
}

/// What the index stores per fragment. The index owns its entries; nothing
/// hands out mutable references into its internal storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexEntry {
    pub fragment_id: FragmentId,
    pub span: Span,
    pub text: String,
    pub vector: Vec<f32>,
}

impl IndexEntry {
    pub fn from_fragment(fragment: Fragment, vector: Vec<f32>) -> Self {
        Self {
            fragment_id: fragment.id,
            span: fragment.span,
            text: fragment.text,
            vector,
        }
    }
}

/// A ranked hit. Built per query, never persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    pub fragment_id: FragmentId,
    pub span: Span,
    pub text: String,
    pub score: f64,
    pub rank: usize,
}
