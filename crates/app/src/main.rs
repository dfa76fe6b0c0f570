use chrono::Utc;
use clap::{Parser, Subcommand};
use doc_retrieval_core::{
    assemble, format_citation, BruteForceIndex, CharacterNgramEmbedder, CitationStyle, Document,
    DocumentId, EmbedError, Embedder, FailureReason, FileType, FragmentFailure,
    FragmenterConfig, HttpEmbedder, IndexSnapshot, IngestionStatus, Retriever, RetrieverOptions,
    VectorIndex,
};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use walkdir::WalkDir;

#[derive(Parser)]
#[command(name = "doc-retrieval", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Index snapshot file, loaded at startup and saved after mutations.
    #[arg(long, default_value = "retrieval_index.json")]
    index_path: PathBuf,

    /// OpenAI-style embeddings endpoint. Uses the local hashing embedder
    /// when unset.
    #[arg(long)]
    embed_endpoint: Option<String>,

    /// Model name sent to the embeddings endpoint.
    #[arg(long, default_value = "text-embedding-3-small")]
    embed_model: String,

    /// API key for the embeddings endpoint.
    #[arg(long, env = "EMBED_API_KEY")]
    embed_api_key: Option<String>,

    /// Fragment size in characters.
    #[arg(long, default_value = "1000")]
    max_fragment_chars: usize,

    /// Overlap between consecutive fragments in characters.
    #[arg(long, default_value = "100")]
    overlap_chars: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest every .txt/.md file under a folder.
    Ingest {
        /// Folder searched recursively.
        #[arg(long)]
        folder: PathBuf,
    },
    /// Rank indexed fragments against a query.
    Search {
        #[arg(long)]
        query: String,
        /// Number of fragments to return.
        #[arg(long, default_value = "10")]
        top_k: usize,
        /// Restrict to these document ids (repeatable).
        #[arg(long)]
        document: Vec<DocumentId>,
    },
    /// Retrieve and assemble a bounded context payload with citations.
    Ask {
        #[arg(long)]
        query: String,
        #[arg(long, default_value = "5")]
        top_k: usize,
        /// Context budget in characters.
        #[arg(long, default_value = "2000")]
        max_context_chars: usize,
    },
    /// Remove a document's fragments from the index.
    Remove {
        #[arg(long)]
        document_id: DocumentId,
    },
    /// Render a source citation for a file.
    Cite {
        #[arg(long)]
        file: PathBuf,
        /// One of: apa, mla, chicago, harvard.
        #[arg(long, default_value = "apa")]
        style: String,
    },
    /// Entry and document counts.
    Status,
}

enum CliEmbedder {
    Local(CharacterNgramEmbedder),
    Http(HttpEmbedder),
}

#[async_trait::async_trait]
impl Embedder for CliEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbedError> {
        match self {
            CliEmbedder::Local(embedder) => embedder.embed(text).await,
            CliEmbedder::Http(embedder) => embedder.embed(text).await,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let app_version = env!("CARGO_PKG_VERSION");

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let cli = Cli::parse();

    let embedder = match &cli.embed_endpoint {
        Some(endpoint) => CliEmbedder::Http(
            HttpEmbedder::new(endpoint, &cli.embed_model, cli.embed_api_key.clone())
                .map_err(|error| anyhow::anyhow!(error.to_string()))?,
        ),
        None => CliEmbedder::Local(CharacterNgramEmbedder::default()),
    };

    let options = RetrieverOptions {
        fragmenter: FragmenterConfig {
            max_chars: cli.max_fragment_chars,
            overlap_chars: cli.overlap_chars,
            ..FragmenterConfig::default()
        },
        ..RetrieverOptions::default()
    };
    let retriever = Retriever::new(embedder, load_index(&cli.index_path)?, options);

    info!(
        version = app_version,
        started_at = %Utc::now().to_rfc3339(),
        "doc-retrieval boot"
    );

    match cli.command {
        Command::Ingest { folder } => {
            let files = discover_text_files(&folder);
            if files.is_empty() {
                anyhow::bail!("no .txt or .md files found in {}", folder.display());
            }

            for path in files {
                let text = match std::fs::read_to_string(&path) {
                    Ok(text) => text,
                    Err(error) => {
                        warn!(path = %path.display(), %error, "skipping unreadable file");
                        continue;
                    }
                };
                let document = Document::new(
                    file_title(&path),
                    file_type_of(&path),
                    text,
                );
                let digest = document.content_digest();
                let outcome = retriever.ingest_document(&document).await?;

                match outcome.status() {
                    IngestionStatus::Complete => println!(
                        "{} {} indexed ({} fragments, digest {})",
                        document.id,
                        document.title,
                        outcome.fragment_count,
                        &digest[..12]
                    ),
                    IngestionStatus::Degraded => {
                        println!(
                            "{} {} indexed with gaps ({}/{} fragments)",
                            document.id,
                            document.title,
                            outcome.indexed.len(),
                            outcome.fragment_count
                        );
                        print_failures(&outcome.failures);
                    }
                    IngestionStatus::Failed => {
                        println!("{} {} failed to index", document.id, document.title);
                        print_failures(&outcome.failures);
                    }
                    IngestionStatus::Empty => {
                        println!("{} {} was empty, nothing indexed", document.id, document.title)
                    }
                }
            }

            save_index(&cli.index_path, retriever.index())?;
        }
        Command::Search {
            query,
            top_k,
            document,
        } => {
            let scope: Option<HashSet<DocumentId>> = if document.is_empty() {
                None
            } else {
                Some(document.into_iter().collect())
            };

            let hits = retriever
                .retrieve_context(&query, top_k, scope.as_ref())
                .await?;

            if hits.is_empty() {
                println!("no matching fragments");
            }
            for hit in hits {
                println!(
                    "#{} score={:.4} fragment={} span=[{},{})",
                    hit.rank, hit.score, hit.fragment_id, hit.span.start, hit.span.end
                );
                println!("  {}", snippet(&hit.text, 120));
            }
        }
        Command::Ask {
            query,
            top_k,
            max_context_chars,
        } => {
            let hits = retriever.retrieve_context(&query, top_k, None).await?;
            let assembled = assemble(&hits, max_context_chars);

            if assembled.text.is_empty() {
                println!("no context available for this query");
            } else {
                println!("{}", assembled.text);
                println!();
                for citation in &assembled.citations {
                    println!(
                        "citation: document={} fragment={} span=[{},{})",
                        citation.document_id,
                        citation.ordinal,
                        citation.span.start,
                        citation.span.end
                    );
                }
            }
        }
        Command::Remove { document_id } => {
            let removed = retriever.remove_document(document_id).await?;
            if removed == 0 {
                println!("no fragments for {document_id} (already absent)");
            } else {
                println!("removed {removed} fragments of {document_id}");
            }
            save_index(&cli.index_path, retriever.index())?;
        }
        Command::Cite { file, style } => {
            let style = parse_style(&style)?;
            let text = std::fs::read_to_string(&file)?;
            let document = Document::new(file_title(&file), file_type_of(&file), text);
            println!("{}", format_citation(&document, style));
        }
        Command::Status => {
            let index = retriever.index();
            println!(
                "entries={} documents={} dimensions={}",
                index.entry_count().await,
                index.document_count().await,
                index
                    .dimensions()
                    .await
                    .map(|dim| dim.to_string())
                    .unwrap_or_else(|| "unset".to_string())
            );
        }
    }

    Ok(())
}

fn discover_text_files(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder).into_iter().filter_map(|item| item.ok()) {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_text = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("txt") || ext.eq_ignore_ascii_case("md"));

        if is_text {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

fn file_title(path: &Path) -> String {
    path.file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("untitled")
        .to_string()
}

fn file_type_of(path: &Path) -> FileType {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(FileType::from_extension)
        .unwrap_or(FileType::Other)
}

fn parse_style(value: &str) -> anyhow::Result<CitationStyle> {
    match value.to_ascii_lowercase().as_str() {
        "apa" => Ok(CitationStyle::Apa),
        "mla" => Ok(CitationStyle::Mla),
        "chicago" => Ok(CitationStyle::Chicago),
        "harvard" => Ok(CitationStyle::Harvard),
        other => anyhow::bail!("unknown citation style: {other}"),
    }
}

fn snippet(text: &str, limit: usize) -> String {
    let flattened = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flattened.chars().count() <= limit {
        flattened
    } else {
        let cut: String = flattened.chars().take(limit).collect();
        format!("{cut}...")
    }
}

fn load_index(path: &Path) -> anyhow::Result<BruteForceIndex> {
    if !path.exists() {
        return Ok(BruteForceIndex::new());
    }

    let snapshot: IndexSnapshot = serde_json::from_str(&std::fs::read_to_string(path)?)?;
    Ok(BruteForceIndex::from_snapshot(snapshot)?)
}

fn save_index(path: &Path, index: &BruteForceIndex) -> anyhow::Result<()> {
    let encoded = serde_json::to_string_pretty(&index.snapshot())?;
    std::fs::write(path, encoded)?;
    Ok(())
}

fn print_failures(failures: &[FragmentFailure]) {
    for failure in failures {
        match &failure.reason {
            FailureReason::Embed { message, retryable } => println!(
                "  fragment {} embedding failed (retryable={}): {}",
                failure.ordinal, retryable, message
            ),
            FailureReason::DimensionMismatch { expected, actual } => println!(
                "  fragment {} dimension mismatch: expected {}, got {}",
                failure.ordinal, expected, actual
            ),
        }
    }
}
