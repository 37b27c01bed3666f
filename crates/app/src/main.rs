use anyhow::Context;
use clap::{Parser, Subcommand};
use kb_assistant_core::{
    discover_pdf_sources, AnswerCoordinator, ChatCompletionsClient, CreateRequest,
    EmbeddingEncoder, HashedNgramEncoder, Ingestor, QdrantIndex, Record, RecordStore, RetryPolicy,
    SourceExtractor, SourceType, SqliteRecordStore, StoreError, DEFAULT_COMPLETIONS_URL,
    DEFAULT_MODEL, DEFAULT_TOP_K,
};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "kb-assistant", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Directory that holds ingested PDF files
    #[arg(long, env = "KB_MEDIA_ROOT", default_value = "media")]
    media_root: PathBuf,

    /// SQLite database for the record store
    #[arg(long, env = "KB_DATABASE", default_value = "kb.sqlite3")]
    database: PathBuf,

    /// Qdrant base URL
    #[arg(long, env = "QDRANT_URL", default_value = "http://localhost:6333")]
    qdrant_url: String,

    /// Qdrant collection
    #[arg(long, env = "QDRANT_COLLECTION", default_value = "knowledge_base")]
    collection: String,

    /// Chat-completions endpoint used for answer generation
    #[arg(long, env = "GENERATION_URL", default_value = DEFAULT_COMPLETIONS_URL)]
    generation_url: String,

    /// Model identifier sent to the generation backend
    #[arg(long, env = "GENERATION_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// API key for the generation backend
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Attempts per network call before giving up
    #[arg(long, default_value = "3")]
    max_attempts: u32,

    /// Base backoff delay between attempts, in milliseconds
    #[arg(long, default_value = "250")]
    retry_base_ms: u64,
}

#[derive(Subcommand)]
enum Command {
    /// Ingest one PDF from the media root.
    AddPdf {
        /// File locator, relative to the media root
        #[arg(long)]
        file: String,
        /// Display title; defaults to the file name
        #[arg(long)]
        title: Option<String>,
        /// Extra metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Ingest a web page or public social profile.
    AddWeb {
        /// Page URL
        #[arg(long)]
        url: String,
        /// website or social-media
        #[arg(long, default_value = "website")]
        source_type: String,
        /// Display title
        #[arg(long)]
        title: Option<String>,
        /// Text to store directly instead of fetching the URL
        #[arg(long)]
        content: Option<String>,
        /// Extra metadata as a JSON object
        #[arg(long)]
        metadata: Option<String>,
    },
    /// Ingest every PDF under a folder, skipping known locators.
    IngestDir {
        /// Folder to scan recursively
        #[arg(long)]
        folder: PathBuf,
    },
    /// Answer a question from the ingested content.
    Ask {
        /// Question text
        #[arg(long)]
        query: String,
        /// Number of supporting records to retrieve
        #[arg(long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },
    /// Show the most recently ingested records.
    List {
        /// Maximum number of records to print
        #[arg(long, default_value = "20")]
        limit: usize,
    },
    /// Re-run extraction and indexing for one record.
    Reindex {
        /// Record id
        #[arg(long)]
        id: i64,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(fmt::layer())
        .init();

    let Cli {
        command,
        media_root,
        database,
        qdrant_url,
        collection,
        generation_url,
        model,
        api_key,
        max_attempts,
        retry_base_ms,
    } = Cli::parse();

    let retry = RetryPolicy::new(max_attempts, Duration::from_millis(retry_base_ms));
    let encoder: Arc<dyn EmbeddingEncoder> = Arc::new(HashedNgramEncoder::default());
    info!(version = env!("CARGO_PKG_VERSION"), "kb-assistant boot");

    match command {
        Command::AddPdf {
            file,
            title,
            metadata,
        } => {
            let metadata = parse_metadata(metadata.as_deref())?;
            let ingestor = open_ingestor(
                &database,
                &media_root,
                &qdrant_url,
                &collection,
                retry,
                encoder,
            )
            .await?;

            let mut request = CreateRequest::new(SourceType::Pdf, file).with_metadata(metadata);
            if let Some(title) = title {
                request = request.with_title(title);
            }

            let record = ingestor.create_record(request).await?;
            print_record(&record);
        }
        Command::AddWeb {
            url,
            source_type,
            title,
            content,
            metadata,
        } => {
            let source_type = parse_web_source(&source_type)?;
            let metadata = parse_metadata(metadata.as_deref())?;
            let ingestor = open_ingestor(
                &database,
                &media_root,
                &qdrant_url,
                &collection,
                retry,
                encoder,
            )
            .await?;

            let mut request = CreateRequest::new(source_type, url).with_metadata(metadata);
            if let Some(title) = title {
                request = request.with_title(title);
            }
            if let Some(content) = content {
                request = request.with_content(content);
            }

            let record = ingestor.create_record(request).await?;
            print_record(&record);
        }
        Command::IngestDir { folder } => {
            let ingestor = open_ingestor(
                &database,
                &media_root,
                &qdrant_url,
                &collection,
                retry,
                encoder,
            )
            .await?;

            let sources = discover_pdf_sources(&folder);
            info!(folder = %folder.display(), files = sources.len(), "bulk pdf ingestion");

            let mut created = 0usize;
            let mut skipped = 0usize;
            for path in sources {
                // Files outside the media root keep an absolute locator so
                // they still resolve on reindex.
                let locator = match path.strip_prefix(&media_root) {
                    Ok(relative) => relative.to_string_lossy().into_owned(),
                    Err(_) => std::fs::canonicalize(&path)
                        .with_context(|| format!("cannot resolve {}", path.display()))?
                        .to_string_lossy()
                        .into_owned(),
                };

                match ingestor
                    .create_record(CreateRequest::new(SourceType::Pdf, locator))
                    .await
                {
                    Ok(record) => {
                        print_record(&record);
                        created += 1;
                    }
                    Err(StoreError::DuplicateLocator(locator)) => {
                        warn!(%locator, "already ingested; skipping");
                        skipped += 1;
                    }
                    Err(error) => return Err(error.into()),
                }
            }

            println!("{created} ingested, {skipped} already present");
        }
        Command::Ask { query, top_k } => {
            let api_key = api_key.context("GROQ_API_KEY is not set")?;
            let store = SqliteRecordStore::open(&database)?;
            let index = QdrantIndex::new(&qdrant_url, &collection, encoder.dimensions());
            let generator = ChatCompletionsClient::new(generation_url, api_key, retry);
            let coordinator =
                AnswerCoordinator::new(store, index, generator, encoder, model).with_top_k(top_k);

            let answer = coordinator.answer(&query).await?;
            println!("{}", answer.text);
            if !answer.supporting.is_empty() {
                println!();
                println!("Sources:");
                for record in &answer.supporting {
                    println!(
                        "  [{}] {} ({})",
                        record.id,
                        record.title.as_deref().unwrap_or("untitled"),
                        record.source_locator
                    );
                }
            }
        }
        Command::List { limit } => {
            let store = SqliteRecordStore::open(&database)?;
            let records = store.list_recent(limit).await?;
            if records.is_empty() {
                println!("no records");
            }
            for record in records {
                print_record(&record);
            }
        }
        Command::Reindex { id } => {
            let ingestor = open_ingestor(
                &database,
                &media_root,
                &qdrant_url,
                &collection,
                retry,
                encoder,
            )
            .await?;

            let record = ingestor.reindex_record(id).await?;
            print_record(&record);
        }
    }

    Ok(())
}

async fn open_ingestor(
    database: &Path,
    media_root: &Path,
    qdrant_url: &str,
    collection: &str,
    retry: RetryPolicy,
    encoder: Arc<dyn EmbeddingEncoder>,
) -> anyhow::Result<Ingestor<SqliteRecordStore, QdrantIndex, SourceExtractor>> {
    let store = SqliteRecordStore::open(database)?;
    let index = QdrantIndex::new(qdrant_url, collection, encoder.dimensions());
    index.ensure_collection().await?;

    let extractor = SourceExtractor::new(media_root, retry);
    Ok(Ingestor::new(store, index, extractor, encoder))
}

fn parse_web_source(value: &str) -> anyhow::Result<SourceType> {
    match value {
        "website" => Ok(SourceType::Website),
        "social-media" | "social_media" => Ok(SourceType::SocialMedia),
        other => {
            anyhow::bail!("unsupported source type {other:?}; expected website or social-media")
        }
    }
}

fn parse_metadata(raw: Option<&str>) -> anyhow::Result<Map<String, Value>> {
    match raw {
        None => Ok(Map::new()),
        Some(raw) => {
            let value: Value = serde_json::from_str(raw).context("metadata is not valid JSON")?;
            match value {
                Value::Object(map) => Ok(map),
                _ => anyhow::bail!("metadata must be a JSON object"),
            }
        }
    }
}

fn print_record(record: &Record) {
    let (state, message) = record.status.as_parts();
    println!(
        "[{}] {} {} status={} vector={}",
        record.id,
        record.source_type.as_str(),
        record.source_locator,
        state,
        record.vector_id.as_deref().unwrap_or("-"),
    );
    if let Some(title) = record.title.as_deref() {
        println!("  title: {title}");
    }
    if let Some(message) = message {
        println!("  error: {message}");
    }
}
