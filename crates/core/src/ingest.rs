use crate::encoder::EmbeddingEncoder;
use crate::error::StoreError;
use crate::extract::ContentExtractor;
use crate::keys::vector_key;
use crate::models::{
    IngestStatus, NewRecord, Record, RecordId, SourceType, VectorEntry, VectorPayload,
};
use crate::traits::{RecordStore, VectorIndex};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Caller input for one new record. `content` skips extraction when the
/// caller already holds the text, e.g. a pasted social post.
#[derive(Debug, Clone)]
pub struct CreateRequest {
    pub source_type: SourceType,
    pub source_locator: String,
    pub title: Option<String>,
    pub content: Option<String>,
    pub metadata: Map<String, Value>,
}

impl CreateRequest {
    pub fn new(source_type: SourceType, source_locator: impl Into<String>) -> Self {
        Self {
            source_type,
            source_locator: source_locator.into(),
            title: None,
            content: None,
            metadata: Map::new(),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Ingestion pipeline over the dual store.
///
/// The record row is written first and is never rolled back; extraction
/// and indexing failures land in the record's status instead of
/// propagating. Only the store itself can fail a call.
pub struct Ingestor<S, V, X> {
    store: S,
    index: V,
    extractor: X,
    encoder: Arc<dyn EmbeddingEncoder>,
}

impl<S, V, X> Ingestor<S, V, X>
where
    S: RecordStore + Send + Sync,
    V: VectorIndex + Send + Sync,
    X: ContentExtractor,
{
    pub fn new(store: S, index: V, extractor: X, encoder: Arc<dyn EmbeddingEncoder>) -> Self {
        Self {
            store,
            index,
            extractor,
            encoder,
        }
    }

    pub async fn create_record(&self, request: CreateRequest) -> Result<Record, StoreError> {
        if let Some(existing) = self.store.find_by_locator(&request.source_locator).await? {
            debug!(id = existing.id, locator = %request.source_locator, "locator already ingested");
            return Err(StoreError::DuplicateLocator(request.source_locator));
        }

        let (content, status) = match request.content {
            Some(content) => (content, IngestStatus::Ok),
            None => match self
                .extractor
                .extract(request.source_type, &request.source_locator)
                .await
            {
                Ok(text) => (text, IngestStatus::Ok),
                Err(error) => {
                    warn!(locator = %request.source_locator, %error, "content extraction failed");
                    (
                        format!("Error extracting content: {error}"),
                        IngestStatus::ExtractionFailed(error.to_string()),
                    )
                }
            },
        };

        let title = request
            .title
            .or_else(|| default_title(request.source_type, &request.source_locator));

        let record = self
            .store
            .insert(NewRecord {
                title,
                content: Some(content),
                source_type: request.source_type,
                source_locator: request.source_locator,
                status,
                metadata: request.metadata,
            })
            .await?;
        info!(
            id = record.id,
            source_type = record.source_type.as_str(),
            "record created"
        );

        self.embed_and_index(record).await
    }

    /// Re-runs the fallible half of ingestion for an existing record:
    /// extraction if that is what failed, then embedding and indexing.
    /// Safe on healthy records, where it refreshes the index entry.
    pub async fn reindex_record(&self, id: RecordId) -> Result<Record, StoreError> {
        let mut record = self.store.get(id).await?;

        if matches!(record.status, IngestStatus::ExtractionFailed(_)) {
            match self
                .extractor
                .extract(record.source_type, &record.source_locator)
                .await
            {
                Ok(text) => {
                    record.content = Some(text);
                    record.status = IngestStatus::Ok;
                }
                Err(error) => {
                    warn!(id, %error, "re-extraction failed");
                    record.content = Some(format!("Error extracting content: {error}"));
                    record.status = IngestStatus::ExtractionFailed(error.to_string());
                    return self.store.update(&record).await;
                }
            }
        } else {
            record.status = IngestStatus::Ok;
        }

        record.vector_id = None;
        let record = self.store.update(&record).await?;
        self.embed_and_index(record).await
    }

    /// Embeds and upserts, then persists the pairing. A failure here is
    /// absorbed into the status; the record and its content stay as
    /// they are.
    async fn embed_and_index(&self, mut record: Record) -> Result<Record, StoreError> {
        if !record.status.is_ok() || record.vector_id.is_some() {
            return Ok(record);
        }
        let content = match record.content.as_deref() {
            Some(content) if !content.is_empty() => content.to_string(),
            _ => return Ok(record),
        };

        match self.try_index(&record, &content).await {
            Ok(key) => {
                record.vector_id = Some(key);
                self.store.update(&record).await
            }
            Err(reason) => {
                warn!(id = record.id, %reason, "vector indexing failed; record kept without vector");
                record.vector_id = None;
                record.status = IngestStatus::IndexFailed(reason);
                self.store.update(&record).await
            }
        }
    }

    async fn try_index(&self, record: &Record, content: &str) -> Result<String, String> {
        let embedding = self
            .encoder
            .encode(content)
            .map_err(|error| error.to_string())?;
        let entry = VectorEntry {
            key: vector_key(record.id),
            embedding,
            payload: VectorPayload::from_record(record),
        };
        self.index
            .upsert(&entry)
            .await
            .map_err(|error| error.to_string())?;
        Ok(entry.key)
    }
}

fn default_title(source_type: SourceType, locator: &str) -> Option<String> {
    match source_type {
        SourceType::Pdf => Path::new(locator)
            .file_name()
            .map(|name| name.to_string_lossy().into_owned()),
        SourceType::SocialMedia | SourceType::Website => None,
    }
}

/// Every `.pdf` under `folder`, recursively, in stable order.
pub fn discover_pdf_sources(folder: &Path) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = WalkDir::new(folder)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            entry
                .path()
                .extension()
                .and_then(|extension| extension.to_str())
                .is_some_and(|extension| extension.eq_ignore_ascii_case("pdf"))
        })
        .map(|entry| entry.into_path())
        .collect();

    files.sort_unstable();
    files
}
