use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type RecordId = i64;

/// Payload content is truncated to this many characters before it is
/// mirrored into the vector index.
pub const PAYLOAD_CONTENT_LIMIT: usize = 1_000;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Pdf,
    SocialMedia,
    Website,
}

impl SourceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::Pdf => "pdf",
            SourceType::SocialMedia => "social_media",
            SourceType::Website => "website",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pdf" => Some(SourceType::Pdf),
            "social_media" => Some(SourceType::SocialMedia),
            "website" => Some(SourceType::Website),
            _ => None,
        }
    }
}

/// Outcome of the ingestion pipeline for one record. A record is kept
/// even when a stage fails; this field says which stage, so the content
/// column never has to double as an error channel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum IngestStatus {
    Ok,
    ExtractionFailed(String),
    IndexFailed(String),
}

impl IngestStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, IngestStatus::Ok)
    }

    pub fn as_parts(&self) -> (&'static str, Option<&str>) {
        match self {
            IngestStatus::Ok => ("ok", None),
            IngestStatus::ExtractionFailed(message) => ("extraction_failed", Some(message)),
            IngestStatus::IndexFailed(message) => ("index_failed", Some(message)),
        }
    }

    pub fn from_parts(state: &str, message: Option<String>) -> Option<Self> {
        match state {
            "ok" => Some(IngestStatus::Ok),
            "extraction_failed" => Some(IngestStatus::ExtractionFailed(message.unwrap_or_default())),
            "index_failed" => Some(IngestStatus::IndexFailed(message.unwrap_or_default())),
            _ => None,
        }
    }
}

/// One ingested item as the record store persists it. `vector_id` is
/// `Some` exactly when the vector index holds an entry for this record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Record {
    pub id: RecordId,
    pub title: Option<String>,
    pub content: Option<String>,
    pub source_type: SourceType,
    pub source_locator: String,
    pub vector_id: Option<String>,
    pub status: IngestStatus,
    pub metadata: Map<String, Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Caller-facing fields of a record before the store assigns an id and
/// timestamps.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub title: Option<String>,
    pub content: Option<String>,
    pub source_type: SourceType,
    pub source_locator: String,
    pub status: IngestStatus,
    pub metadata: Map<String, Value>,
}

/// Denormalized snapshot stored alongside each vector so the index is
/// useful to consumers that cannot reach the record store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorPayload {
    pub title: String,
    pub content: String,
    pub source_type: String,
    pub source_locator: String,
    pub metadata: String,
}

impl VectorPayload {
    pub fn from_record(record: &Record) -> Self {
        let content = record.content.as_deref().unwrap_or_default();
        Self {
            title: record.title.clone().unwrap_or_default(),
            content: truncate_chars(content, PAYLOAD_CONTENT_LIMIT),
            source_type: record.source_type.as_str().to_string(),
            source_locator: record.source_locator.clone(),
            metadata: serde_json::to_string(&record.metadata)
                .unwrap_or_else(|_| "{}".to_string()),
        }
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub key: String,
    pub embedding: Vec<f32>,
    pub payload: VectorPayload,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VectorHit {
    pub key: String,
    pub score: f32,
}

/// Generated answer plus the records whose content backed it, in
/// similarity order.
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub supporting: Vec<Record>,
}
