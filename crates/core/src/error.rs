use thiserror::Error;

/// Failures while turning a source locator into text content.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("source not found: {0}")]
    NotFound(String),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("unsupported url scheme: {0}")]
    UnsupportedScheme(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("embedding failed: {0}")]
    Failed(String),
}

/// Failures of the relational record store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("a record with source locator {0} already exists")]
    DuplicateLocator(String),

    #[error("no record with id {0}")]
    RecordNotFound(i64),

    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("metadata serialize error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("record store lock poisoned")]
    LockPoisoned,
}

/// Failures of the vector index backend.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("malformed vector key: {0}")]
    BadKey(String),

    #[error("embedding has {actual} dimensions, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Failures while producing an answer from the generation backend.
#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation request failed: {0}")]
    Transport(String),

    #[error("generation backend returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed generation response: {0}")]
    MalformedResponse(String),
}

/// Everything the query path can fail with. Each stage keeps its own
/// variant so callers can tell a dead index from a dead generation
/// backend.
#[derive(Debug, Error)]
pub enum AnswerError {
    #[error("query is empty")]
    EmptyQuery,

    #[error(transparent)]
    Encode(#[from] EncodeError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Generation(#[from] GenerationError),
}

pub type Result<T, E = StoreError> = std::result::Result<T, E>;
