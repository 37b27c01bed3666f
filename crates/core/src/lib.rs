pub mod answer;
pub mod encoder;
pub mod error;
pub mod extract;
pub mod generation;
pub mod ingest;
pub mod keys;
pub mod models;
pub mod retry;
pub mod stores;
pub mod traits;

pub use answer::{AnswerCoordinator, DEFAULT_TOP_K, SYSTEM_INSTRUCTION};
pub use encoder::{EmbeddingEncoder, HashedNgramEncoder, DEFAULT_EMBEDDING_DIMENSIONS};
pub use error::{
    AnswerError, EncodeError, ExtractError, GenerationError, IndexError, StoreError,
};
pub use extract::{
    ContentExtractor, PdfExtractor, SourceExtractor, WebExtractor, PDF_EMPTY_SENTINEL,
    WEB_EMPTY_SENTINEL,
};
pub use generation::{
    ChatCompletionsClient, ChatMessage, GenerationClient, GenerationRequest,
    DEFAULT_COMPLETIONS_URL, DEFAULT_MODEL,
};
pub use ingest::{discover_pdf_sources, CreateRequest, Ingestor};
pub use keys::{record_id_of, vector_key};
pub use models::{
    Answer, IngestStatus, NewRecord, Record, RecordId, SourceType, VectorEntry, VectorHit,
    VectorPayload,
};
pub use retry::RetryPolicy;
pub use stores::{QdrantIndex, SqliteRecordStore};
pub use traits::{RecordStore, VectorIndex};
