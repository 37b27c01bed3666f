use crate::error::{IndexError, StoreError};
use crate::models::{NewRecord, Record, RecordId, VectorEntry, VectorHit};
use async_trait::async_trait;

/// Relational side of the dual store. Rows here are the source of
/// truth; the vector index is derived from them.
#[async_trait]
pub trait RecordStore {
    async fn insert(&self, draft: NewRecord) -> Result<Record, StoreError>;

    /// Persists every mutable field of `record`, returning the stored
    /// view with a refreshed `updated_at`.
    async fn update(&self, record: &Record) -> Result<Record, StoreError>;

    async fn get(&self, id: RecordId) -> Result<Record, StoreError>;

    async fn find_by_locator(&self, locator: &str) -> Result<Option<Record>, StoreError>;

    /// Membership lookup; callers impose their own ordering on the
    /// result.
    async fn by_vector_keys(&self, keys: &[String]) -> Result<Vec<Record>, StoreError>;

    async fn list_recent(&self, limit: usize) -> Result<Vec<Record>, StoreError>;
}

#[async_trait]
pub trait VectorIndex {
    /// Insert-or-replace under the entry's key.
    async fn upsert(&self, entry: &VectorEntry) -> Result<(), IndexError>;

    /// Keys of the `top_k` nearest entries, most similar first.
    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<VectorHit>, IndexError>;
}
