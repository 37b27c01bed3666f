use crate::error::IndexError;
use crate::keys::{record_id_of, vector_key};
use crate::models::{VectorEntry, VectorHit};
use crate::traits::VectorIndex;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

pub struct QdrantIndex {
    endpoint: String,
    collection: String,
    client: Client,
    vector_size: usize,
}

impl QdrantIndex {
    pub fn new(
        endpoint: impl Into<String>,
        collection: impl Into<String>,
        vector_size: usize,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            collection: collection.into(),
            client: Client::new(),
            vector_size,
        }
    }

    /// Creates the collection if the backend does not have it yet.
    pub async fn ensure_collection(&self) -> Result<(), IndexError> {
        let collection_url = format!("{}/collections/{}", self.endpoint, self.collection);

        let response = self.client.get(&collection_url).send().await?;
        if response.status().is_success() {
            return Ok(());
        }
        if response.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(response.status()));
        }

        let response = self
            .client
            .put(&collection_url)
            .json(&json!({
                "vectors": { "size": self.vector_size, "distance": "Cosine" }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantIndex {
    async fn upsert(&self, entry: &VectorEntry) -> Result<(), IndexError> {
        if entry.embedding.len() != self.vector_size {
            return Err(IndexError::DimensionMismatch {
                expected: self.vector_size,
                actual: entry.embedding.len(),
            });
        }

        // Qdrant accepts only numeric or UUID point ids, so the record
        // id inside the key is the point id; the string key is
        // reconstructed when hits come back.
        let point_id =
            record_id_of(&entry.key).ok_or_else(|| IndexError::BadKey(entry.key.clone()))?;

        let response = self
            .client
            .put(format!(
                "{}/collections/{}/points?wait=true",
                self.endpoint, self.collection
            ))
            .json(&json!({
                "points": [{
                    "id": point_id,
                    "vector": entry.embedding,
                    "payload": serde_json::to_value(&entry.payload)?,
                }]
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(())
    }

    async fn query(&self, embedding: &[f32], top_k: usize) -> Result<Vec<VectorHit>, IndexError> {
        if embedding.len() != self.vector_size {
            return Err(IndexError::DimensionMismatch {
                expected: self.vector_size,
                actual: embedding.len(),
            });
        }

        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/search",
                self.endpoint, self.collection
            ))
            .json(&json!({
                "vector": embedding,
                "limit": top_k,
                "with_payload": false,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        Ok(hits_from_response(&parsed))
    }
}

fn backend_error(status: StatusCode) -> IndexError {
    IndexError::BackendResponse {
        backend: "qdrant".to_string(),
        details: status.to_string(),
    }
}

fn hits_from_response(parsed: &Value) -> Vec<VectorHit> {
    let mut hits = Vec::new();
    if let Some(raw) = parsed.pointer("/result").and_then(Value::as_array) {
        for hit in raw {
            let Some(id) = hit.pointer("/id").and_then(Value::as_i64) else {
                continue;
            };
            let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
            hits.push(VectorHit {
                key: vector_key(id),
                score: score as f32,
            });
        }
    }
    hits
}
