use crate::encoder::EmbeddingEncoder;
use crate::error::AnswerError;
use crate::generation::{GenerationClient, GenerationRequest};
use crate::models::{Answer, Record, VectorHit};
use crate::traits::{RecordStore, VectorIndex};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

pub const DEFAULT_TOP_K: usize = 5;

pub const SYSTEM_INSTRUCTION: &str = "You are an assistant for a personal knowledge base. \
     Answer using only the provided context drawn from the owner's ingested content.";

/// Query pipeline: encode, nearest-neighbor search, hydrate records,
/// generate. Unlike ingestion this path fails closed; any dead stage
/// surfaces as its own error instead of a degraded answer.
pub struct AnswerCoordinator<S, V, G>
where
    S: RecordStore,
    V: VectorIndex,
    G: GenerationClient,
{
    store: S,
    index: V,
    generator: G,
    encoder: Arc<dyn EmbeddingEncoder>,
    model: String,
    top_k: usize,
}

impl<S, V, G> AnswerCoordinator<S, V, G>
where
    S: RecordStore + Send + Sync,
    V: VectorIndex + Send + Sync,
    G: GenerationClient + Send + Sync,
{
    pub fn new(
        store: S,
        index: V,
        generator: G,
        encoder: Arc<dyn EmbeddingEncoder>,
        model: impl Into<String>,
    ) -> Self {
        Self {
            store,
            index,
            generator,
            encoder,
            model: model.into(),
            top_k: DEFAULT_TOP_K,
        }
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    pub async fn answer(&self, query: &str) -> Result<Answer, AnswerError> {
        if query.trim().is_empty() {
            return Err(AnswerError::EmptyQuery);
        }

        let embedding = self.encoder.encode(query)?;
        let hits = self.index.query(&embedding, self.top_k).await?;
        debug!(hits = hits.len(), "vector search complete");

        let supporting = self.hydrate_ranked(&hits).await?;
        let context: Vec<&str> = supporting
            .iter()
            .filter_map(|record| record.content.as_deref())
            .collect();

        let request = GenerationRequest::new(
            self.model.as_str(),
            SYSTEM_INSTRUCTION,
            build_user_turn(query, &context),
        );
        let text = self.generator.complete(&request).await?;
        info!(supporting = supporting.len(), "answer generated");

        Ok(Answer { text, supporting })
    }

    /// The index's similarity order is authoritative; the store only
    /// answers membership. Hits whose record has vanished are dropped.
    async fn hydrate_ranked(&self, hits: &[VectorHit]) -> Result<Vec<Record>, AnswerError> {
        let keys: Vec<String> = hits.iter().map(|hit| hit.key.clone()).collect();
        let records = self.store.by_vector_keys(&keys).await?;

        let mut by_key: HashMap<String, Record> = records
            .into_iter()
            .filter_map(|record| record.vector_id.clone().map(|key| (key, record)))
            .collect();

        Ok(hits
            .iter()
            .filter_map(|hit| by_key.remove(&hit.key))
            .collect())
    }
}

fn build_user_turn(query: &str, context: &[&str]) -> String {
    let mut turn = format!("Query: {query}\nContext:");
    if context.is_empty() {
        turn.push_str(" (no matching items)");
    } else {
        for item in context {
            turn.push_str("\n- ");
            turn.push_str(item);
        }
    }
    turn
}

#[cfg(test)]
mod tests {
    use super::{build_user_turn, AnswerCoordinator, DEFAULT_TOP_K};
    use crate::encoder::HashedNgramEncoder;
    use crate::error::{AnswerError, GenerationError, IndexError, StoreError};
    use crate::generation::{GenerationClient, GenerationRequest};
    use crate::keys::vector_key;
    use crate::models::{
        IngestStatus, NewRecord, Record, RecordId, SourceType, VectorEntry, VectorHit,
    };
    use crate::traits::{RecordStore, VectorIndex};
    use async_trait::async_trait;
    use chrono::Utc;
    use serde_json::Map;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    struct FakeStore {
        records: Vec<Record>,
    }

    #[async_trait]
    impl RecordStore for FakeStore {
        async fn insert(&self, _draft: NewRecord) -> Result<Record, StoreError> {
            unimplemented!("not used by the answer path")
        }

        async fn update(&self, _record: &Record) -> Result<Record, StoreError> {
            unimplemented!("not used by the answer path")
        }

        async fn get(&self, id: RecordId) -> Result<Record, StoreError> {
            self.records
                .iter()
                .find(|record| record.id == id)
                .cloned()
                .ok_or(StoreError::RecordNotFound(id))
        }

        async fn find_by_locator(&self, _locator: &str) -> Result<Option<Record>, StoreError> {
            Ok(None)
        }

        async fn by_vector_keys(&self, keys: &[String]) -> Result<Vec<Record>, StoreError> {
            // Deliberately id-sorted, not rank-sorted.
            let mut matched: Vec<Record> = self
                .records
                .iter()
                .filter(|record| {
                    record
                        .vector_id
                        .as_ref()
                        .is_some_and(|key| keys.contains(key))
                })
                .cloned()
                .collect();
            matched.sort_by_key(|record| record.id);
            Ok(matched)
        }

        async fn list_recent(&self, limit: usize) -> Result<Vec<Record>, StoreError> {
            Ok(self.records.iter().take(limit).cloned().collect())
        }
    }

    #[derive(Default)]
    struct FakeIndex {
        hits: Vec<VectorHit>,
        queries: AtomicUsize,
        last_top_k: AtomicUsize,
    }

    #[async_trait]
    impl VectorIndex for FakeIndex {
        async fn upsert(&self, _entry: &VectorEntry) -> Result<(), IndexError> {
            Ok(())
        }

        async fn query(&self, _embedding: &[f32], top_k: usize) -> Result<Vec<VectorHit>, IndexError> {
            self.queries.fetch_add(1, Ordering::SeqCst);
            self.last_top_k.store(top_k, Ordering::SeqCst);
            Ok(self.hits.clone())
        }
    }

    struct FakeGeneration {
        reply: String,
        fail_status: Option<u16>,
        calls: AtomicUsize,
        last_request: Mutex<Option<GenerationRequest>>,
    }

    impl FakeGeneration {
        fn replying(reply: &str) -> Self {
            Self {
                reply: reply.to_string(),
                fail_status: None,
                calls: AtomicUsize::new(0),
                last_request: Mutex::new(None),
            }
        }

        fn failing(status: u16) -> Self {
            Self {
                fail_status: Some(status),
                ..Self::replying("")
            }
        }

        fn last_user_turn(&self) -> String {
            let request = self.last_request.lock().unwrap();
            let request = request.as_ref().expect("a request was sent");
            request.messages[1].content.clone()
        }
    }

    #[async_trait]
    impl GenerationClient for FakeGeneration {
        async fn complete(&self, request: &GenerationRequest) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last_request.lock().unwrap() = Some(request.clone());
            if let Some(status) = self.fail_status {
                return Err(GenerationError::Status {
                    status,
                    body: "backend error".to_string(),
                });
            }
            Ok(self.reply.clone())
        }
    }

    fn record(id: i64, content: &str) -> Record {
        Record {
            id,
            title: Some(format!("Item {id}")),
            content: Some(content.to_string()),
            source_type: SourceType::Pdf,
            source_locator: format!("uploads/{id}.pdf"),
            vector_id: Some(vector_key(id)),
            status: IngestStatus::Ok,
            metadata: Map::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn hit(id: i64, score: f32) -> VectorHit {
        VectorHit {
            key: vector_key(id),
            score,
        }
    }

    fn coordinator(
        records: Vec<Record>,
        index: FakeIndex,
        generator: FakeGeneration,
    ) -> AnswerCoordinator<FakeStore, FakeIndex, FakeGeneration> {
        AnswerCoordinator::new(
            FakeStore { records },
            index,
            generator,
            Arc::new(HashedNgramEncoder::default()),
            "mixtral-8x7b-32768",
        )
    }

    #[tokio::test]
    async fn empty_query_is_rejected_before_any_backend_call() {
        let coordinator = coordinator(
            Vec::new(),
            FakeIndex::default(),
            FakeGeneration::replying("never"),
        );

        let error = coordinator.answer("   ").await.unwrap_err();
        assert!(matches!(error, AnswerError::EmptyQuery));
        assert_eq!(coordinator.index.queries.load(Ordering::SeqCst), 0);
        assert_eq!(coordinator.generator.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn supporting_records_follow_similarity_order() {
        let index = FakeIndex {
            hits: vec![hit(3, 0.92), hit(1, 0.78), hit(2, 0.55)],
            ..FakeIndex::default()
        };
        let coordinator = coordinator(
            vec![
                record(1, "content one"),
                record(2, "content two"),
                record(3, "content three"),
            ],
            index,
            FakeGeneration::replying("You work on databases."),
        );

        let answer = coordinator.answer("what do I work on?").await.expect("answer");

        let ids: Vec<i64> = answer.supporting.iter().map(|record| record.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
        assert_eq!(answer.text, "You work on databases.");

        let turn = coordinator.generator.last_user_turn();
        let third = turn.find("content three").expect("third present");
        let first = turn.find("content one").expect("first present");
        let second = turn.find("content two").expect("second present");
        assert!(third < first && first < second);
    }

    #[tokio::test]
    async fn stale_hits_without_records_are_dropped() {
        let index = FakeIndex {
            hits: vec![hit(99, 0.9), hit(1, 0.8)],
            ..FakeIndex::default()
        };
        let coordinator = coordinator(
            vec![record(1, "the only real one")],
            index,
            FakeGeneration::replying("ok"),
        );

        let answer = coordinator.answer("anything").await.expect("answer");
        let ids: Vec<i64> = answer.supporting.iter().map(|record| record.id).collect();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn no_hits_still_asks_the_generator() {
        let coordinator = coordinator(
            Vec::new(),
            FakeIndex::default(),
            FakeGeneration::replying("I have nothing on that."),
        );

        let answer = coordinator.answer("unknown topic").await.expect("answer");
        assert!(answer.supporting.is_empty());
        assert_eq!(answer.text, "I have nothing on that.");
        assert!(coordinator
            .generator
            .last_user_turn()
            .contains("(no matching items)"));
    }

    #[tokio::test]
    async fn generation_failure_propagates_with_status() {
        let index = FakeIndex {
            hits: vec![hit(1, 0.9)],
            ..FakeIndex::default()
        };
        let coordinator = coordinator(
            vec![record(1, "content")],
            index,
            FakeGeneration::failing(500),
        );

        let error = coordinator.answer("query").await.unwrap_err();
        assert!(matches!(
            error,
            AnswerError::Generation(GenerationError::Status { status: 500, .. })
        ));
    }

    #[tokio::test]
    async fn top_k_is_forwarded_to_the_index() {
        let by_default = coordinator(
            Vec::new(),
            FakeIndex::default(),
            FakeGeneration::replying("ok"),
        );
        by_default.answer("q").await.expect("answer");
        assert_eq!(
            by_default.index.last_top_k.load(Ordering::SeqCst),
            DEFAULT_TOP_K
        );

        let bounded = coordinator(
            Vec::new(),
            FakeIndex::default(),
            FakeGeneration::replying("ok"),
        )
        .with_top_k(2);
        bounded.answer("q").await.expect("answer");
        assert_eq!(bounded.index.last_top_k.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn user_turn_lists_context_in_order() {
        assert_eq!(
            build_user_turn("what do I do?", &["first", "second"]),
            "Query: what do I do?\nContext:\n- first\n- second"
        );
        assert_eq!(
            build_user_turn("what do I do?", &[]),
            "Query: what do I do?\nContext: (no matching items)"
        );
    }
}
