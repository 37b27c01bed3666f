//! Text-to-vector encoding.
//!
//! Ingestion and retrieval must agree on the encoder instance: vectors
//! persisted in the index are only comparable to query vectors produced
//! by the same encoding. Pipelines therefore take an
//! `Arc<dyn EmbeddingEncoder>` handle instead of constructing their own.

use crate::error::EncodeError;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

pub trait EmbeddingEncoder: Send + Sync {
    fn dimensions(&self) -> usize;
    fn encode(&self, text: &str) -> Result<Vec<f32>, EncodeError>;
}

/// Signed feature hashing over words and character trigrams, L2
/// normalized so scores behave under cosine distance.
///
/// Construction fills an 8x256 mixing table from a fixed seed, so the
/// same text encodes to the same vector in every process. Changing
/// `TABLE_SEED` invalidates every vector already in the index.
pub struct HashedNgramEncoder {
    dimensions: usize,
    table: Box<[[u64; 256]; 8]>,
}

const TABLE_SEED: u64 = 1469598103934665603;

impl Default for HashedNgramEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_EMBEDDING_DIMENSIONS)
    }
}

impl HashedNgramEncoder {
    pub fn new(dimensions: usize) -> Self {
        let mut state = TABLE_SEED;
        let mut table = Box::new([[0u64; 256]; 8]);
        for row in table.iter_mut() {
            for slot in row.iter_mut() {
                *slot = splitmix64(&mut state);
            }
        }
        Self {
            dimensions: dimensions.max(1),
            table,
        }
    }

    fn hash_token(&self, token: &str) -> u64 {
        let mut hash = TABLE_SEED;
        for (index, byte) in token.bytes().enumerate() {
            hash ^= self.table[index & 7][byte as usize];
            hash = hash.rotate_left(5).wrapping_mul(1099511628211);
        }
        hash
    }

    fn accumulate(&self, token: &str, vector: &mut [f32]) {
        let hash = self.hash_token(token);
        let bucket = (hash % vector.len() as u64) as usize;
        let sign = if hash >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }
}

impl EmbeddingEncoder for HashedNgramEncoder {
    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn encode(&self, text: &str) -> Result<Vec<f32>, EncodeError> {
        let mut vector = vec![0f32; self.dimensions];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return Ok(vector);
        }

        for word in lowered.split_whitespace() {
            self.accumulate(word, &mut vector);
        }

        let mut trigram = String::new();
        for window in chars.windows(3) {
            trigram.clear();
            trigram.extend(window);
            self.accumulate(&trigram, &mut vector);
        }

        l2_normalize(&mut vector);
        Ok(vector)
    }
}

fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9E3779B97F4A7C15);
    let mut mixed = *state;
    mixed = (mixed ^ (mixed >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    mixed = (mixed ^ (mixed >> 27)).wrapping_mul(0x94D049BB133111EB);
    mixed ^ (mixed >> 31)
}

fn l2_normalize(vector: &mut [f32]) {
    let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
    if magnitude > 0.0 {
        for value in vector {
            *value /= magnitude;
        }
    }
}
