//! Derivation of vector-index keys from record ids.
//!
//! The string form `item_{id}` is what the record store persists in
//! `vector_id` and what external consumers of the index see. Both sides
//! of the mapping live here so the format exists in exactly one place.

use crate::models::RecordId;

pub const VECTOR_KEY_PREFIX: &str = "item_";

pub fn vector_key(id: RecordId) -> String {
    format!("{VECTOR_KEY_PREFIX}{id}")
}

pub fn record_id_of(key: &str) -> Option<RecordId> {
    key.strip_prefix(VECTOR_KEY_PREFIX)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_matches_persisted_format() {
        assert_eq!(vector_key(42), "item_42");
        assert_eq!(vector_key(1), "item_1");
    }

    #[test]
    fn id_recovered_from_key() {
        assert_eq!(record_id_of("item_42"), Some(42));
        assert_eq!(record_id_of(&vector_key(900)), Some(900));
    }

    #[test]
    fn foreign_keys_rejected() {
        assert_eq!(record_id_of("chunk_42"), None);
        assert_eq!(record_id_of("item_"), None);
        assert_eq!(record_id_of("item_abc"), None);
        assert_eq!(record_id_of(""), None);
    }
}
