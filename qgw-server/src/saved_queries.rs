//! Every `/query` request is remembered under the SHA-256 hex digest of
//! its raw JSON body, so `GET /find/<hash>` can hand the same query back
//! later (the original's "link to this query" workflow). The in-memory
//! store is the only implementation; a deployment that needs the links
//! to survive a restart swaps in something durable behind the same
//! trait.

use std::collections::HashMap;
use std::sync::RwLock;

use sha2::{Digest, Sha256};

pub trait SavedQueryStore: Send + Sync {
    fn save(&self, body: &str) -> String;
    fn find(&self, hash: &str) -> Option<String>;
}

pub fn hash_of(body: &str) -> String {
    let digest = Sha256::digest(body.as_bytes());
    hex::encode(digest)
}

#[derive(Default)]
pub struct MemorySavedQueries {
    store: RwLock<HashMap<String, String>>,
}

impl MemorySavedQueries {
    pub fn new() -> Self {
        MemorySavedQueries::default()
    }
}

impl SavedQueryStore for MemorySavedQueries {
    fn save(&self, body: &str) -> String {
        let hash = hash_of(body);
        self.store.write().unwrap().insert(hash.clone(), body.to_string());
        hash
    }

    fn find(&self, hash: &str) -> Option<String> {
        self.store.read().unwrap().get(hash).cloned()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn saved_query_round_trips_by_hash() {
        let store = MemorySavedQueries::new();
        let hash = store.save(r#"{"from":"incidents"}"#);
        assert_eq!(store.find(&hash).as_deref(), Some(r#"{"from":"incidents"}"#));
    }

    #[test]
    fn unknown_hash_returns_none() {
        let store = MemorySavedQueries::new();
        assert!(store.find("deadbeef").is_none());
    }
}
