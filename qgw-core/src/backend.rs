//! The seam between the compiler and whatever actually talks to
//! Elasticsearch. The compiler only ever depends on this trait, never on
//! a concrete HTTP client, so `qgw-transport`'s implementation (and a
//! fake one in tests) are interchangeable.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

#[async_trait]
pub trait EsBackend: Send + Sync {
    /// Executes a compiled query body against `index` and returns the
    /// raw `aggregations` subtree (or `hits` for a non-aggregating
    /// query — callers distinguish by whether they compiled any
    /// decoders).
    async fn execute(&self, index: &str, body: Value) -> Result<Value>;

    fn box_clone(&self) -> Box<dyn EsBackend>;
}

impl Clone for Box<dyn EsBackend> {
    fn clone(&self) -> Self {
        self.box_clone()
    }
}
