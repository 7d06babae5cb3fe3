//! Compiles a dimensional query into an Elasticsearch aggregation
//! request, runs it through a `backend::EsBackend`, and reshapes the
//! response back into the shape the caller asked for. No networking, no
//! HTTP types — those live in `qgw-transport` and `qgw-server`
//! respectively; this crate is the pure compile/walk/format pipeline.

pub mod aggregate_builder;
pub mod backend;
pub mod compiler;
pub mod decoders;
pub mod error;
pub mod esquery;
pub mod expr;
pub mod format;
pub mod planner;
pub mod query;
pub mod schema;
pub mod walker;
pub mod where_splitter;

pub use error::{Error, Result};

use backend::EsBackend;
use query::Query;
use schema::Schema;
use serde_json::Value;

/// Compiles `query` against `schema`, executes it on `backend`, walks
/// the response and formats it. The one call most callers need; the
/// individual stages (`compiler::compile`, `walker::ResultWalker`,
/// `format::Formatter`) are public for callers that need to inspect or
/// cache the compiled query body separately.
pub async fn run(query: &Query, schema: &dyn Schema, backend: &dyn EsBackend) -> Result<Value> {
    let mut compiled = compiler::compile(query, schema)?;
    let response = backend.execute(&query.from, compiled.es_query.clone()).await?;

    let aggs = response.get("aggregations").cloned().unwrap_or(response);
    let pulls: Vec<(String, aggregate_builder::Pull)> = compiled.pulls.drain().collect();
    let rows = walker::ResultWalker::walk(&aggs, &mut compiled.decoders, &pulls);

    Ok(format::Formatter::format(query.format, &compiled.decoders, &query.select, &rows))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::EsBackend;
    use crate::expr::Expr;
    use crate::query::{AggKind, Edge, SelectClause};
    use crate::schema::{Column, MapSchema, TypeTag};
    use async_trait::async_trait;
    use serde_json::json;

    struct FakeBackend {
        response: Value,
    }

    #[async_trait]
    impl EsBackend for FakeBackend {
        async fn execute(&self, _index: &str, _body: Value) -> Result<Value> {
            Ok(self.response.clone())
        }

        fn box_clone(&self) -> Box<dyn EsBackend> {
            Box::new(FakeBackend { response: self.response.clone() })
        }
    }

    #[tokio::test]
    async fn run_compiles_executes_and_formats() {
        let schema = MapSchema::new().with_column("incidents.status", Column::root("status", TypeTag::String));
        let mut query = Query::new("incidents");
        query.edges.push(Edge::new("status", Expr::var("status")));
        query.select.push(SelectClause { name: "count".to_string(), value: Expr::var("."), aggregate: AggKind::Count, percentile: None, limit: None });
        query.format = query::Format::Table;

        let backend = FakeBackend {
            response: json!({
                "aggregations": {
                    "_match": {
                        "buckets": [
                            {"key": "open", "doc_count": 4},
                            {"key": "closed", "doc_count": 9}
                        ]
                    }
                }
            }),
        };

        let out = run(&query, &schema, &backend).await.unwrap();
        assert_eq!(out["header"], json!(["status", "count"]));
        // Rows come out in response-bucket order; only each edge's
        // *domain* (used to label the coordinate) is sorted.
        assert_eq!(out["data"][0], json!(["open", 4]));
        assert_eq!(out["data"][1], json!(["closed", 9]));
    }
}
