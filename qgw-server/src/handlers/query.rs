//! `POST /query`: interpolate, parse, optionally wait for the target
//! index's schema to appear (`meta.testing`), compile, execute, and wrap
//! the result in a response envelope carrying timing and the compiled
//! query body for debugging.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use actix_web::{web, HttpRequest, HttpResponse};
use serde_json::json;

use qgw_core::query::Query;

use crate::app::AppState;
use crate::errors::ServerError;
use crate::handlers::interpolate::interpolate;

pub async fn query_handler(
    req: HttpRequest,
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, ServerError> {
    let params: HashMap<String, String> = req.query_string().split('&').filter(|s| !s.is_empty()).filter_map(|pair| {
        let mut parts = pair.splitn(2, '=');
        let key = parts.next()?.to_string();
        let value = parts.next().unwrap_or("").to_string();
        Some((key, value))
    }).collect();

    let raw = std::str::from_utf8(&body).map_err(|e| ServerError::BadRequest(e.to_string()))?;
    let now_unix = chrono::Utc::now().timestamp();
    let interpolated = interpolate(raw, &params, now_unix);

    state.saved_queries.save(&interpolated);

    let query: Query = serde_json::from_str(&interpolated).map_err(|e| ServerError::BadRequest(e.to_string()))?;

    if query.meta_testing {
        wait_for_schema(&state, &query.from).await?;
    }

    let started = Instant::now();
    let es_query = qgw_core::compiler::compile(&query, state.schema.as_ref())?.es_query;
    let result = qgw_core::run(&query, state.schema.as_ref(), state.backend.as_ref()).await?;
    let elapsed_ms = started.elapsed().as_millis() as u64;

    Ok(HttpResponse::Ok().json(json!({
        "data": result,
        "meta": {
            "timing": elapsed_ms,
            "content_type": "application/json",
            "es_query": es_query,
        },
    })))
}

async fn wait_for_schema(state: &AppState, from: &str) -> Result<(), ServerError> {
    let bound = Duration::from_secs(state.settings.schema_wait_secs);
    let deadline = Instant::now() + bound;

    loop {
        if !state.schema.leaves(from).is_empty() {
            return Ok(());
        }
        if Instant::now() >= deadline {
            return Err(ServerError::Compile(qgw_core::Error::SchemaTimeout));
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use qgw_core::schema::MapSchema;

    fn test_settings(schema_wait_secs: u64) -> crate::config::Settings {
        crate::config::Settings {
            bind: "x".into(),
            es_url: "x".into(),
            debug: false,
            schema_wait_secs,
            cluster_url: None,
            shard_targets_path: None,
            max_concurrent_reroutes: 1,
        }
    }

    #[tokio::test]
    async fn wait_for_schema_returns_immediately_when_present() {
        let schema = MapSchema::new().with_column("incidents.status", qgw_core::schema::Column::root("status", qgw_core::schema::TypeTag::String));
        let state = AppState {
            settings: test_settings(1),
            schema: Arc::new(schema),
            backend: Box::new(NullBackend),
            saved_queries: Arc::new(crate::saved_queries::MemorySavedQueries::new()),
        };
        assert!(wait_for_schema(&state, "incidents").await.is_ok());
    }

    #[tokio::test]
    async fn wait_for_schema_times_out_when_absent() {
        let state = AppState {
            settings: test_settings(0),
            schema: Arc::new(MapSchema::new()),
            backend: Box::new(NullBackend),
            saved_queries: Arc::new(crate::saved_queries::MemorySavedQueries::new()),
        };
        let err = wait_for_schema(&state, "incidents").await.unwrap_err();
        assert!(matches!(err, ServerError::Compile(qgw_core::Error::SchemaTimeout)));
    }

    struct NullBackend;

    #[async_trait::async_trait]
    impl qgw_core::backend::EsBackend for NullBackend {
        async fn execute(&self, _index: &str, _body: serde_json::Value) -> qgw_core::Result<serde_json::Value> {
            Ok(json!({}))
        }
        fn box_clone(&self) -> Box<dyn qgw_core::backend::EsBackend> {
            Box::new(NullBackend)
        }
    }
}
