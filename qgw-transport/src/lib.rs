//! The one concrete `EsBackend`: a `reqwest` client that POSTs a
//! compiled query body to `{base_url}/{index}/_search` and hands back
//! the parsed JSON. Mirrors how `tesseract-postgres` wraps one
//! connection pool behind `Backend` — a single struct holding a client
//! handle, `box_clone`d per query rather than shared by `Arc` (the
//! underlying `reqwest::Client` is already cheap to clone).

use async_trait::async_trait;
use qgw_core::backend::EsBackend;
use qgw_core::error::{Error, Result};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("elasticsearch returned {status}: {body}")]
    BadStatus { status: u16, body: String },

    #[error(transparent)]
    Http(#[from] reqwest::Error),
}

#[derive(Clone)]
pub struct EsClient {
    http: reqwest::Client,
    base_url: String,
}

impl EsClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        EsClient { http: reqwest::Client::new(), base_url: base_url.into() }
    }

    pub fn with_client(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        EsClient { http, base_url: base_url.into() }
    }
}

#[async_trait]
impl EsBackend for EsClient {
    async fn execute(&self, index: &str, body: Value) -> Result<Value> {
        let url = format!("{}/{}/_search", self.base_url.trim_end_matches('/'), index);
        let resp = self.http.post(&url).json(&body).send().await.map_err(|e| Error::Upstream(e.into()))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::Upstream(TransportError::BadStatus { status: status.as_u16(), body: text }.into()));
        }
        resp.json::<Value>().await.map_err(|e| Error::Upstream(e.into()))
    }

    fn box_clone(&self) -> Box<dyn EsBackend> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = EsClient::new("http://localhost:9200/");
        assert_eq!(client.base_url.trim_end_matches('/'), "http://localhost:9200");
    }
}
