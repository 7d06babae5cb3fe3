//! The one real `ClusterClient`: drives a cluster's `_cat/nodes`,
//! `_cat/shards`, `_cluster/reroute`, and `_cluster/settings` endpoints
//! over `reqwest`. Mirrors `qgw-transport::EsClient` — a thin client
//! struct over one `reqwest::Client`, `Clone`-able rather than `Arc`-wrapped.

use async_trait::async_trait;
use serde_json::json;

use crate::cluster::{ClusterClient, RerouteCmd};
use crate::error::{Error, Result};
use crate::model::{ShardState, ZoneConfig};

#[derive(Clone)]
pub struct HttpClusterClient {
    http: reqwest::Client,
    base_url: String,
    zone_table: Vec<ZoneConfig>,
}

impl HttpClusterClient {
    pub fn new(base_url: impl Into<String>, zone_table: Vec<ZoneConfig>) -> Self {
        HttpClusterClient { http: reqwest::Client::new(), base_url: base_url.into(), zone_table }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn get_text(&self, path: &str) -> Result<String> {
        let resp = self.http.get(self.url(path)).send().await.map_err(|e| Error::Cluster(e.into()))?;
        resp.text().await.map_err(|e| Error::Cluster(e.into()))
    }
}

#[async_trait]
impl ClusterClient for HttpClusterClient {
    async fn cat_nodes(&self) -> Result<String> {
        self.get_text("_cat/nodes?v&h=n,r,d,i,hm").await
    }

    async fn cat_shards(&self) -> Result<String> {
        self.get_text("_cat/shards?v&h=index,shard,prirep,state,node,store").await
    }

    fn zone_table(&self) -> &[ZoneConfig] {
        &self.zone_table
    }

    async fn submit_reroute(&self, commands: &[RerouteCmd]) -> Result<()> {
        if commands.is_empty() {
            return Ok(());
        }
        let commands_json: Vec<_> = commands
            .iter()
            .map(|c| match c.state {
                ShardState::Unassigned => json!({
                    "allocate": {
                        "index": c.index,
                        "shard": c.shard,
                        "node": c.to_node,
                    }
                }),
                _ => json!({
                    "move": {
                        "index": c.index,
                        "shard": c.shard,
                        "from_node": c.from_node,
                        "to_node": c.to_node,
                    }
                }),
            })
            .collect();
        let body = json!({"commands": commands_json});

        self.http
            .post(self.url("_cluster/reroute"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Cluster(e.into()))?
            .error_for_status()
            .map_err(|e| Error::Cluster(e.into()))?;
        Ok(())
    }

    async fn set_allocation_enabled(&self, enabled: bool) -> Result<()> {
        let value = if enabled { "all" } else { "none" };
        let body = json!({"transient": {"cluster.routing.allocation.enable": value}});

        self.http
            .put(self.url("_cluster/settings"))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Cluster(e.into()))?
            .error_for_status()
            .map_err(|e| Error::Cluster(e.into()))?;
        Ok(())
    }
}
