//! Keeps an Elasticsearch cluster's shard placement balanced across
//! zones: polls `_cat/nodes` and `_cat/shards`, runs the six-phase
//! placement objective, and submits reroute commands for whatever the
//! highest-priority problem class currently is.

pub mod cluster;
pub mod controller;
pub mod error;
pub mod http_client;
pub mod model;
pub mod objective;
pub mod reroute;

pub use error::{Error, Result};
