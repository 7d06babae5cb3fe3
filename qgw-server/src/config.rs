//! Process configuration: a `structopt`-plus-env struct where everything
//! is a flag with a sensible default, so the binary runs with zero
//! configuration in development.

use structopt::StructOpt;

#[derive(Debug, Clone, StructOpt)]
#[structopt(name = "qgw-server")]
pub struct Settings {
    #[structopt(long, env = "QGW_BIND", default_value = "127.0.0.1:7878")]
    pub bind: String,

    #[structopt(long, env = "QGW_ES_URL", default_value = "http://localhost:9200")]
    pub es_url: String,

    #[structopt(long, env = "QGW_DEBUG")]
    pub debug: bool,

    /// Seconds to wait for a `meta.testing` query's index to exist
    /// before giving up with `SchemaTimeout`.
    #[structopt(long, env = "QGW_SCHEMA_WAIT_SECS", default_value = "30")]
    pub schema_wait_secs: u64,

    /// If set, the shard placement controller polls this cluster instead
    /// of staying dormant.
    #[structopt(long, env = "QGW_CLUSTER_URL")]
    pub cluster_url: Option<String>,

    /// Path to a JSON document of `{"index_name": replica_target}`; read
    /// once at startup. Missing when `cluster_url` is unset.
    #[structopt(long, env = "QGW_SHARD_TARGETS_PATH")]
    pub shard_targets_path: Option<String>,

    /// Path to a JSON array of `{"name","risky","shards"}` zone-table
    /// rows, mapping the zone names embedded in node names to their
    /// risk/replica configuration. Missing when `cluster_url` is unset.
    #[structopt(long, env = "QGW_ZONE_TABLE_PATH")]
    pub zone_table_path: Option<String>,

    #[structopt(long, env = "QGW_MAX_CONCURRENT_REROUTES", default_value = "1")]
    pub max_concurrent_reroutes: usize,
}

impl Settings {
    pub fn from_env() -> Self {
        Settings::from_args()
    }
}
