mod app;
mod config;
mod errors;
mod handlers;
mod saved_queries;

use std::collections::HashMap;
use std::sync::Arc;

use actix_web::HttpServer;
use structopt::StructOpt;
use tokio::sync::watch;

use qgw_core::schema::MapSchema;
use qgw_shard_controller::controller::Controller;
use qgw_shard_controller::http_client::HttpClusterClient;
use qgw_shard_controller::model::ZoneConfig;

use crate::app::AppState;
use crate::config::Settings;
use crate::saved_queries::MemorySavedQueries;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    pretty_env_logger::init();
    let settings = Settings::from_args();

    // Real schema discovery is out of scope; an empty schema means every
    // query will fail to resolve a column until something populates it
    // (a config-loaded `MapSchema`, or a discovery collaborator wired in
    // by the deployment).
    let schema: Arc<dyn qgw_core::schema::Schema> = Arc::new(MapSchema::new());
    let backend: Box<dyn qgw_core::backend::EsBackend> = Box::new(qgw_transport::EsClient::new(settings.es_url.clone()));
    let saved_queries = Arc::new(MemorySavedQueries::new());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    if let Some(cluster_url) = settings.cluster_url.clone() {
        let targets = load_shard_targets(settings.shard_targets_path.as_deref());
        let zone_table = load_zone_table(settings.zone_table_path.as_deref());
        let client = HttpClusterClient::new(cluster_url, zone_table);
        let controller = Controller::new(client, targets, settings.max_concurrent_reroutes);
        let rx = shutdown_rx.clone();
        tokio::spawn(async move {
            controller.run(rx).await;
        });
    }

    let bind = settings.bind.clone();
    let state = Arc::new(AppState { settings, schema, backend, saved_queries });

    let server = HttpServer::new(move || app::create_app(state.clone())).bind(&bind)?.run();

    tokio::select! {
        result = server => result,
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutting down");
            let _ = shutdown_tx.send(true);
            Ok(())
        }
    }
}

fn load_shard_targets(path: Option<&str>) -> HashMap<String, usize> {
    match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
            Err(e) => {
                log::warn!("could not read shard targets at {}: {}", p, e);
                HashMap::new()
            }
        },
        None => HashMap::new(),
    }
}

fn load_zone_table(path: Option<&str>) -> Vec<ZoneConfig> {
    match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(text) => serde_json::from_str(&text).unwrap_or_default(),
            Err(e) => {
                log::warn!("could not read zone table at {}: {}", p, e);
                Vec::new()
            }
        },
        None => Vec::new(),
    }
}
