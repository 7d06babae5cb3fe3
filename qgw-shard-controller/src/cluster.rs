//! Talks to the cluster's `_cat` endpoints and parses their plain-text
//! tables back into `ClusterState`. Mirrors `convert_table_to_list` /
//! `text_to_bytes`'s header-driven, whitespace-delimited parsing rather
//! than assuming any particular column order.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_derive::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{ClusterState, Node, Shard, ShardState, Zone, ZoneConfig};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RerouteCmd {
    pub index: String,
    pub shard: u32,
    pub from_node: String,
    pub to_node: String,
    /// The shard's state *before* this command, not after — dictates
    /// whether submitting it is an `allocate` (the shard has nowhere to
    /// go yet) or a `move` (it's already serving somewhere else).
    pub state: ShardState,
}

#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn cat_nodes(&self) -> Result<String>;
    async fn cat_shards(&self) -> Result<String>;
    async fn submit_reroute(&self, commands: &[RerouteCmd]) -> Result<()>;
    async fn set_allocation_enabled(&self, enabled: bool) -> Result<()>;

    /// Zone risk/replica-target configuration, keyed by the zone name
    /// embedded in node names. Clients with nothing configured leave the
    /// whole cluster in default (non-risky, one shard per zone) zones.
    fn zone_table(&self) -> &[ZoneConfig] {
        &[]
    }

    async fn fetch(&self) -> Result<ClusterState> {
        let nodes = parse_nodes(&self.cat_nodes().await?, self.zone_table())?;
        let shards = parse_shards(&self.cat_shards().await?)?;
        Ok(ClusterState { nodes, shards })
    }
}

/// Splits a `_cat/*?v` response into `(header, rows)`, each row a
/// `column name -> cell` map so callers don't depend on column order.
fn convert_table_to_list(text: &str) -> Vec<HashMap<String, String>> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<String> = match lines.next() {
        Some(h) => h.split_whitespace().map(|s| s.to_string()).collect(),
        None => return vec![],
    };

    lines
        .map(|line| {
            let cells: Vec<&str> = line.split_whitespace().collect();
            header.iter().cloned().zip(cells.into_iter().map(|c| c.to_string())).collect()
        })
        .collect()
}

/// Parses a human-readable ES size (`"12.3gb"`, `"512kb"`, `"900b"`)
/// into bytes. `_cat` responses use `-1` or `""` for "unknown", both of
/// which parse to `0`.
fn text_to_bytes(text: &str) -> u64 {
    let t = text.trim().to_lowercase();
    if t.is_empty() || t == "-1" {
        return 0;
    }
    let (number_part, unit) = t.split_at(t.find(|c: char| c.is_alphabetic()).unwrap_or(t.len()));
    let number: f64 = number_part.parse().unwrap_or(0.0);
    let multiplier: f64 = match unit {
        "b" | "" => 1.0,
        "kb" => 1024.0,
        "mb" => 1024.0 * 1024.0,
        "gb" => 1024.0 * 1024.0 * 1024.0,
        "tb" => 1024.0 * 1024.0 * 1024.0 * 1024.0,
        _ => 1.0,
    };
    (number * multiplier) as u64
}

fn parse_nodes(text: &str, zone_table: &[ZoneConfig]) -> Result<Vec<Node>> {
    convert_table_to_list(text)
        .into_iter()
        .map(|row| {
            let name = cell(&row, "n", "nodes")?;
            let roles = row.get("r").cloned().unwrap_or_default();
            let role = if roles.contains('d') { "d" } else { "m" }.to_string();
            let memory = row.get("hm").map(|s| text_to_bytes(s)).unwrap_or(0);
            let zone = zone_for_node(&name, zone_table);
            Ok(Node { name, zone, role, memory })
        })
        .collect()
}

/// Node-name convention for telling zones and risky nodes apart without a
/// real `zone` column: `coord*` is a non-data coordinating node with no
/// zone of its own; `spot_<zone>_<ordinal>` is a risky spot-priced data
/// node in `<zone>`; anything else is a regular data node in the zone
/// named by its own prefix. Mirrors `assign_shards`'s
/// `n.name.startswith("spot_") or n.name.startswith("coord")` check.
fn zone_for_node(name: &str, table: &[ZoneConfig]) -> Zone {
    if name.starts_with("coord") {
        return Zone::new("coord");
    }
    let (zone_name, risky) = match name.strip_prefix("spot_") {
        Some(rest) => (strip_ordinal(rest), true),
        None => (strip_ordinal(name.strip_prefix("data_").unwrap_or(name)), false),
    };
    table
        .iter()
        .find(|z| z.name == zone_name)
        .map(|z| Zone { name: z.name.clone(), risky: z.risky, shards: z.shards })
        .unwrap_or_else(|| if risky { Zone::risky(zone_name, 1) } else { Zone::safe(zone_name, 1) })
}

fn strip_ordinal(name: &str) -> String {
    match name.rsplit_once('_') {
        Some((rest, suffix)) if !suffix.is_empty() && suffix.chars().all(|c| c.is_ascii_digit()) => rest.to_string(),
        _ => name.to_string(),
    }
}

/// `_cat/shards` is the one table with a column that's legitimately
/// blank (`node`, for an unassigned shard), which a plain whitespace
/// split can't represent as an empty token. Parsed by header position
/// directly instead of going through `convert_table_to_list`, filling
/// `node` in when the row is short by exactly one field.
fn parse_shards(text: &str) -> Result<Vec<Shard>> {
    let mut lines = text.lines().filter(|l| !l.trim().is_empty());
    let header: Vec<String> = match lines.next() {
        Some(h) => h.split_whitespace().map(|s| s.to_string()).collect(),
        None => return Ok(vec![]),
    };
    let node_pos = header.iter().position(|h| h == "node");

    lines
        .map(|line| {
            let mut cells: Vec<String> = line.split_whitespace().map(|s| s.to_string()).collect();
            if let Some(pos) = node_pos {
                if cells.len() == header.len() - 1 {
                    cells.insert(pos, String::new());
                }
            }
            let row: HashMap<String, String> = header.iter().cloned().zip(cells).collect();

            let index = cell(&row, "index", "shards")?;
            let shard_num: u32 = cell(&row, "shard", "shards")?.parse().map_err(|_| malformed("shards", &row))?;
            let primary = cell(&row, "prirep", "shards")? == "p";
            let state = ShardState::from_cat_state(&cell(&row, "state", "shards")?);
            let node = row.get("node").filter(|n| !n.is_empty()).cloned();
            let size_bytes = row.get("store").map(|s| text_to_bytes(s)).unwrap_or(0);
            Ok(Shard { index, shard_num, primary, state, node, size_bytes })
        })
        .collect()
}

fn cell(row: &HashMap<String, String>, key: &str, what: &'static str) -> Result<String> {
    row.get(key).cloned().ok_or_else(|| malformed(what, row))
}

fn malformed(what: &'static str, row: &HashMap<String, String>) -> Error {
    Error::MalformedRow { what, row: format!("{:?}", row) }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_nodes_table() {
        let text = "n r d i hm\ndata_us-east-1a_01 dim 10 10.0.0.1 16gb\n";
        let nodes = parse_nodes(text, &[]).unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].name, "data_us-east-1a_01");
        assert_eq!(nodes[0].role, "d");
        assert_eq!(nodes[0].zone, Zone::safe("us-east-1a", 1));
        assert!(nodes[0].memory > 0);
    }

    #[test]
    fn spot_prefixed_node_lands_in_a_risky_zone() {
        let text = "n r d i hm\nspot_us-east-1b_03 dim 10 10.0.0.2 8gb\n";
        let nodes = parse_nodes(text, &[]).unwrap();
        assert!(nodes[0].zone.risky);
        assert_eq!(nodes[0].zone.name, "us-east-1b");
    }

    #[test]
    fn coord_node_has_no_data_role_or_zone() {
        let text = "n r d i hm\ncoord-01 i 0 10.0.0.3 4gb\n";
        let nodes = parse_nodes(text, &[]).unwrap();
        assert_eq!(nodes[0].role, "m");
        assert_eq!(nodes[0].zone, Zone::new("coord"));
    }

    #[test]
    fn zone_table_overrides_risk_and_shard_count() {
        let text = "n r d i hm\ndata_us-east-1a_01 dim 10 10.0.0.1 16gb\n";
        let table = [ZoneConfig { name: "us-east-1a".to_string(), risky: true, shards: 2 }];
        let nodes = parse_nodes(text, &table).unwrap();
        assert!(nodes[0].zone.risky);
        assert_eq!(nodes[0].zone.shards, 2);
    }

    #[test]
    fn parses_shards_table_with_unassigned_node() {
        let text = "index shard prirep state node store\nlogs-1 0 p UNASSIGNED  0b\n";
        let shards = parse_shards(text).unwrap();
        assert_eq!(shards[0].node, None);
        assert_eq!(shards[0].state, ShardState::Unassigned);
    }

    #[test]
    fn text_to_bytes_handles_units() {
        assert_eq!(text_to_bytes("1kb"), 1024);
        assert_eq!(text_to_bytes("-1"), 0);
    }
}
