//! The cluster snapshot the objective operates over: nodes grouped by
//! zone, and the shards currently sitting on (or missing from) each one.
//! Parsed once per poll from `_cat/nodes` and `_cat/shards`; never
//! mutated in place, each objective phase returns a fresh `RerouteCmd`
//! list instead.

use std::collections::HashMap;

use serde_derive::Deserialize;

/// One row of the configured zone table: maps a zone name, as embedded in
/// node names by convention, to whether it's risky and how many shard
/// copies it should hold. Read once at startup from a JSON file; never
/// observed from the cluster itself.
#[derive(Debug, Clone, Deserialize)]
pub struct ZoneConfig {
    pub name: String,
    pub risky: bool,
    pub shards: usize,
}

/// Every zone comparison in this crate goes through `Zone::name` rather
/// than node attributes directly — an open question in the original
/// design, resolved here as the canonical identity for "same zone".
/// `risky`/`shards` come straight from the configured zone table, not
/// from anything observed on the cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Zone {
    pub name: String,
    pub risky: bool,
    pub shards: usize,
}

impl Zone {
    pub fn new(name: impl Into<String>) -> Self {
        Zone { name: name.into(), risky: false, shards: 1 }
    }

    pub fn risky(name: impl Into<String>, shards: usize) -> Self {
        Zone { name: name.into(), risky: true, shards }
    }

    pub fn safe(name: impl Into<String>, shards: usize) -> Self {
        Zone { name: name.into(), risky: false, shards }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub name: String,
    pub zone: Zone,
    pub role: String,
    pub memory: u64,
}

impl Node {
    /// Only a data-role node (`role == "d"`) contributes memory to its
    /// zone's total or ever receives a shard.
    pub fn is_data(&self) -> bool {
        self.role == "d"
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde_derive::Serialize, serde_derive::Deserialize)]
pub enum ShardState {
    Started,
    Relocating,
    Initializing,
    Unassigned,
}

impl ShardState {
    pub fn from_cat_state(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "STARTED" => ShardState::Started,
            "RELOCATING" => ShardState::Relocating,
            "INITIALIZING" => ShardState::Initializing,
            _ => ShardState::Unassigned,
        }
    }

    /// "Active" in the original's sense: occupies a slot even though it
    /// isn't necessarily serving yet.
    pub fn is_active(&self) -> bool {
        matches!(self, ShardState::Started | ShardState::Relocating | ShardState::Initializing)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shard {
    pub index: String,
    pub shard_num: u32,
    pub primary: bool,
    pub state: ShardState,
    pub node: Option<String>,
    pub size_bytes: u64,
}

impl Shard {
    pub fn is_started(&self) -> bool {
        self.state == ShardState::Started
    }
}

/// A full cluster observation: every known node and every known shard,
/// regardless of index. Index-scoped views (`shards_of_index`) are
/// computed on demand rather than stored, since the objective only ever
/// needs one index's shards at a time.
#[derive(Debug, Clone, Default)]
pub struct ClusterState {
    pub nodes: Vec<Node>,
    pub shards: Vec<Shard>,
}

impl ClusterState {
    pub fn node(&self, name: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn zone_of(&self, node_name: &str) -> Option<&Zone> {
        self.node(node_name).map(|n| &n.zone)
    }

    pub fn shards_of_index<'a>(&'a self, index: &'a str) -> impl Iterator<Item = &'a Shard> {
        self.shards.iter().filter(move |s| s.index == index)
    }

    pub fn indices(&self) -> Vec<String> {
        let mut seen: Vec<String> = self.shards.iter().map(|s| s.index.clone()).collect();
        seen.sort();
        seen.dedup();
        seen
    }

    /// How many shards of `index` currently sit on each zone (any active
    /// state — started, relocating, or initializing).
    pub fn owned_per_zone(&self, index: &str) -> HashMap<Zone, usize> {
        let mut counts = HashMap::new();
        for shard in self.shards_of_index(index) {
            if !shard.state.is_active() {
                continue;
            }
            if let Some(node) = &shard.node {
                if let Some(zone) = self.zone_of(node) {
                    *counts.entry(zone.clone()).or_insert(0) += 1;
                }
            }
        }
        counts
    }

    /// Sum of `memory` over every data-role node in `zone` — the "derived"
    /// half of `Zone{..., memory: derived}`.
    pub fn zone_memory(&self, zone: &Zone) -> u64 {
        self.nodes.iter().filter(|n| n.is_data() && &n.zone == zone).map(|n| n.memory).sum()
    }

    /// `ceil((node.memory / zone.memory) * zone.shards * num_primaries)`,
    /// `0` for a non-data node or a zone with no recorded memory.
    pub fn max_allowed(&self, index: &str, node_name: &str) -> usize {
        let node = match self.node(node_name) {
            Some(n) if n.is_data() => n,
            _ => return 0,
        };
        let zone_memory = self.zone_memory(&node.zone);
        if zone_memory == 0 {
            return 0;
        }
        let num_primaries = self.shards_of_index(index).filter(|s| s.primary).count();
        let raw = (node.memory as f64 / zone_memory as f64) * node.zone.shards as f64 * num_primaries as f64;
        raw.ceil().max(0.0) as usize
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn zone_memory_sums_only_data_nodes() {
        let state = ClusterState {
            nodes: vec![
                Node { name: "n1".to_string(), zone: Zone::safe("a", 1), role: "d".to_string(), memory: 100 },
                Node { name: "n2".to_string(), zone: Zone::safe("a", 1), role: "d".to_string(), memory: 200 },
                Node { name: "coord".to_string(), zone: Zone::safe("a", 1), role: "m".to_string(), memory: 999 },
            ],
            shards: vec![],
        };
        assert_eq!(state.zone_memory(&Zone::safe("a", 1)), 300);
    }

    #[test]
    fn max_allowed_is_zero_off_data_role() {
        let state = ClusterState {
            nodes: vec![Node { name: "coord".to_string(), zone: Zone::safe("a", 1), role: "m".to_string(), memory: 100 }],
            shards: vec![],
        };
        assert_eq!(state.max_allowed("logs", "coord"), 0);
    }
}
