//! Weighted destination sampling, mirroring `allocate`'s node-weight
//! formula: `node.memory * (1 - sum(own_size)/index_size) * 4 ** min(0,
//! max_allowed - owned - 1)`. A node already holding its fair share of an
//! index gets an exponentially small chance of being picked again,
//! without ever ruling it out entirely; a node with no shards of this
//! index yet defaults to a weight of its raw memory.

use std::collections::HashSet;

use rand::distributions::{Distribution, WeightedIndex};
use rand::thread_rng;

use crate::model::{ClusterState, Zone};

/// Picks a destination node for one more copy of `(index, shard_num)`,
/// restricted to `allowed_zones` and never a node already holding an
/// active copy of that exact shard — the original's `existing_on_nodes`
/// exclusion, and the property a destination "never duplicates onto a
/// node that already holds shard i".
pub fn choose_destination(state: &ClusterState, index: &str, shard_num: u32, allowed_zones: &HashSet<Zone>) -> Option<String> {
    let shards_for_index: Vec<_> = state.shards_of_index(index).collect();
    let index_size = shards_for_index.iter().map(|s| s.size_bytes).sum::<u64>().max(1) as f64;

    let existing_on_nodes: HashSet<&str> = shards_for_index
        .iter()
        .filter(|s| s.shard_num == shard_num && s.state.is_active())
        .filter_map(|s| s.node.as_deref())
        .collect();

    let mut own_size_and_count: std::collections::HashMap<&str, (u64, usize)> = std::collections::HashMap::new();
    for s in shards_for_index.iter().filter(|s| s.is_started()) {
        if let Some(node) = &s.node {
            let entry = own_size_and_count.entry(node.as_str()).or_insert((0, 0));
            entry.0 += s.size_bytes;
            entry.1 += 1;
        }
    }

    let mut candidates = Vec::new();
    let mut weights = Vec::new();
    for node in &state.nodes {
        if !allowed_zones.contains(&node.zone) || existing_on_nodes.contains(node.name.as_str()) {
            continue;
        }
        let weight = match own_size_and_count.get(node.name.as_str()) {
            Some((own_size, owned_count)) => {
                let max_allowed = state.max_allowed(index, &node.name);
                let exponent = (max_allowed as i64 - *owned_count as i64 - 1).min(0);
                node.memory as f64 * (1.0 - *own_size as f64 / index_size) * 4f64.powi(exponent as i32)
            }
            None => node.memory as f64,
        };
        candidates.push(node.name.clone());
        weights.push(weight.max(0.0));
    }

    if candidates.is_empty() || weights.iter().all(|w| *w <= 0.0) {
        return None;
    }
    let dist = WeightedIndex::new(&weights).ok()?;
    Some(candidates[dist.sample(&mut thread_rng())].clone())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::{Node, Shard, ShardState};

    fn node(name: &str, zone: Zone, memory: u64) -> Node {
        Node { name: name.to_string(), zone, role: "d".to_string(), memory }
    }

    #[test]
    fn excludes_nodes_already_holding_the_shard() {
        let state = ClusterState {
            nodes: vec![node("n1", Zone::safe("a", 1), 100), node("n2", Zone::safe("a", 1), 100)],
            shards: vec![Shard {
                index: "logs".to_string(),
                shard_num: 0,
                primary: true,
                state: ShardState::Started,
                node: Some("n1".to_string()),
                size_bytes: 10,
            }],
        };
        let allowed: HashSet<Zone> = [Zone::safe("a", 1)].into_iter().collect();
        for _ in 0..20 {
            let dest = choose_destination(&state, "logs", 0, &allowed);
            assert_eq!(dest.as_deref(), Some("n2"));
        }
    }

    #[test]
    fn no_eligible_zone_yields_none() {
        let state = ClusterState { nodes: vec![node("n1", Zone::safe("a", 1), 100)], shards: vec![] };
        let allowed: HashSet<Zone> = [Zone::safe("b", 1)].into_iter().collect();
        assert!(choose_destination(&state, "logs", 0, &allowed).is_none());
    }
}
