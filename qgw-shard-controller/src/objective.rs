//! The placement objective: six priority phases, evaluated in order, each
//! emitting at most one round of reroute commands per poll. Mirrors
//! `assign_shards`'s ordering exactly — unstarted shards are the only
//! thing worth fixing before anything else, then high-risk
//! under-replication, then the rest.

use std::collections::{HashMap, HashSet};

use crate::cluster::RerouteCmd;
use crate::model::{ClusterState, Shard, ShardState, Zone};
use crate::reroute::choose_destination;

/// Replica target per index: how many zones a shard's copies should be
/// spread across before the objective considers it "balanced". The
/// controller doesn't discover this from the cluster; it's supplied by
/// whoever owns the index's replica configuration.
pub type ReplicaTargets = HashMap<String, usize>;

/// Size above which moving shards one at a time, rather than several
/// concurrently, is the safer default.
const BIG_SHARD_SIZE: u64 = 5 * 1024 * 1024 * 1024;
const MIN_CONCURRENT: usize = 3;

pub struct Objective<'a> {
    pub state: &'a ClusterState,
    pub targets: &'a ReplicaTargets,
    pub max_concurrent_reroutes: usize,
}

impl<'a> Objective<'a> {
    /// Runs phases in priority order, stopping as soon as one produces
    /// commands — each poll fixes the single highest-priority problem
    /// class present, never mixes classes in one reroute batch, mirroring
    /// `assign_shards`'s early-return-per-phase structure. The batch is
    /// then capped to `net_shards_to_move`, never to the raw
    /// `max_concurrent_reroutes` directly.
    pub fn next_batch(&self) -> Vec<RerouteCmd> {
        let phases: [fn(&Objective) -> Vec<RerouteCmd>; 6] =
            [Self::unstarted, Self::high_risk, Self::over_allocated, Self::duplicate, Self::low_risk_fill, Self::rebalance];

        for phase in phases.iter() {
            let proposed = phase(self);
            if proposed.is_empty() {
                continue;
            }
            let net = self.net_shards_to_move(&proposed);
            if net <= 0 {
                return vec![];
            }
            return proposed.into_iter().take(net as usize).collect();
        }
        vec![]
    }

    /// `net := concurrent − len(relocating)`, extending `concurrent` by
    /// one per proposed shard while the cumulative size of the smallest
    /// ones stays under `BIG_SHARD_SIZE` — several small shards may move
    /// at once, a big one moves alone.
    fn net_shards_to_move(&self, proposed: &[RerouteCmd]) -> i64 {
        let relocating = self.state.shards.iter().filter(|s| matches!(s.state, ShardState::Relocating | ShardState::Initializing)).count();
        let mut sizes: Vec<u64> = proposed.iter().map(|c| self.shard_size(&c.index, c.shard)).collect();
        sizes.sort_unstable();

        let mut concurrent = self.max_concurrent_reroutes;
        let mut total = 0u64;
        for size in sizes {
            if total > BIG_SHARD_SIZE {
                break;
            }
            concurrent += 1;
            total += size;
        }
        concurrent = concurrent.max(MIN_CONCURRENT);
        concurrent as i64 - relocating as i64
    }

    fn shard_size(&self, index: &str, shard_num: u32) -> u64 {
        self.state.shards_of_index(index).find(|s| s.shard_num == shard_num).map(|s| s.size_bytes).unwrap_or(0)
    }

    fn all_zones(&self) -> HashSet<Zone> {
        self.state.nodes.iter().map(|n| n.zone.clone()).collect()
    }

    fn safe_zones(&self) -> HashSet<Zone> {
        self.all_zones().into_iter().filter(|z| !z.risky).collect()
    }

    fn shard_groups(&self, index: &str) -> HashMap<u32, Vec<&Shard>> {
        let mut groups: HashMap<u32, Vec<&Shard>> = HashMap::new();
        for shard in self.state.shards_of_index(index) {
            groups.entry(shard.shard_num).or_default().push(shard);
        }
        groups
    }

    fn zone_of_shard(&self, shard: &Shard) -> Option<&Zone> {
        shard.node.as_deref().and_then(|n| self.state.zone_of(n))
    }

    /// Phase 1: shard groups with zero replicas in `STARTED`/`RELOCATING`
    /// anywhere — the only state that risks data loss — placed into any
    /// non-risky zone.
    fn unstarted(&self) -> Vec<RerouteCmd> {
        let safe = self.safe_zones();
        let mut cmds = vec![];
        for index in self.state.indices() {
            for (shard_num, replicas) in self.shard_groups(&index) {
                if replicas.iter().any(|s| matches!(s.state, ShardState::Started | ShardState::Relocating)) {
                    continue;
                }
                if let Some(shard) = replicas.iter().find(|s| s.state == ShardState::Unassigned) {
                    if let Some(dest) = choose_destination(self.state, &index, shard_num, &safe) {
                        cmds.push(RerouteCmd {
                            index: index.clone(),
                            shard: shard_num,
                            from_node: String::new(),
                            to_node: dest,
                            state: shard.state,
                        });
                    }
                }
            }
        }
        cmds
    }

    /// Phase 2: a group has at least one started replica, but every one
    /// of them sits in a risky zone — give it a foothold in a safe zone
    /// too.
    fn high_risk(&self) -> Vec<RerouteCmd> {
        let safe = self.safe_zones();
        let mut cmds = vec![];
        for index in self.state.indices() {
            for (shard_num, replicas) in self.shard_groups(&index) {
                let started_zones: HashSet<&Zone> = replicas
                    .iter()
                    .filter(|s| matches!(s.state, ShardState::Started | ShardState::Relocating))
                    .filter_map(|s| self.zone_of_shard(s))
                    .collect();
                if started_zones.is_empty() || started_zones.iter().any(|z| !z.risky) {
                    continue;
                }
                if let Some(shard) = replicas.iter().find(|s| s.state == ShardState::Unassigned) {
                    if let Some(dest) = choose_destination(self.state, &index, shard_num, &safe) {
                        cmds.push(RerouteCmd {
                            index: index.clone(),
                            shard: shard_num,
                            from_node: String::new(),
                            to_node: dest,
                            state: shard.state,
                        });
                    }
                }
            }
        }
        cmds
    }

    /// Phase 3: a non-risky zone holds more started copies of a group
    /// than its `shards` quota — shed one into a risky zone that still
    /// has room.
    fn over_allocated(&self) -> Vec<RerouteCmd> {
        let zones = self.all_zones();
        let mut cmds = vec![];
        for index in self.state.indices() {
            for (shard_num, replicas) in self.shard_groups(&index) {
                for zone in zones.iter().filter(|z| !z.risky) {
                    let safe_replicas: Vec<&&Shard> =
                        replicas.iter().filter(|s| s.state == ShardState::Started && self.zone_of_shard(s) == Some(zone)).collect();
                    if safe_replicas.len() <= zone.shards {
                        continue;
                    }
                    for risky_zone in zones.iter().filter(|z| z.risky) {
                        let active_in_risky = replicas.iter().filter(|s| s.state.is_active() && self.zone_of_shard(s) == Some(risky_zone)).count();
                        if active_in_risky >= risky_zone.shards {
                            continue;
                        }
                        if let Some(shard) = safe_replicas.first() {
                            let allowed: HashSet<Zone> = [risky_zone.clone()].into_iter().collect();
                            if let Some(dest) = choose_destination(self.state, &index, shard_num, &allowed) {
                                cmds.push(RerouteCmd {
                                    index: index.clone(),
                                    shard: shard_num,
                                    from_node: shard.node.clone().unwrap_or_default(),
                                    to_node: dest,
                                    state: shard.state,
                                });
                            }
                        }
                        break;
                    }
                }
            }
        }
        cmds
    }

    /// Phase 4: a zone already has at least one started copy but hasn't
    /// hit its `shards` quota of active copies — give it another while an
    /// unassigned replica is available, the cheapest possible move since
    /// it's same-zone.
    fn duplicate(&self) -> Vec<RerouteCmd> {
        let zones = self.all_zones();
        let mut cmds = vec![];
        for index in self.state.indices() {
            for (shard_num, replicas) in self.shard_groups(&index) {
                let shard = match replicas.iter().find(|s| s.state == ShardState::Unassigned) {
                    Some(s) => s,
                    None => continue,
                };
                for zone in &zones {
                    let started_count =
                        replicas.iter().filter(|s| matches!(s.state, ShardState::Started | ShardState::Relocating) && self.zone_of_shard(s) == Some(zone)).count();
                    let active_count = replicas.iter().filter(|s| s.state.is_active() && self.zone_of_shard(s) == Some(zone)).count();
                    if started_count >= 1 && active_count < zone.shards {
                        let allowed: HashSet<Zone> = [zone.clone()].into_iter().collect();
                        if let Some(dest) = choose_destination(self.state, &index, shard_num, &allowed) {
                            cmds.push(RerouteCmd {
                                index: index.clone(),
                                shard: shard_num,
                                from_node: String::new(),
                                to_node: dest,
                                state: shard.state,
                            });
                        }
                    }
                }
            }
        }
        cmds
    }

    /// Phase 5: an unassigned replica and a zone with no active copy at
    /// all — the lowest-risk placement left once safety duplication is
    /// exhausted.
    fn low_risk_fill(&self) -> Vec<RerouteCmd> {
        let zones = self.all_zones();
        let mut cmds = vec![];
        for index in self.state.indices() {
            for (shard_num, replicas) in self.shard_groups(&index) {
                let shard = match replicas.iter().find(|s| s.state == ShardState::Unassigned) {
                    Some(s) => s,
                    None => continue,
                };
                for zone in &zones {
                    let active_count = replicas.iter().filter(|s| s.state.is_active() && self.zone_of_shard(s) == Some(zone)).count();
                    if active_count >= 1 {
                        continue;
                    }
                    let allowed: HashSet<Zone> = [zone.clone()].into_iter().collect();
                    if let Some(dest) = choose_destination(self.state, &index, shard_num, &allowed) {
                        cmds.push(RerouteCmd {
                            index: index.clone(),
                            shard: shard_num,
                            from_node: String::new(),
                            to_node: dest,
                            state: shard.state,
                        });
                    }
                }
            }
        }
        cmds
    }

    /// Phase 6: a node holds more started shards of an index than
    /// `max_allowed` permits — move the excess somewhere with room.
    fn rebalance(&self) -> Vec<RerouteCmd> {
        let zones = self.all_zones();
        let mut cmds = vec![];
        for index in self.state.indices() {
            let mut by_node: HashMap<&str, Vec<&Shard>> = HashMap::new();
            for shard in self.state.shards_of_index(&index).filter(|s| s.is_started()) {
                if let Some(node) = &shard.node {
                    by_node.entry(node.as_str()).or_default().push(shard);
                }
            }
            for (node_name, started) in by_node {
                let max_allowed = self.state.max_allowed(&index, node_name);
                if started.len() <= max_allowed {
                    continue;
                }
                if let Some(shard) = started.get(max_allowed) {
                    if let Some(dest) = choose_destination(self.state, &index, shard.shard_num, &zones) {
                        cmds.push(RerouteCmd {
                            index: index.clone(),
                            shard: shard.shard_num,
                            from_node: node_name.to_string(),
                            to_node: dest,
                            state: shard.state,
                        });
                    }
                }
            }
        }
        cmds
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::model::Node;

    fn node(name: &str, zone: Zone, memory: u64) -> Node {
        Node { name: name.to_string(), zone, role: "d".to_string(), memory }
    }

    #[test]
    fn unstarted_shard_gets_placed() {
        let state = ClusterState {
            nodes: vec![node("n1", Zone::safe("a", 1), 100), node("n2", Zone::safe("b", 1), 100)],
            shards: vec![Shard { index: "logs".to_string(), shard_num: 0, primary: true, state: ShardState::Unassigned, node: None, size_bytes: 0 }],
        };
        let targets: ReplicaTargets = [("logs".to_string(), 2)].into_iter().collect();
        let objective = Objective { state: &state, targets: &targets, max_concurrent_reroutes: 10 };
        let cmds = objective.next_batch();
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].index, "logs");
        assert_eq!(cmds[0].state, ShardState::Unassigned);
    }

    #[test]
    fn fully_satisfied_cluster_emits_nothing() {
        let state = ClusterState {
            nodes: vec![node("n1", Zone::safe("a", 1), 100)],
            shards: vec![Shard {
                index: "logs".to_string(),
                shard_num: 0,
                primary: true,
                state: ShardState::Started,
                node: Some("n1".to_string()),
                size_bytes: 10,
            }],
        };
        let targets: ReplicaTargets = [("logs".to_string(), 1)].into_iter().collect();
        let objective = Objective { state: &state, targets: &targets, max_concurrent_reroutes: 10 };
        assert!(objective.next_batch().is_empty());
    }

    #[test]
    fn high_risk_shard_gets_duplicated_into_a_safe_zone() {
        let state = ClusterState {
            nodes: vec![node("risky1", Zone::risky("spot", 1), 100), node("safe1", Zone::safe("primary", 1), 100)],
            shards: vec![
                Shard {
                    index: "logs".to_string(),
                    shard_num: 0,
                    primary: true,
                    state: ShardState::Started,
                    node: Some("risky1".to_string()),
                    size_bytes: 10,
                },
                Shard { index: "logs".to_string(), shard_num: 0, primary: false, state: ShardState::Unassigned, node: None, size_bytes: 0 },
            ],
        };
        let targets = ReplicaTargets::new();
        let objective = Objective { state: &state, targets: &targets, max_concurrent_reroutes: 10 };
        let cmds = objective.next_batch();
        assert_eq!(cmds.len(), 1);
        assert_eq!(cmds[0].to_node, "safe1");
    }

    #[test]
    fn net_shards_to_move_respects_relocating_count() {
        let state = ClusterState {
            nodes: vec![node("n1", Zone::safe("a", 1), 100)],
            shards: vec![Shard {
                index: "busy".to_string(),
                shard_num: 0,
                primary: true,
                state: ShardState::Relocating,
                node: Some("n1".to_string()),
                size_bytes: 10,
            }],
        };
        let targets = ReplicaTargets::new();
        let objective = Objective { state: &state, targets: &targets, max_concurrent_reroutes: 3 };
        let proposed = vec![RerouteCmd {
            index: "logs".to_string(),
            shard: 0,
            from_node: String::new(),
            to_node: "n1".to_string(),
            state: ShardState::Unassigned,
        }];
        assert_eq!(objective.net_shards_to_move(&proposed), 2);
    }
}
