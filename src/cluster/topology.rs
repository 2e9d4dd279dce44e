//! Cluster topology snapshot and comparison

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use super::node::{parse_cluster_node_line, ClusterNode, NodeRole, SlotRange};
use crate::config::{NodeScope, ServerAddress};
use crate::utils::ClusterError;

const SLOT_COUNT: usize = 16384;

/// How the topology was discovered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TopologyMode {
    Cluster,
    Standalone,
}

/// Topology snapshot
#[derive(Debug, Clone)]
pub struct ClusterTopology {
    pub mode: TopologyMode,
    /// All known nodes
    pub nodes: Vec<ClusterNode>,
}

impl ClusterTopology {
    /// Parse CLUSTER NODES response
    ///
    /// `seed_host` fills in the address of a node that reports an empty host.
    pub fn from_cluster_nodes(response: &str, seed_host: &str) -> Result<Self, ClusterError> {
        let mut nodes: Vec<ClusterNode> = response
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .filter_map(|l| parse_cluster_node_line(l, seed_host))
            .collect();

        if nodes.is_empty() {
            return Err(ClusterError::ParseFailed("no node lines".to_string()));
        }
        if !nodes.iter().any(|n| n.is_primary()) {
            return Err(ClusterError::NoPrimaries);
        }

        assign_shards(&mut nodes);

        Ok(Self {
            mode: TopologyMode::Cluster,
            nodes,
        })
    }

    /// Build a standalone topology from the seed's INFO replication section
    ///
    /// A primary lists its replicas as `slaveN:ip=..,port=..,state=..`; a
    /// replica points at its primary through `master_host` / `master_port`.
    pub fn from_replication_info(seed: &ServerAddress, info: &str) -> Self {
        let fields: HashMap<&str, &str> = info
            .lines()
            .filter_map(|l| l.trim().split_once(':'))
            .collect();

        let mut nodes = Vec::new();
        match fields.get("role").copied() {
            Some("slave") | Some("replica") => {
                let primary = fields.get("master_host").and_then(|h| {
                    let port = fields.get("master_port")?.parse().ok()?;
                    Some(ClusterNode::standalone(h, port, NodeRole::Primary))
                });
                let mut replica = ClusterNode::standalone(&seed.host, seed.port, NodeRole::Replica);
                if let Some(mut primary) = primary {
                    primary.connected = fields.get("master_link_status") != Some(&"down");
                    replica.primary_id = Some(primary.id.clone());
                    nodes.push(primary);
                }
                nodes.push(replica);
            }
            _ => {
                let primary = ClusterNode::standalone(&seed.host, seed.port, NodeRole::Primary);
                let mut replicas: Vec<(usize, ClusterNode)> = fields
                    .iter()
                    .filter_map(|(k, v)| {
                        let idx: usize = k.strip_prefix("slave")?.parse().ok()?;
                        let attrs = parse_attr_list(v);
                        let host = attrs.get("ip")?;
                        let port = attrs.get("port")?.parse().ok()?;
                        let mut node = ClusterNode::standalone(host, port, NodeRole::Replica);
                        node.primary_id = Some(primary.id.clone());
                        node.connected = attrs.get("state").map_or(true, |s| *s == "online");
                        Some((idx, node))
                    })
                    .collect();
                replicas.sort_by_key(|(idx, _)| *idx);
                nodes.push(primary);
                nodes.extend(replicas.into_iter().map(|(_, n)| n));
            }
        }

        // Standalone is a single shard
        let mut replica_index = 2;
        for node in nodes.iter_mut() {
            node.shard_id = Some(1);
            if node.is_primary() {
                node.shard_index = Some(1);
            } else {
                node.shard_index = Some(replica_index);
                replica_index += 1;
            }
        }

        Self {
            mode: TopologyMode::Standalone,
            nodes,
        }
    }

    /// Get all primary nodes
    pub fn primaries(&self) -> impl Iterator<Item = &ClusterNode> {
        self.nodes.iter().filter(|n| n.is_primary())
    }

    /// Get all replica nodes
    pub fn replicas(&self) -> impl Iterator<Item = &ClusterNode> {
        self.nodes.iter().filter(|n| !n.is_primary())
    }

    /// Get replicas for a primary
    pub fn replicas_for(&self, primary_id: &str) -> Vec<&ClusterNode> {
        self.nodes
            .iter()
            .filter(|n| n.primary_id.as_deref() == Some(primary_id))
            .collect()
    }

    /// Available nodes for a collection scope
    pub fn select(&self, scope: NodeScope) -> Vec<&ClusterNode> {
        let available = self.nodes.iter().filter(|n| n.is_available());
        match scope {
            NodeScope::All => available.collect(),
            NodeScope::Primaries => available.filter(|n| n.is_primary()).collect(),
            NodeScope::Replicas => {
                let replicas: Vec<&ClusterNode> =
                    available.filter(|n| !n.is_primary()).collect();
                if replicas.is_empty() {
                    self.nodes
                        .iter()
                        .filter(|n| n.is_primary() && n.is_available())
                        .collect()
                } else {
                    replicas
                }
            }
        }
    }

    pub fn num_primaries(&self) -> usize {
        self.primaries().count()
    }

    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// Get node by address (host:port)
    pub fn get_node_by_address(&self, address: &str) -> Option<&ClusterNode> {
        self.nodes.iter().find(|n| n.address() == address)
    }

    /// Display name for an address, falling back to the address itself
    pub fn display_name(&self, address: &str) -> String {
        self.get_node_by_address(address)
            .map(|n| n.display_name())
            .unwrap_or_else(|| address.to_string())
    }

    /// Owner address for every slot
    fn slot_owners(&self) -> Vec<Option<String>> {
        let mut owners = vec![None; SLOT_COUNT];
        for node in self.primaries() {
            let address = node.address();
            for range in &node.slots {
                for slot in range.start..=range.end {
                    owners[slot as usize] = Some(address.clone());
                }
            }
        }
        owners
    }

    /// Compare against a later topology
    pub fn diff(&self, newer: &ClusterTopology) -> TopologyDiff {
        let old_nodes: BTreeMap<String, &ClusterNode> =
            self.nodes.iter().map(|n| (n.address(), n)).collect();
        let new_nodes: BTreeMap<String, &ClusterNode> =
            newer.nodes.iter().map(|n| (n.address(), n)).collect();

        let added = new_nodes
            .keys()
            .filter(|a| !old_nodes.contains_key(*a))
            .cloned()
            .collect();
        let removed = old_nodes
            .keys()
            .filter(|a| !new_nodes.contains_key(*a))
            .cloned()
            .collect();

        let mut role_changes = Vec::new();
        let mut availability_changes = Vec::new();
        for (address, old) in &old_nodes {
            let Some(new) = new_nodes.get(address) else {
                continue;
            };
            if old.role != new.role {
                role_changes.push(RoleChange {
                    address: address.clone(),
                    from: old.role,
                    to: new.role,
                });
            }
            if old.is_available() != new.is_available() {
                availability_changes.push(AvailabilityChange {
                    address: address.clone(),
                    available: new.is_available(),
                });
            }
        }

        let slot_moves = if self.mode == TopologyMode::Cluster && newer.mode == TopologyMode::Cluster
        {
            diff_slot_owners(&self.slot_owners(), &newer.slot_owners())
        } else {
            Vec::new()
        };

        TopologyDiff {
            mode_changed: self.mode != newer.mode,
            added,
            removed,
            role_changes,
            availability_changes,
            slot_moves,
        }
    }
}

/// Number shards by first owned slot (1-based); primary is index 1,
/// its replicas follow in discovery order
fn assign_shards(nodes: &mut [ClusterNode]) {
    let mut primaries: Vec<(usize, u16)> = nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| n.is_primary())
        .map(|(idx, n)| {
            let first = n.slots.iter().map(|r| r.start).min().unwrap_or(u16::MAX);
            (idx, first)
        })
        .collect();
    primaries.sort_by(|a, b| a.1.cmp(&b.1).then_with(|| nodes[a.0].id.cmp(&nodes[b.0].id)));

    for (shard_offset, (primary_idx, _)) in primaries.iter().enumerate() {
        let shard_id = (shard_offset + 1) as u16;
        nodes[*primary_idx].shard_id = Some(shard_id);
        nodes[*primary_idx].shard_index = Some(1);

        let primary_id = nodes[*primary_idx].id.clone();
        let mut next_index = 2;
        for node in nodes.iter_mut() {
            if node.primary_id.as_deref() == Some(primary_id.as_str()) {
                node.shard_id = Some(shard_id);
                node.shard_index = Some(next_index);
                next_index += 1;
            }
        }
    }
}

/// Parse `ip=10.0.0.2,port=6379,state=online` style attribute lists
pub(crate) fn parse_attr_list(value: &str) -> HashMap<&str, &str> {
    value
        .split(',')
        .filter_map(|kv| kv.split_once('='))
        .map(|(k, v)| (k.trim(), v.trim()))
        .collect()
}

/// Collapse per-slot owner changes into contiguous ranges
fn diff_slot_owners(old: &[Option<String>], new: &[Option<String>]) -> Vec<SlotMove> {
    let mut moves: Vec<SlotMove> = Vec::new();
    for slot in 0..old.len().min(new.len()) {
        if old[slot] == new[slot] {
            continue;
        }
        let slot = slot as u16;
        if let Some(last) = moves.last_mut() {
            if last.range.end + 1 == slot && last.from == old[slot as usize] && last.to == new[slot as usize]
            {
                last.range.end = slot;
                continue;
            }
        }
        moves.push(SlotMove {
            range: SlotRange {
                start: slot,
                end: slot,
            },
            from: old[slot as usize].clone(),
            to: new[slot as usize].clone(),
        });
    }
    moves
}

/// A node whose role flipped (typically a failover)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleChange {
    pub address: String,
    pub from: NodeRole,
    pub to: NodeRole,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AvailabilityChange {
    pub address: String,
    pub available: bool,
}

/// Slots that changed owner; `None` means unassigned
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SlotMove {
    pub range: SlotRange,
    pub from: Option<String>,
    pub to: Option<String>,
}

/// Changes between two topology snapshots
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopologyDiff {
    pub mode_changed: bool,
    pub added: Vec<String>,
    pub removed: Vec<String>,
    pub role_changes: Vec<RoleChange>,
    pub availability_changes: Vec<AvailabilityChange>,
    pub slot_moves: Vec<SlotMove>,
}

impl TopologyDiff {
    pub fn is_empty(&self) -> bool {
        !self.mode_changed
            && self.added.is_empty()
            && self.removed.is_empty()
            && self.role_changes.is_empty()
            && self.availability_changes.is_empty()
            && self.slot_moves.is_empty()
    }

    /// One line per change, for the text report and logs
    pub fn describe(&self) -> Vec<String> {
        let mut lines = Vec::new();
        if self.mode_changed {
            lines.push("topology mode changed".to_string());
        }
        lines.extend(self.added.iter().map(|a| format!("node added: {}", a)));
        lines.extend(self.removed.iter().map(|a| format!("node removed: {}", a)));
        lines.extend(
            self.role_changes
                .iter()
                .map(|c| format!("role change: {} {} -> {}", c.address, c.from, c.to)),
        );
        lines.extend(self.availability_changes.iter().map(|c| {
            format!(
                "{}: {}",
                c.address,
                if c.available { "became available" } else { "became unavailable" }
            )
        }));
        lines.extend(self.slot_moves.iter().map(|m| {
            format!(
                "slots {} moved: {} -> {}",
                m.range,
                m.from.as_deref().unwrap_or("unassigned"),
                m.to.as_deref().unwrap_or("unassigned")
            )
        }));
        lines
    }
}
