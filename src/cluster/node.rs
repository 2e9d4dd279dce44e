//! Cluster node representation

use std::fmt;

use serde::Serialize;

/// Replication role of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    Primary,
    Replica,
}

impl NodeRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeRole::Primary => "primary",
            NodeRole::Replica => "replica",
        }
    }

    pub fn is_primary(&self) -> bool {
        *self == NodeRole::Primary
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive slot range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SlotRange {
    pub start: u16,
    pub end: u16,
}

impl SlotRange {
    pub fn len(&self) -> usize {
        (self.end - self.start) as usize + 1
    }

    pub fn contains(&self, slot: u16) -> bool {
        slot >= self.start && slot <= self.end
    }
}

impl fmt::Display for SlotRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Cluster node information
#[derive(Debug, Clone)]
pub struct ClusterNode {
    /// Node ID from CLUSTER NODES (synthetic for standalone)
    pub id: String,
    /// Hostname or IP
    pub host: String,
    /// Port
    pub port: u16,
    /// Cluster bus port (0 when unknown)
    pub bus_port: u16,
    pub role: NodeRole,
    /// Primary node ID (if replica)
    pub primary_id: Option<String>,
    /// Owned slot ranges (primaries only)
    pub slots: Vec<SlotRange>,
    /// Node flags (myself, fail, handshake, ...)
    pub flags: Vec<String>,
    /// Link state reported as connected
    pub connected: bool,
    /// 1-based shard number, ordered by first owned slot
    pub shard_id: Option<u16>,
    /// Position inside the shard (1 = primary, 2.. = replicas)
    pub shard_index: Option<u16>,
}

impl ClusterNode {
    /// Node built from a standalone INFO replication view
    pub fn standalone(host: &str, port: u16, role: NodeRole) -> Self {
        Self {
            id: format!("{}:{}", host, port),
            host: host.to_string(),
            port,
            bus_port: 0,
            role,
            primary_id: None,
            slots: Vec::new(),
            flags: Vec::new(),
            connected: true,
            shard_id: None,
            shard_index: None,
        }
    }

    /// Check if node is usable for collection
    pub fn is_available(&self) -> bool {
        self.connected
            && !self
                .flags
                .iter()
                .any(|f| f == "fail" || f == "handshake" || f == "noaddr")
    }

    pub fn is_primary(&self) -> bool {
        self.role.is_primary()
    }

    pub fn is_myself(&self) -> bool {
        self.flags.iter().any(|f| f == "myself")
    }

    /// Get node address as string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Total slots owned
    pub fn slot_count(&self) -> usize {
        self.slots.iter().map(SlotRange::len).sum()
    }

    /// Shard-based name like "2-1-P"; falls back to the address
    pub fn display_name(&self) -> String {
        match (self.shard_id, self.shard_index) {
            (Some(shard), Some(index)) => format!(
                "{}-{}-{}",
                shard,
                index,
                if self.is_primary() { "P" } else { "R" }
            ),
            _ => self.address(),
        }
    }
}

/// Parse a line from CLUSTER NODES response
///
/// Format: `<id> <ip:port@cport[,hostname]> <flags> <primary> <ping-sent> <pong-recv> <config-epoch> <link-state> <slot> ... <slot>`
///
/// An empty host (`:6379@16379`) is replaced by `fallback_host`; the node a
/// client is talking to reports itself that way before it knows its own IP.
pub fn parse_cluster_node_line(line: &str, fallback_host: &str) -> Option<ClusterNode> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    if parts.len() < 8 {
        return None;
    }

    let id = parts[0].to_string();
    let (mut host, port, bus_port) = parse_node_address(parts[1])?;
    if host.is_empty() {
        host = fallback_host.to_string();
    }

    let flags: Vec<String> = parts[2].split(',').map(String::from).collect();
    let is_primary = flags.iter().any(|f| f == "master");
    let is_replica = flags.iter().any(|f| f == "slave" || f == "replica");
    if !is_primary && !is_replica {
        // Handshake or noaddr entries without a role
        return None;
    }
    let role = if is_primary {
        NodeRole::Primary
    } else {
        NodeRole::Replica
    };

    let primary_id = if is_replica && parts[3] != "-" {
        Some(parts[3].to_string())
    } else {
        None
    };

    let connected = parts[7] == "connected";

    let slots = if is_primary {
        parts[8..]
            .iter()
            .filter_map(|s| parse_slot_range(s))
            .collect()
    } else {
        Vec::new()
    };

    Some(ClusterNode {
        id,
        host,
        port,
        bus_port,
        role,
        primary_id,
        slots,
        flags,
        connected,
        shard_id: None,
        shard_index: None,
    })
}

/// Parse node address from CLUSTER NODES
/// Formats: "host:port@cport", "host:port", "host:port@cport,hostname"
fn parse_node_address(addr: &str) -> Option<(String, u16, u16)> {
    // ElastiCache format: ip:port@cport,hostname
    let addr = addr.split(',').next().unwrap_or(addr);

    let (host_port, bus_port) = match addr.split_once('@') {
        Some((hp, bus)) => (hp, bus.parse().unwrap_or(0)),
        None => (addr, 0),
    };

    let (host, port) = host_port.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;

    Some((host.to_string(), port, bus_port))
}

/// Parse slot range: "0-5460" or "0"
fn parse_slot_range(s: &str) -> Option<SlotRange> {
    // Skip importing/migrating markers like "[123->-node_id]"
    if s.contains('[') {
        return None;
    }

    let (start, end) = match s.split_once('-') {
        Some((a, b)) => (a.parse().ok()?, b.parse().ok()?),
        None => {
            let slot: u16 = s.parse().ok()?;
            (slot, slot)
        }
    };
    if start > end || end > 16383 {
        return None;
    }
    Some(SlotRange { start, end })
}
