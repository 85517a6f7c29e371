//! Types for parsed Valkey cluster wire output.
//!
//! These types represent the parsed output of the topology dump
//! (`CLUSTER NODES`), the cluster summary (`CLUSTER INFO`) and the per-slot
//! migration status listing. They are plain data: fetching lives in
//! [`crate::view`] and [`crate::client::valkey`].

use std::str::FromStr;

use thiserror::Error;

/// Errors that can occur when parsing cluster wire output.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("Invalid cluster info format: {0}")]
    InvalidClusterInfo(String),
    #[error("Invalid cluster nodes format: {0}")]
    InvalidClusterNodes(String),
    #[error("Invalid slot range: {0}")]
    InvalidSlotRange(String),
    #[error("Invalid migration status line: {0}")]
    InvalidMigrationStatus(String),
    #[error("Missing required field: {0}")]
    MissingField(String),
}

/// State of the cluster as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterState {
    /// Cluster is healthy and serving requests.
    Ok,
    /// Cluster is in a failed state.
    Fail,
}

impl FromStr for ClusterState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ok" => Ok(ClusterState::Ok),
            "fail" => Ok(ClusterState::Fail),
            _ => Err(ParseError::InvalidClusterInfo(format!(
                "Unknown cluster state: {}",
                s
            ))),
        }
    }
}

/// Parsed output of the `CLUSTER INFO` command.
#[derive(Debug, Clone)]
pub struct ClusterInfo {
    /// Current state of the cluster.
    pub state: ClusterState,
    /// Number of hash slots assigned across the cluster.
    pub slots_assigned: i32,
    /// Number of hash slots served by healthy nodes.
    pub slots_ok: i32,
    /// Number of hash slots in PFAIL state.
    pub slots_pfail: i32,
    /// Number of hash slots in FAIL state.
    pub slots_fail: i32,
    /// Total number of known nodes.
    pub known_nodes: i32,
    /// Number of masters serving at least one slot.
    pub cluster_size: i32,
}

impl ClusterInfo {
    /// Parse the output of `CLUSTER INFO`.
    pub fn parse(info: &str) -> Result<Self, ParseError> {
        let mut raw = std::collections::HashMap::new();
        for line in info.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once(':') {
                raw.insert(key.to_string(), value.to_string());
            }
        }

        let state = raw
            .get("cluster_state")
            .ok_or_else(|| ParseError::MissingField("cluster_state".to_string()))?
            .parse()?;

        let get_i32 = |key: &str| -> Result<i32, ParseError> {
            raw.get(key)
                .ok_or_else(|| ParseError::MissingField(key.to_string()))?
                .parse()
                .map_err(|_| ParseError::InvalidClusterInfo(format!("Invalid {} value", key)))
        };

        Ok(ClusterInfo {
            state,
            slots_assigned: get_i32("cluster_slots_assigned")?,
            slots_ok: get_i32("cluster_slots_ok")?,
            slots_pfail: get_i32("cluster_slots_pfail")?,
            slots_fail: get_i32("cluster_slots_fail")?,
            known_nodes: get_i32("cluster_known_nodes")?,
            cluster_size: get_i32("cluster_size")?,
        })
    }

    /// Check if the cluster is healthy: state ok, no failing slots.
    pub fn is_healthy(&self) -> bool {
        self.state == ClusterState::Ok && self.slots_fail == 0 && self.slots_pfail == 0
    }
}

/// Role of a cluster node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    /// Node is a master serving hash slots.
    Master,
    /// Node is a replica of a master.
    Slave,
}

impl std::fmt::Display for NodeRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeRole::Master => write!(f, "master"),
            NodeRole::Slave => write!(f, "slave"),
        }
    }
}

/// Link state of the cluster bus connection to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Connected,
    Disconnected,
}

impl FromStr for LinkState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connected" => Ok(LinkState::Connected),
            "disconnected" => Ok(LinkState::Disconnected),
            other => Err(ParseError::InvalidClusterNodes(format!(
                "Unknown link state: {}",
                other
            ))),
        }
    }
}

/// Failure flags reported for a node in the topology dump.
#[derive(Debug, Clone, Default)]
pub struct NodeFlags {
    /// This is the node answering the dump.
    pub myself: bool,
    /// Node is a master.
    pub master: bool,
    /// Node is a replica.
    pub slave: bool,
    /// Node is suspected failed by the answering node.
    pub pfail: bool,
    /// Node is agreed failed.
    pub fail: bool,
    /// Node is still in the membership handshake.
    pub handshake: bool,
    /// Node has no known address yet.
    pub noaddr: bool,
}

impl NodeFlags {
    /// Parse the comma-separated flags column.
    pub fn parse(flags_str: &str) -> Self {
        let mut flags = NodeFlags::default();
        for flag in flags_str.split(',') {
            match flag.trim() {
                "myself" => flags.myself = true,
                "master" => flags.master = true,
                "slave" => flags.slave = true,
                "pfail" => flags.pfail = true,
                "fail" => flags.fail = true,
                "handshake" => flags.handshake = true,
                "noaddr" => flags.noaddr = true,
                _ => {}
            }
        }
        flags
    }

    /// Get the role based on flags.
    pub fn role(&self) -> NodeRole {
        if self.master {
            NodeRole::Master
        } else {
            NodeRole::Slave
        }
    }

    /// Check that none of the failure flags is set.
    pub fn is_healthy(&self) -> bool {
        !self.fail && !self.pfail && !self.handshake && !self.noaddr
    }
}

/// A cluster node as reported by the topology dump.
///
/// Snapshots are throwaway: gossip state changes between calls, so every
/// operation step re-reads the topology instead of holding onto one of
/// these.
#[derive(Debug, Clone)]
pub struct ClusterNode {
    /// Opaque gossip identity.
    pub node_id: String,
    /// `ip:port` of the client endpoint.
    pub addr: String,
    /// IP address only.
    pub ip: String,
    /// Client port.
    pub port: u16,
    /// Node flags.
    pub flags: NodeFlags,
    /// Master node id if this is a replica.
    pub master_id: Option<String>,
    /// Config epoch.
    pub config_epoch: i64,
    /// Cluster bus link state.
    pub link_state: LinkState,
    /// Owned slots, expanded in topology-listing order. Migration planning
    /// takes from the tail of this list.
    pub slots: Vec<u16>,
}

impl ClusterNode {
    /// Get the role of this node.
    pub fn role(&self) -> NodeRole {
        self.flags.role()
    }

    /// Check if this is a master node.
    pub fn is_master(&self) -> bool {
        self.flags.master
    }

    /// Check if this is a replica node.
    pub fn is_replica(&self) -> bool {
        self.flags.slave
    }

    /// A master that is connected and carries no failure flags.
    pub fn is_running_master(&self) -> bool {
        self.is_master() && self.link_state == LinkState::Connected && self.flags.is_healthy()
    }

    /// Check if this node owns every slot of `slots`.
    pub fn owns_all(&self, slots: &[u16]) -> bool {
        slots.iter().all(|s| self.slots.contains(s))
    }

    /// Check if this node owns any slot of `slots`.
    pub fn owns_any(&self, slots: &[u16]) -> bool {
        slots.iter().any(|s| self.slots.contains(s))
    }

    /// Parse a single line of the topology dump.
    pub fn parse_line(line: &str) -> Result<Self, ParseError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 8 {
            return Err(ParseError::InvalidClusterNodes(format!(
                "Not enough fields in line: {}",
                line
            )));
        }

        let node_id = parts[0].to_string();

        // Address column: ip:port@cport or ip:port
        let ip_port = parts[1].split('@').next().unwrap_or(parts[1]);
        let (ip, port) = match ip_port.rsplit_once(':') {
            Some((ip, port_str)) => {
                let port = port_str.parse().map_err(|_| {
                    ParseError::InvalidClusterNodes(format!("Invalid port: {}", port_str))
                })?;
                (ip.to_string(), port)
            }
            None => {
                return Err(ParseError::InvalidClusterNodes(format!(
                    "Invalid address format: {}",
                    ip_port
                )));
            }
        };

        let flags = NodeFlags::parse(parts[2]);
        let master_id = if parts[3] == "-" {
            None
        } else {
            Some(parts[3].to_string())
        };
        let config_epoch = parts[6].parse().unwrap_or(0);
        let link_state = parts[7].parse()?;

        // Remaining columns are slot ranges (masters only). Entries in
        // square brackets are in-flight import/export markers, not owned
        // slots.
        let mut slots = Vec::new();
        for part in &parts[8..] {
            if part.starts_with('[') {
                continue;
            }
            match part.split_once('-') {
                Some((start, end)) => {
                    let start: u16 = start.parse().map_err(|_| {
                        ParseError::InvalidSlotRange(format!("Invalid range: {}", part))
                    })?;
                    let end: u16 = end.parse().map_err(|_| {
                        ParseError::InvalidSlotRange(format!("Invalid range: {}", part))
                    })?;
                    if start > end {
                        return Err(ParseError::InvalidSlotRange(format!(
                            "Reversed range: {}",
                            part
                        )));
                    }
                    slots.extend(start..=end);
                }
                None => slots.push(part.parse().map_err(|_| {
                    ParseError::InvalidSlotRange(format!("Invalid slot: {}", part))
                })?),
            }
        }

        Ok(ClusterNode {
            node_id,
            addr: ip_port.to_string(),
            ip,
            port,
            flags,
            master_id,
            config_epoch,
            link_state,
            slots,
        })
    }
}

/// Parse a full topology dump into nodes, skipping blank lines.
pub fn parse_cluster_nodes(output: &str) -> Result<Vec<ClusterNode>, ParseError> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(ClusterNode::parse_line)
        .collect()
}

/// Mode argument of the manual-failover command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailoverMode {
    /// Coordinated handoff; the store runs its own safety checks.
    Graceful,
    /// Force promotion without coordinating with the master.
    Force,
    /// Promote unconditionally, skipping the store's safety checks.
    Takeover,
}

/// Per-slot state reported by the destination's migration status listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportState {
    /// Keys are still streaming in.
    Running,
    /// The slot finished importing.
    Success,
    /// The import failed on the destination.
    Fail,
}

impl FromStr for ImportState {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(ImportState::Running),
            "success" => Ok(ImportState::Success),
            "fail" => Ok(ImportState::Fail),
            other => Err(ParseError::InvalidMigrationStatus(format!(
                "Unknown import state: {}",
                other
            ))),
        }
    }
}

/// One entry of the per-slot migration status listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotImportStatus {
    /// The slot this entry describes.
    pub slot: u16,
    /// Task id the import handshake returned.
    pub task_id: String,
    /// Current state of the import.
    pub state: ImportState,
}

impl SlotImportStatus {
    /// Parse one status line of the form
    /// `slot=<n> task=<id> state=<running|success|fail>`.
    pub fn parse_line(line: &str) -> Result<Self, ParseError> {
        let mut slot = None;
        let mut task_id = None;
        let mut state = None;
        for field in line.split_whitespace() {
            match field.split_once('=') {
                Some(("slot", v)) => {
                    slot = Some(v.parse().map_err(|_| {
                        ParseError::InvalidMigrationStatus(format!("Bad slot in: {}", line))
                    })?);
                }
                Some(("task", v)) => task_id = Some(v.to_string()),
                Some(("state", v)) => state = Some(v.parse()?),
                _ => {}
            }
        }
        Ok(SlotImportStatus {
            slot: slot
                .ok_or_else(|| ParseError::MissingField(format!("slot in: {}", line)))?,
            task_id: task_id
                .ok_or_else(|| ParseError::MissingField(format!("task in: {}", line)))?,
            state: state
                .ok_or_else(|| ParseError::MissingField(format!("state in: {}", line)))?,
        })
    }
}
