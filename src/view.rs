//! Live topology reader.
//!
//! Fetches and parses the topology dump from the first reachable seed.
//! A view is a throwaway snapshot: gossip state changes between calls, so
//! every operation step fetches a fresh one instead of caching.

use tracing::{debug, instrument, warn};

use crate::client::types::{ClusterNode, parse_cluster_nodes};
use crate::client::{Connector, NodeHandle};
use crate::error::{OpsError, Result};

/// One point-in-time topology snapshot, as reported by a single node.
#[derive(Debug, Clone)]
pub struct ClusterView {
    nodes: Vec<ClusterNode>,
    origin: String,
}

impl ClusterView {
    /// Fetch the topology from the first seed that answers.
    ///
    /// A seed that fails to dial or fails the read is skipped with a
    /// warning; if none answers the result is
    /// [`OpsError::ClusterUnreachable`].
    #[instrument(skip(connector))]
    pub async fn fetch<C: Connector>(connector: &C, seeds: &[String]) -> Result<Self> {
        for seed in seeds {
            let handle = match connector.connect(seed).await {
                Ok(handle) => handle,
                Err(err) => {
                    warn!(seed = %seed, error = %err, "seed not reachable");
                    continue;
                }
            };
            match handle.cluster_nodes_raw().await {
                Ok(raw) => {
                    let view = Self::parse(seed, &raw)?;
                    debug!(seed = %seed, nodes = view.nodes.len(), "topology fetched");
                    return Ok(view);
                }
                Err(err) => {
                    warn!(seed = %seed, error = %err, "topology read failed");
                }
            }
        }
        Err(OpsError::ClusterUnreachable {
            seeds: seeds.to_vec(),
        })
    }

    /// Parse a raw topology dump as reported by `origin`.
    pub fn parse(origin: &str, raw: &str) -> Result<Self> {
        let nodes = parse_cluster_nodes(raw)?;
        Ok(Self {
            nodes,
            origin: origin.to_string(),
        })
    }

    /// The seed that answered the dump.
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// All nodes in the snapshot.
    pub fn nodes(&self) -> &[ClusterNode] {
        &self.nodes
    }

    /// Node by client address.
    pub fn by_addr(&self, addr: &str) -> Option<&ClusterNode> {
        self.nodes.iter().find(|n| n.addr == addr)
    }

    /// Node by gossip identity.
    pub fn by_id(&self, node_id: &str) -> Option<&ClusterNode> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    /// Masters that are connected and carry no failure flags.
    pub fn running_masters(&self) -> Vec<&ClusterNode> {
        self.nodes_matching(|n| n.is_running_master())
    }

    /// Running masters that own at least one slot.
    pub fn masters_with_slots(&self) -> Vec<&ClusterNode> {
        self.nodes_matching(|n| n.is_running_master() && !n.slots.is_empty())
    }

    /// Nodes satisfying an arbitrary predicate.
    pub fn nodes_matching<P>(&self, predicate: P) -> Vec<&ClusterNode>
    where
        P: Fn(&ClusterNode) -> bool,
    {
        self.nodes.iter().filter(|n| predicate(n)).collect()
    }

    /// Replicas currently attached to the master with `master_id`.
    pub fn replicas_of(&self, master_id: &str) -> Vec<&ClusterNode> {
        self.nodes_matching(|n| n.master_id.as_deref() == Some(master_id))
    }
}
