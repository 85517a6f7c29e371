//! Wire client for cluster maintenance commands.
//!
//! The operation drivers are generic over two small traits: [`Connector`]
//! dials one node at a time, [`NodeHandle`] issues the command family
//! against it. The `fred`-backed production implementation lives in
//! [`valkey`]; tests script their own implementations. Auth and dialect
//! selection stay behind the connector, so the drivers only ever see typed
//! results and [`crate::error::OpsError`] values.

pub mod commands;
pub mod parsing;
pub mod types;
pub mod valkey;

pub use commands::Reply;
pub use types::{
    ClusterInfo, ClusterNode, ClusterState, FailoverMode, ImportState, LinkState, NodeFlags,
    NodeRole, ParseError, SlotImportStatus,
};
pub use valkey::{ValkeyConnector, ValkeyHandle};

use crate::error::Result;

/// Dials short-lived per-node connections.
pub trait Connector: Send + Sync {
    /// The per-node handle this connector produces.
    type Handle: NodeHandle;

    /// Connect to `addr` (`ip:port`), authenticating as configured.
    fn connect(&self, addr: &str) -> impl Future<Output = Result<Self::Handle>> + Send;
}

/// Command surface of a single cluster node.
///
/// One handle per dialed node; every method is one wire command. Errors
/// carry the raw protocol text so callers can classify store replies.
pub trait NodeHandle: Send + Sync {
    /// Address this handle is connected to.
    fn addr(&self) -> &str;

    /// Topology dump (`CLUSTER NODES`), raw text.
    fn cluster_nodes_raw(&self) -> impl Future<Output = Result<String>> + Send;

    /// Cluster summary (`CLUSTER INFO`), raw text.
    fn cluster_info_raw(&self) -> impl Future<Output = Result<String>> + Send;

    /// `INFO [section]`, raw text.
    fn info(&self, section: Option<&str>) -> impl Future<Output = Result<String>> + Send;

    /// Start importing `slots` from the master identified by `source_id`.
    /// Returns the opaque task id the store assigns.
    fn import_slots(
        &self,
        slots: &[u16],
        source_id: &str,
    ) -> impl Future<Output = Result<String>> + Send;

    /// Re-enter an in-progress import after an endpoint change.
    fn restart_import(
        &self,
        slots: &[u16],
        source_id: &str,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Clear migration bookkeeping for `slots` on this node. Idempotent,
    /// not a data flush.
    fn stabilize_slots(&self, slots: &[u16]) -> impl Future<Output = Result<()>> + Send;

    /// Per-slot migration status of this node.
    fn migration_status(
        &self,
    ) -> impl Future<Output = Result<Vec<SlotImportStatus>>> + Send;

    /// Manual failover of this replica over its master.
    fn failover(&self, mode: FailoverMode) -> impl Future<Output = Result<()>> + Send;

    /// Drop `node_id` from this node's membership view.
    fn forget(&self, node_id: &str) -> impl Future<Output = Result<()>> + Send;

    /// Introduce another node to the cluster.
    fn meet(&self, ip: &str, port: u16) -> impl Future<Output = Result<()>> + Send;

    /// Reset this node's cluster state.
    fn reset(&self, hard: bool) -> impl Future<Output = Result<()>> + Send;

    /// `CONFIG GET <key>`, first value if present.
    fn config_get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;
}
