//! `fred`-backed connector and node handle.
//!
//! Dials one node at a time (centralized server config): maintenance
//! commands must land on a specific node, never be routed by a clustered
//! client. Connections are short-lived; every operation step dials fresh.

use fred::prelude::*;
use fred::types::cluster::{ClusterFailoverFlag, ClusterResetFlag};
use fred::types::{ClusterHash, CustomCommand, Value};
use tracing::debug;

use crate::client::commands::{
    Reply, parse_migration_status, setslot_importing_args, setslot_info_args,
    setslot_restart_args, setslot_stable_args,
};
use crate::client::types::{FailoverMode, SlotImportStatus};
use crate::client::{Connector, NodeHandle};
use crate::config::OpsConfig;
use crate::error::{OpsError, Result};

/// Connector dialing real Valkey nodes.
#[derive(Debug, Clone)]
pub struct ValkeyConnector {
    config: OpsConfig,
}

impl ValkeyConnector {
    /// Create a connector with the given operation configuration.
    pub fn new(config: OpsConfig) -> Self {
        Self { config }
    }

    /// The configuration this connector dials with.
    pub fn config(&self) -> &OpsConfig {
        &self.config
    }
}

impl Connector for ValkeyConnector {
    type Handle = ValkeyHandle;

    async fn connect(&self, addr: &str) -> Result<ValkeyHandle> {
        let (host, port) = split_addr(addr)?;

        let mut redis_config = Config {
            server: ServerConfig::Centralized {
                server: Server::new(host, port),
            },
            ..Default::default()
        };
        if let Some(ref password) = self.config.password {
            redis_config.password = Some(password.clone());
        }

        let command_timeout = self.config.command_timeout;
        let connection_timeout = self.config.connect_timeout;
        let client = Builder::from_config(redis_config)
            .with_performance_config(|perf| {
                perf.default_command_timeout = command_timeout;
            })
            .with_connection_config(|conn| {
                conn.connection_timeout = connection_timeout;
            })
            .build()
            .map_err(|e| connection_err(addr, &e))?;

        debug!(addr, "dialing node");
        client.init().await.map_err(|e| connection_err(addr, &e))?;

        Ok(ValkeyHandle {
            addr: addr.to_string(),
            client,
        })
    }
}

/// Handle to a single dialed node.
pub struct ValkeyHandle {
    addr: String,
    client: Client,
}

impl ValkeyHandle {
    /// Close the connection.
    pub async fn close(&self) -> Result<()> {
        self.client.quit().await.map_err(|e| self.command_err(&e))?;
        Ok(())
    }

    fn command_err(&self, err: &fred::error::Error) -> OpsError {
        OpsError::Protocol {
            addr: self.addr.clone(),
            message: err.to_string(),
        }
    }

    async fn custom(&self, name: &'static str, args: Vec<String>) -> Result<Reply> {
        let cmd = CustomCommand::new_static(name, ClusterHash::Random, false);
        let value: Value = self
            .client
            .custom(cmd, args)
            .await
            .map_err(|e| self.command_err(&e))?;
        Ok(Reply::from_value(value))
    }
}

impl NodeHandle for ValkeyHandle {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn cluster_nodes_raw(&self) -> Result<String> {
        let response: String = self
            .client
            .cluster_nodes()
            .await
            .map_err(|e| self.command_err(&e))?;
        Ok(response)
    }

    async fn cluster_info_raw(&self) -> Result<String> {
        let response: String = self
            .client
            .cluster_info()
            .await
            .map_err(|e| self.command_err(&e))?;
        Ok(response)
    }

    async fn info(&self, section: Option<&str>) -> Result<String> {
        let args = section.map(|s| vec![s.to_string()]).unwrap_or_default();
        let reply = self.custom("INFO", args).await?;
        Ok(reply.into_simple()?)
    }

    async fn import_slots(&self, slots: &[u16], source_id: &str) -> Result<String> {
        let reply = self
            .custom("CLUSTER", setslot_importing_args(slots, source_id))
            .await?;
        Ok(reply.into_simple()?)
    }

    async fn restart_import(&self, slots: &[u16], source_id: &str) -> Result<()> {
        self.custom("CLUSTER", setslot_restart_args(slots, source_id))
            .await?;
        Ok(())
    }

    async fn stabilize_slots(&self, slots: &[u16]) -> Result<()> {
        self.custom("CLUSTER", setslot_stable_args(slots)).await?;
        Ok(())
    }

    async fn migration_status(&self) -> Result<Vec<SlotImportStatus>> {
        let reply = self.custom("CLUSTER", setslot_info_args()).await?;
        Ok(parse_migration_status(reply)?)
    }

    async fn failover(&self, mode: FailoverMode) -> Result<()> {
        let flag = match mode {
            FailoverMode::Graceful => None,
            FailoverMode::Force => Some(ClusterFailoverFlag::Force),
            FailoverMode::Takeover => Some(ClusterFailoverFlag::Takeover),
        };
        self.client
            .cluster_failover(flag)
            .await
            .map_err(|e| self.command_err(&e))?;
        Ok(())
    }

    async fn forget(&self, node_id: &str) -> Result<()> {
        self.client
            .cluster_forget(node_id)
            .await
            .map_err(|e| self.command_err(&e))?;
        Ok(())
    }

    async fn meet(&self, ip: &str, port: u16) -> Result<()> {
        self.client
            .cluster_meet(ip, port)
            .await
            .map_err(|e| self.command_err(&e))?;
        Ok(())
    }

    async fn reset(&self, hard: bool) -> Result<()> {
        let mode = if hard {
            Some(ClusterResetFlag::Hard)
        } else {
            Some(ClusterResetFlag::Soft)
        };
        self.client
            .cluster_reset(mode)
            .await
            .map_err(|e| self.command_err(&e))?;
        Ok(())
    }

    async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let reply = self
            .custom("CONFIG", vec!["GET".to_string(), key.to_string()])
            .await?;
        let lines = reply.into_lines()?;
        // Reply is alternating key/value pairs.
        let mut iter = lines.into_iter();
        while let Some(name) = iter.next() {
            let value = iter.next();
            if name == key {
                return Ok(value);
            }
        }
        Ok(None)
    }
}

/// Split `ip:port` into host and port.
fn split_addr(addr: &str) -> Result<(&str, u16)> {
    let (host, port_str) = addr.rsplit_once(':').ok_or_else(|| OpsError::Connection {
        addr: addr.to_string(),
        message: "address must be ip:port".to_string(),
    })?;
    let port = port_str.parse().map_err(|_| OpsError::Connection {
        addr: addr.to_string(),
        message: format!("invalid port: {}", port_str),
    })?;
    Ok((host, port))
}

fn connection_err(addr: &str, err: &fred::error::Error) -> OpsError {
    OpsError::Connection {
        addr: addr.to_string(),
        message: err.to_string(),
    }
}
