//! Node introduction.
//!
//! Issues the meet command for each new node through a reachable seed and
//! waits until every one of them shows up in the topology with the
//! membership handshake cleared and its link up. Run before an equalize
//! rebalance onto fresh shards.

use tracing::{info, instrument};

use crate::client::types::LinkState;
use crate::client::{Connector, NodeHandle};
use crate::config::OpsConfig;
use crate::error::{OpsError, Result};
use crate::view::ClusterView;

/// Introduce `new_nodes` (`(ip, port)` pairs) to the cluster via `seed`.
#[instrument(skip(connector, config))]
pub async fn run<C: Connector>(
    connector: &C,
    config: &OpsConfig,
    seed: &str,
    new_nodes: &[(String, u16)],
) -> Result<()> {
    if new_nodes.is_empty() {
        return Err(OpsError::Validation("no nodes to introduce".to_string()));
    }

    let handle = connector.connect(seed).await?;
    for (ip, port) in new_nodes {
        info!(ip = %ip, port = %port, "issuing cluster meet");
        handle.meet(ip, *port).await?;
    }

    let expected: Vec<String> = new_nodes
        .iter()
        .map(|(ip, port)| format!("{}:{}", ip, port))
        .collect();
    let seeds = vec![seed.to_string()];
    for _ in 0..config.join_poll_tries {
        tokio::time::sleep(config.join_poll_interval).await;
        let view = ClusterView::fetch(connector, &seeds).await?;
        let all_joined = expected.iter().all(|addr| {
            view.by_addr(addr).is_some_and(|node| {
                !node.flags.handshake
                    && !node.flags.noaddr
                    && node.link_state == LinkState::Connected
            })
        });
        if all_joined {
            info!(nodes = expected.len(), "all nodes joined the cluster");
            return Ok(());
        }
    }
    Err(OpsError::Timeout {
        operation: format!("cluster meet via {}", seed),
        duration: config.join_poll_interval * config.join_poll_tries,
    })
}
