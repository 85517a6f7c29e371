//! Forget broadcast.
//!
//! Removes retired node identities from every surviving node's membership
//! view. Failures do not stop the broadcast: forget is attempted against
//! every survivor, and the per-survivor failures come back in one
//! aggregate error for the operator to resolve before re-running. A
//! survivor answering "unknown node id" counts as a failure like any
//! other.

use tracing::{debug, instrument, warn};

use crate::client::{Connector, NodeHandle};
use crate::error::{OpsError, Result};

/// Issue forget for every id in `node_ids` against every node in
/// `survivors`.
#[instrument(skip(connector), fields(survivors = survivors.len(), ids = node_ids.len()))]
pub async fn broadcast<C: Connector>(
    connector: &C,
    survivors: &[String],
    node_ids: &[String],
) -> Result<()> {
    let mut failures: Vec<(String, OpsError)> = Vec::new();
    for addr in survivors {
        let handle = match connector.connect(addr).await {
            Ok(handle) => handle,
            Err(err) => {
                warn!(addr = %addr, error = %err, "survivor unreachable for forget");
                failures.push((addr.clone(), err));
                continue;
            }
        };
        for node_id in node_ids {
            match handle.forget(node_id).await {
                Ok(()) => debug!(addr = %addr, node_id = %node_id, "forget acknowledged"),
                Err(err) => {
                    warn!(addr = %addr, node_id = %node_id, error = %err, "forget rejected");
                    failures.push((addr.clone(), err));
                }
            }
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(OpsError::Aggregate { failures })
    }
}
