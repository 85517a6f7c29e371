//! Manual failover coordination.
//!
//! Promotes replicas over their masters, gracefully or by takeover.
//! Graceful tasks pass a full precondition sweep before anything mutates;
//! the sweep failing anywhere fails the whole batch with nothing applied.
//! Execution groups tasks by physical replica host: same-host tasks
//! serialize, cross-host tasks run in parallel, and the read-only wait for
//! the old master's demotion overlaps the next task in the group.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use crate::client::parsing::ReplicationInfo;
use crate::client::types::{ClusterInfo, FailoverMode, LinkState};
use crate::client::{Connector, NodeHandle};
use crate::config::OpsConfig;
use crate::error::{OpsError, Result};
use crate::ops::batch::host_of;
use crate::tasks::{FailoverOutcome, FailoverReport, FailoverTask};
use crate::view::ClusterView;

/// Execute a batch of failover tasks.
///
/// Graceful preconditions are checked for every non-forced task before any
/// failover is issued; a single failure is fatal with no partial
/// application. Execution outcomes (`Done`, `TimedOut`, `Failed`) are
/// reported per task and never auto-retried.
#[instrument(skip(connector, config, tasks), fields(tasks = tasks.len()))]
pub async fn run_failovers<C>(
    connector: Arc<C>,
    config: OpsConfig,
    tasks: Vec<FailoverTask>,
) -> Result<Vec<FailoverReport>>
where
    C: Connector + 'static,
{
    if tasks.is_empty() {
        return Ok(Vec::new());
    }

    let seeds: Vec<String> = tasks
        .iter()
        .flat_map(|t| [t.master.clone(), t.slave.clone()])
        .collect();
    let view = ClusterView::fetch(&*connector, &seeds).await?;
    check_preconditions(&*connector, &config, &view, &tasks).await?;

    // Group by physical replica host.
    let mut host_groups: HashMap<String, usize> = HashMap::new();
    let mut groups: Vec<Vec<FailoverTask>> = Vec::new();
    for task in tasks {
        let host = host_of(&task.slave).to_string();
        let idx = *host_groups.entry(host).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        if let Some(group) = groups.get_mut(idx) {
            group.push(task);
        }
    }

    let mut workers: JoinSet<(usize, Vec<FailoverReport>)> = JoinSet::new();
    for (idx, group) in groups.into_iter().enumerate() {
        let connector = Arc::clone(&connector);
        let config = config.clone();
        workers.spawn(async move { (idx, run_group(connector, config, group).await) });
    }

    let mut results: Vec<(usize, Vec<FailoverReport>)> = Vec::new();
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok(result) => results.push(result),
            Err(join_err) => {
                return Err(OpsError::Validation(format!(
                    "failover worker aborted: {}",
                    join_err
                )));
            }
        }
    }
    results.sort_by_key(|(idx, _)| *idx);
    Ok(results.into_iter().flat_map(|(_, r)| r).collect())
}

/// Graceful-mode precondition sweep. Forced tasks are exempt.
async fn check_preconditions<C: Connector>(
    connector: &C,
    config: &OpsConfig,
    view: &ClusterView,
    tasks: &[FailoverTask],
) -> Result<()> {
    let graceful: Vec<&FailoverTask> = tasks.iter().filter(|t| !t.force).collect();
    if graceful.is_empty() {
        return Ok(());
    }

    // Cluster healthy, as reported by a running master.
    let info_addr = view
        .running_masters()
        .first()
        .map(|m| m.addr.clone())
        .unwrap_or_else(|| view.origin().to_string());
    let handle = connector.connect(&info_addr).await?;
    let info = ClusterInfo::parse(&handle.cluster_info_raw().await?)?;
    if !info.is_healthy() {
        return Err(OpsError::Validation(format!(
            "cluster unhealthy before failover: {} failing and {} suspect slots",
            info.slots_fail, info.slots_pfail
        )));
    }

    for task in &graceful {
        let master = view.by_addr(&task.master).ok_or_else(|| {
            OpsError::Validation(format!("master {} not in topology", task.master))
        })?;
        let slave = view.by_addr(&task.slave).ok_or_else(|| {
            OpsError::Validation(format!("slave {} not in topology", task.slave))
        })?;
        if !master.is_master() {
            return Err(OpsError::Validation(format!(
                "{} is not a master",
                task.master
            )));
        }
        if !slave.is_replica() || slave.master_id.as_deref() != Some(master.node_id.as_str()) {
            return Err(OpsError::Validation(format!(
                "{} is not a replica of {}",
                task.slave, task.master
            )));
        }

        // Replica reachable, linked, and nearly caught up.
        let handle = connector.connect(&task.slave).await.map_err(|err| {
            OpsError::Validation(format!("slave {} unreachable: {}", task.slave, err))
        })?;
        let repl = ReplicationInfo::parse(&handle.info(Some("replication")).await?);
        if !repl.link_up() {
            return Err(OpsError::Validation(format!(
                "replication link down on {}",
                task.slave
            )));
        }
        let lag = repl.replication_lag().ok_or_else(|| {
            OpsError::Validation(format!(
                "cannot determine replication lag on {}",
                task.slave
            ))
        })?;
        if lag > config.max_replication_lag_bytes {
            return Err(OpsError::Validation(format!(
                "replication lag on {} is {} bytes, above the {} byte threshold",
                task.slave, lag, config.max_replication_lag_bytes
            )));
        }
    }

    // Auth config must be replicated everywhere before roles change hands.
    let expected = config.password.clone().unwrap_or_default();
    for master in view.running_masters() {
        let handle = connector.connect(&master.addr).await.map_err(|err| {
            OpsError::Validation(format!("master {} unreachable: {}", master.addr, err))
        })?;
        let value = handle.config_get("requirepass").await?.unwrap_or_default();
        if value != expected {
            return Err(OpsError::Validation(format!(
                "auth config not replicated to {}",
                master.addr
            )));
        }
    }
    debug!(tasks = graceful.len(), "failover preconditions satisfied");
    Ok(())
}

async fn run_group<C>(
    connector: Arc<C>,
    config: OpsConfig,
    group: Vec<FailoverTask>,
) -> Vec<FailoverReport>
where
    C: Connector + 'static,
{
    let mut reports = Vec::new();
    let mut demote_waits: Vec<(FailoverTask, tokio::task::JoinHandle<FailoverOutcome>)> =
        Vec::new();

    for task in group {
        match promote(&*connector, &config, &task).await {
            Ok(Promotion::Promoted { new_master_id }) => {
                if task.force {
                    reports.push(FailoverReport {
                        task,
                        outcome: FailoverOutcome::Done,
                    });
                } else {
                    // Read-only wait; runs while the next task in the
                    // group proceeds.
                    let handle = tokio::spawn(wait_demoted(
                        Arc::clone(&connector),
                        config.clone(),
                        task.clone(),
                        new_master_id,
                    ));
                    demote_waits.push((task, handle));
                }
            }
            Ok(Promotion::TimedOut) => {
                warn!(slave = %task.slave, "replica did not report master role in time");
                reports.push(FailoverReport {
                    task,
                    outcome: FailoverOutcome::TimedOut,
                });
            }
            Err(err) => {
                warn!(slave = %task.slave, error = %err, "failover failed");
                reports.push(FailoverReport {
                    task,
                    outcome: FailoverOutcome::Failed(err.to_string()),
                });
            }
        }
    }

    let (tasks, handles): (Vec<_>, Vec<_>) = demote_waits.into_iter().unzip();
    for (task, joined) in tasks.into_iter().zip(join_all(handles).await) {
        let outcome = match joined {
            Ok(outcome) => outcome,
            Err(join_err) => FailoverOutcome::Failed(format!("demote wait aborted: {}", join_err)),
        };
        reports.push(FailoverReport { task, outcome });
    }
    reports
}

enum Promotion {
    Promoted { new_master_id: String },
    TimedOut,
}

/// Issue the failover command and wait for the replica to report itself
/// master.
async fn promote<C: Connector>(
    connector: &C,
    config: &OpsConfig,
    task: &FailoverTask,
) -> Result<Promotion> {
    let handle = connector.connect(&task.slave).await?;
    let mode = if task.force {
        FailoverMode::Takeover
    } else {
        FailoverMode::Graceful
    };
    info!(slave = %task.slave, master = %task.master, ?mode, "issuing manual failover");
    handle.failover(mode).await?;

    for _ in 0..config.failover_poll_tries {
        tokio::time::sleep(config.failover_poll_interval).await;
        let raw = match connector.connect(&task.slave).await {
            Ok(handle) => match handle.info(Some("replication")).await {
                Ok(raw) => raw,
                Err(err) => {
                    debug!(slave = %task.slave, error = %err, "role check failed, polling on");
                    continue;
                }
            },
            Err(err) => {
                debug!(slave = %task.slave, error = %err, "replica not reachable, polling on");
                continue;
            }
        };
        if ReplicationInfo::parse(&raw).is_master() {
            let view =
                ClusterView::fetch(connector, std::slice::from_ref(&task.slave)).await?;
            let new_master_id = view
                .by_addr(&task.slave)
                .map(|n| n.node_id.clone())
                .ok_or_else(|| {
                    OpsError::Validation(format!(
                        "promoted replica {} missing from its own topology",
                        task.slave
                    ))
                })?;
            info!(slave = %task.slave, "replica promoted");
            return Ok(Promotion::Promoted { new_master_id });
        }
    }
    Ok(Promotion::TimedOut)
}

/// Wait until the old master reports itself a replica of the new master
/// with its link up.
async fn wait_demoted<C: Connector>(
    connector: Arc<C>,
    config: OpsConfig,
    task: FailoverTask,
    new_master_id: String,
) -> FailoverOutcome {
    for _ in 0..config.failover_poll_tries {
        tokio::time::sleep(config.failover_poll_interval).await;
        let view = match ClusterView::fetch(&*connector, std::slice::from_ref(&task.slave)).await
        {
            Ok(view) => view,
            Err(err) => {
                debug!(slave = %task.slave, error = %err, "demote check failed, polling on");
                continue;
            }
        };
        if let Some(old_master) = view.by_addr(&task.master)
            && old_master.is_replica()
            && old_master.master_id.as_deref() == Some(new_master_id.as_str())
            && old_master.link_state == LinkState::Connected
        {
            info!(master = %task.master, slave = %task.slave, "old master demoted");
            return FailoverOutcome::Done;
        }
    }
    warn!(master = %task.master, "old master did not demote in time");
    FailoverOutcome::TimedOut
}
