//! Migration batch driver.
//!
//! Tasks that touch the same physical host must not overlap: imports per
//! destination are single-flight, and a donor streaming to two receivers
//! at once competes with itself. The driver therefore buckets tasks into
//! conflict groups (any shared host links two tasks into the same group),
//! runs the groups in parallel and the tasks within a group sequentially.
//!
//! The batch fails on the first task error, but every in-flight worker is
//! joined before returning so no connection is left dangling; tasks not
//! yet started stay `Planned`.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use jiff::Timestamp;
use tokio::task::JoinSet;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::client::Connector;
use crate::config::OpsConfig;
use crate::error::{OpsError, Result};
use crate::ops::migrate::SlotMigration;
use crate::tasks::{BatchReport, MigrationTask};

/// Physical host part of an `ip:port` address.
pub(crate) fn host_of(addr: &str) -> &str {
    addr.split(':').next().unwrap_or(addr)
}

/// Reject plans that schedule one slot in two tasks.
fn check_disjoint(tasks: &[MigrationTask]) -> Result<()> {
    let mut seen: HashSet<u16> = HashSet::new();
    for task in tasks {
        for slot in &task.slots {
            if !seen.insert(*slot) {
                return Err(OpsError::Validation(format!(
                    "slot {} is scheduled by more than one task",
                    slot
                )));
            }
        }
    }
    Ok(())
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let ra = find(parent, a);
    let rb = find(parent, b);
    if ra != rb {
        parent[rb] = ra;
    }
}

/// Bucket tasks into conflict groups: tasks sharing a source or
/// destination host transitively land in the same group. Task order is
/// preserved within each group.
fn conflict_groups(tasks: Vec<MigrationTask>) -> Vec<Vec<MigrationTask>> {
    let mut parent: Vec<usize> = (0..tasks.len()).collect();
    let mut host_owner: HashMap<String, usize> = HashMap::new();
    for (idx, task) in tasks.iter().enumerate() {
        for host in [host_of(&task.source), host_of(&task.dest)] {
            match host_owner.entry(host.to_string()) {
                Entry::Occupied(entry) => union(&mut parent, idx, *entry.get()),
                Entry::Vacant(entry) => {
                    entry.insert(idx);
                }
            }
        }
    }

    let mut group_index: HashMap<usize, usize> = HashMap::new();
    let mut groups: Vec<Vec<MigrationTask>> = Vec::new();
    for (idx, task) in tasks.into_iter().enumerate() {
        let root = find(&mut parent, idx);
        let slot = *group_index.entry(root).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        if let Some(group) = groups.get_mut(slot) {
            group.push(task);
        }
    }
    groups
}

/// Execute a batch of migration tasks.
///
/// Returns the report with final per-task statuses, or the first task
/// error after every in-flight worker reached a safe stopping point.
#[instrument(skip(connector, config, tasks), fields(tasks = tasks.len()))]
pub async fn run_migrations<C>(
    connector: Arc<C>,
    config: OpsConfig,
    tasks: Vec<MigrationTask>,
) -> Result<BatchReport>
where
    C: Connector + 'static,
{
    let op_id = Uuid::new_v4();
    let started_at = Timestamp::now();
    check_disjoint(&tasks)?;

    let groups = conflict_groups(tasks);
    info!(op_id = %op_id, groups = groups.len(), "dispatching migration batch");

    let abort = Arc::new(AtomicBool::new(false));
    let mut workers: JoinSet<(usize, Vec<MigrationTask>, Option<OpsError>)> = JoinSet::new();
    for (idx, group) in groups.into_iter().enumerate() {
        let connector = Arc::clone(&connector);
        let config = config.clone();
        let abort = Arc::clone(&abort);
        workers.spawn(async move {
            let mut finished = Vec::with_capacity(group.len());
            let mut first_err = None;
            for task in group {
                if abort.load(Ordering::SeqCst) {
                    // Batch already failing: leave the task untouched.
                    finished.push(task);
                    continue;
                }
                let mut runner = SlotMigration::new(&*connector, &config, task);
                if let Err(err) = runner.run().await {
                    warn!(task = %runner.task(), error = %err, "migration task failed");
                    abort.store(true, Ordering::SeqCst);
                    first_err = Some(err);
                }
                finished.push(runner.into_task());
            }
            (idx, finished, first_err)
        });
    }

    let mut results: Vec<(usize, Vec<MigrationTask>)> = Vec::new();
    let mut batch_err: Option<OpsError> = None;
    while let Some(joined) = workers.join_next().await {
        match joined {
            Ok((idx, finished, err)) => {
                if batch_err.is_none() {
                    batch_err = err;
                }
                results.push((idx, finished));
            }
            Err(join_err) => {
                if batch_err.is_none() {
                    batch_err = Some(OpsError::Validation(format!(
                        "migration worker aborted: {}",
                        join_err
                    )));
                }
            }
        }
    }

    if let Some(err) = batch_err {
        return Err(err);
    }

    results.sort_by_key(|(idx, _)| *idx);
    let report = BatchReport {
        op_id,
        started_at,
        finished_at: Timestamp::now(),
        tasks: results.into_iter().flat_map(|(_, tasks)| tasks).collect(),
    };
    info!(
        op_id = %op_id,
        succeeded = report.succeeded(),
        total = report.tasks.len(),
        "migration batch finished"
    );
    Ok(report)
}
