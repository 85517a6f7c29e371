//! Node retirement: drain, confirm, forget.
//!
//! A retirement plan captures the retiring masters and their replica ids
//! *before* anything moves (replicas may re-attach elsewhere once their
//! master empties), drains every retiring slot onto the survivors as an
//! ordinary migration batch, re-reads the topology to confirm the drain,
//! and finally broadcasts forget across the surviving membership.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::client::Connector;
use crate::config::OpsConfig;
use crate::error::{OpsError, Result};
use crate::ops::{batch, forget};
use crate::slots::balance::MasterLoad;
use crate::slots::{format_slots, plan_drain};
use crate::tasks::{BatchReport, RetirementPlan, RetiringNode};
use crate::view::ClusterView;

/// Result of a completed retirement.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetirementReport {
    /// The plan as executed.
    pub plan: RetirementPlan,
    /// Report of the drain batch.
    pub batch: BatchReport,
}

/// Build a retirement plan from a live view.
///
/// Validates that every retiring address is a master in the topology and
/// that at least one running master survives.
pub fn plan_retirement(view: &ClusterView, retiring_addrs: &[String]) -> Result<RetirementPlan> {
    let mut retiring = Vec::new();
    let mut retiring_loads = Vec::new();
    for addr in retiring_addrs {
        let node = view
            .by_addr(addr)
            .ok_or_else(|| OpsError::Validation(format!("{} not in topology", addr)))?;
        if !node.is_master() {
            return Err(OpsError::Validation(format!(
                "{} is not a master, retire its master instead",
                addr
            )));
        }
        let replicas = view.replicas_of(&node.node_id);
        retiring.push(RetiringNode {
            addr: node.addr.clone(),
            node_id: node.node_id.clone(),
            replica_ids: replicas.iter().map(|r| r.node_id.clone()).collect(),
            replica_addrs: replicas.iter().map(|r| r.addr.clone()).collect(),
        });
        retiring_loads.push(MasterLoad::new(node.addr.clone(), node.slots.clone()));
    }

    let survivors: Vec<MasterLoad> = MasterLoad::snapshot(view)
        .into_iter()
        .filter(|load| !retiring_addrs.contains(&load.addr))
        .collect();
    let tasks = plan_drain(&survivors, &retiring_loads)?;
    Ok(RetirementPlan { retiring, tasks })
}

/// Retire the masters at `retiring_addrs`: drain, confirm, forget.
#[instrument(skip(connector, config))]
pub async fn run<C>(
    connector: Arc<C>,
    config: OpsConfig,
    seeds: &[String],
    retiring_addrs: &[String],
) -> Result<RetirementReport>
where
    C: Connector + 'static,
{
    let view = ClusterView::fetch(&*connector, seeds).await?;
    let plan = plan_retirement(&view, retiring_addrs)?;
    let survivor_addrs: Vec<String> = view
        .running_masters()
        .iter()
        .filter(|m| !retiring_addrs.contains(&m.addr))
        .map(|m| m.addr.clone())
        .collect();
    info!(
        retiring = plan.retiring.len(),
        tasks = plan.tasks.len(),
        "executing retirement drain"
    );

    let batch = batch::run_migrations(Arc::clone(&connector), config, plan.tasks.clone()).await?;

    // The drain must be confirmed empty before anyone forgets the node:
    // forgetting a master that still owns slots orphans them.
    let fresh = ClusterView::fetch(&*connector, &survivor_addrs).await?;
    for node in &plan.retiring {
        if let Some(current) = fresh.by_id(&node.node_id)
            && !current.slots.is_empty()
        {
            return Err(OpsError::Validation(format!(
                "{} still owns slots {} after drain",
                node.addr,
                format_slots(&current.slots)
            )));
        }
    }

    let forget_ids = plan.ids_to_forget();
    let survivors: Vec<String> = fresh
        .nodes()
        .iter()
        .filter(|n| !forget_ids.contains(&n.node_id))
        .map(|n| n.addr.clone())
        .collect();
    forget::broadcast(&*connector, &survivors, &forget_ids).await?;

    info!(forgotten = forget_ids.len(), "retirement complete");
    Ok(RetirementReport { plan, batch })
}
