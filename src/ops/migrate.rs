//! Slot migration state machine.
//!
//! Executes one [`MigrationTask`]: validate ownership against fresh
//! topology, issue the import handshake on the destination, poll the
//! destination's per-slot status until the transfer settles, and survive a
//! destination or source failover mid-flight by relocating to the promoted
//! replica and re-entering with the restart variant.
//!
//! Migration is not atomic on the store side: keys stream over and
//! ownership metadata flips only once the stream finishes. The driver
//! therefore tolerates multi-minute windows, never assumes address
//! stability, and treats the restart command as safe re-entry into an
//! in-progress transfer.

use tracing::{debug, info, instrument, warn};

use crate::client::types::ImportState;
use crate::client::{Connector, NodeHandle};
use crate::config::OpsConfig;
use crate::error::{OpsError, Result};
use crate::slots::{format_slots, intersect};
use crate::tasks::{MigrationTask, TaskStatus};
use crate::view::ClusterView;

/// Which variant of the import handshake to send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImportKind {
    /// First attempt against this destination.
    Initial,
    /// Re-entry after a suspected endpoint failover.
    Restart,
}

/// Pre-migration snapshot of one endpoint.
///
/// Captured before the first handshake so that, if the endpoint fails over
/// mid-transfer, its former replica set and former slots are still known:
/// the promoted successor is the former replica now acting as master over
/// at least one of those slots.
#[derive(Debug, Clone)]
struct Endpoint {
    addr: String,
    node_id: String,
    slots_before: Vec<u16>,
    replica_addrs: Vec<String>,
    replica_ids: Vec<String>,
}

impl Endpoint {
    fn capture(view: &ClusterView, node: &crate::client::ClusterNode) -> Self {
        let replicas = view.replicas_of(&node.node_id);
        Endpoint {
            addr: node.addr.clone(),
            node_id: node.node_id.clone(),
            slots_before: node.slots.clone(),
            replica_addrs: replicas.iter().map(|r| r.addr.clone()).collect(),
            replica_ids: replicas.iter().map(|r| r.node_id.clone()).collect(),
        }
    }
}

/// Driver for a single slot-range transfer.
pub struct SlotMigration<'a, C: Connector> {
    connector: &'a C,
    config: &'a OpsConfig,
    task: MigrationTask,
}

impl<'a, C: Connector> SlotMigration<'a, C> {
    /// Create a driver owning `task` for the duration of the run.
    pub fn new(connector: &'a C, config: &'a OpsConfig, task: MigrationTask) -> Self {
        Self {
            connector,
            config,
            task,
        }
    }

    /// The task with its current status.
    pub fn task(&self) -> &MigrationTask {
        &self.task
    }

    /// Give the task back after a run.
    pub fn into_task(self) -> MigrationTask {
        self.task
    }

    /// Execute the transfer to a terminal state.
    #[instrument(
        skip(self),
        fields(source = %self.task.source, dest = %self.task.dest, slots = %self.task.slot_spec())
    )]
    pub async fn run(&mut self) -> Result<()> {
        match self.drive().await {
            Ok(()) => {
                self.task.status = TaskStatus::Succeeded;
                info!("migration succeeded");
                Ok(())
            }
            Err(err) => {
                self.task.status = match err {
                    // The store-side operation may still finish on its own.
                    OpsError::Timeout { .. } => TaskStatus::Unknown,
                    _ => TaskStatus::Failed,
                };
                Err(err)
            }
        }
    }

    async fn drive(&mut self) -> Result<()> {
        if self.task.slots.is_empty() {
            return Err(OpsError::Validation("task has no slots".to_string()));
        }
        if self.task.source == self.task.dest {
            return Err(OpsError::Validation(format!(
                "source and destination are both {}",
                self.task.source
            )));
        }

        let seeds = [self.task.source.clone(), self.task.dest.clone()];
        let view = ClusterView::fetch(self.connector, &seeds).await?;

        let dest_node = view.by_addr(&self.task.dest).ok_or_else(|| {
            OpsError::Validation(format!("destination {} not in topology", self.task.dest))
        })?;
        if dest_node.owns_all(&self.task.slots) {
            info!("destination already owns every slot, nothing to do");
            return Ok(());
        }

        // Both endpoints must answer before anything is issued.
        for addr in &seeds {
            self.connector.connect(addr).await?;
        }

        let source_node = view.by_addr(&self.task.source).ok_or_else(|| {
            OpsError::Validation(format!("source {} not in topology", self.task.source))
        })?;
        if !source_node.owns_all(&self.task.slots) {
            return Err(OpsError::InvalidOwnership {
                addr: self.task.source.clone(),
                expected: self.task.slot_spec(),
                actual: format_slots(&intersect(&source_node.slots, &self.task.slots)),
            });
        }

        let src = Endpoint::capture(&view, source_node);
        let dst = Endpoint::capture(&view, dest_node);

        self.task.status = TaskStatus::Importing;
        self.issue(&src, &dst, ImportKind::Initial).await?;
        match self.poll(&dst).await {
            Ok(()) => Ok(()),
            Err(err @ OpsError::MigrateFail { .. }) => {
                warn!(
                    error = %err,
                    cooldown = ?self.config.relocate_cooldown,
                    "import failed, suspecting an endpoint failover"
                );
                tokio::time::sleep(self.config.relocate_cooldown).await;

                let src = self.relocate(src).await?;
                let dst = self.relocate(dst).await?;
                self.issue(&src, &dst, ImportKind::Restart).await?;
                // A second failure is fatal and propagates as-is.
                self.poll(&dst).await
            }
            Err(err) => Err(err),
        }
    }

    /// Issue the import handshake on the destination, with the layered
    /// retry ladder:
    ///
    /// - "slot in deleting" and "slot not empty" are transient: long fixed
    ///   backoff, large bounded budget ("slot not empty" additionally gets
    ///   a bookkeeping reset on both endpoints first);
    /// - everything else: short backoff, small budget.
    ///
    /// Exhausting either budget is fatal `MigrationCommandFailed`.
    async fn issue(&self, src: &Endpoint, dst: &Endpoint, kind: ImportKind) -> Result<()> {
        let this = self;
        let connector = self.connector;
        let command_retry = self.config.command_retry;
        let slots = self.task.slots.as_slice();
        let source_id = src.node_id.as_str();
        let dest_addr = dst.addr.as_str();

        self.config
            .transient_retry
            .run(
                "import handshake",
                OpsError::is_transient_migration,
                move || async move {
                    let attempt = command_retry
                        .run(
                            "import command",
                            |err| !err.is_transient_migration(),
                            move || async move {
                                let dest = connector.connect(dest_addr).await?;
                                match kind {
                                    ImportKind::Initial => {
                                        let task_id =
                                            dest.import_slots(slots, source_id).await?;
                                        debug!(task_id, "import handshake accepted");
                                    }
                                    ImportKind::Restart => {
                                        dest.restart_import(slots, source_id).await?;
                                        debug!("import restart accepted");
                                    }
                                }
                                Ok(())
                            },
                        )
                        .await;
                    if let Err(ref err) = attempt
                        && err.is_slot_not_empty()
                    {
                        // Residue of an aborted prior attempt; clear the
                        // bookkeeping before the next handshake.
                        this.reset_bookkeeping(src, dst).await;
                    }
                    attempt
                },
            )
            .await
            .map_err(|err| OpsError::MigrationCommandFailed {
                addr: dst.addr.clone(),
                slots: self.task.slot_spec(),
                message: err.to_string(),
            })
    }

    /// Idempotent migration-bookkeeping reset on both endpoints. Not a
    /// data flush. Failures are logged and tolerated: the next handshake
    /// attempt surfaces anything real.
    async fn reset_bookkeeping(&self, src: &Endpoint, dst: &Endpoint) {
        for addr in [&src.addr, &dst.addr] {
            let result = async {
                self.connector
                    .connect(addr)
                    .await?
                    .stabilize_slots(&self.task.slots)
                    .await
            }
            .await;
            match result {
                Ok(()) => debug!(addr = %addr, "migration bookkeeping cleared"),
                Err(err) => warn!(addr = %addr, error = %err, "bookkeeping reset failed"),
            }
        }
    }

    /// Poll the destination's per-slot status until the transfer settles.
    ///
    /// Polling continues while *any* slot on the destination is still
    /// importing, not just this task's: imports onto one node are
    /// single-flight. The task's own slots landing in `fail`, or the
    /// destination ceasing to answer status queries, both classify as
    /// `MigrateFail`; slots absent from the listing are tolerated as
    /// unknown.
    async fn poll(&self, dst: &Endpoint) -> Result<()> {
        for _ in 0..self.config.status_poll_tries {
            let statuses = match self.query_status(&dst.addr).await {
                Ok(statuses) => statuses,
                Err(err) => {
                    return Err(OpsError::MigrateFail {
                        addr: dst.addr.clone(),
                        slots: self.task.slot_spec(),
                        message: format!("status query failed: {}", err),
                    });
                }
            };

            let failed: Vec<u16> = statuses
                .iter()
                .filter(|s| s.state == ImportState::Fail && self.task.slots.contains(&s.slot))
                .map(|s| s.slot)
                .collect();
            if !failed.is_empty() {
                return Err(OpsError::MigrateFail {
                    addr: dst.addr.clone(),
                    slots: format_slots(&failed),
                    message: "destination reported failed slots".to_string(),
                });
            }

            let running = statuses
                .iter()
                .filter(|s| s.state == ImportState::Running)
                .count();
            if running == 0 {
                debug!("destination reports no running imports");
                return Ok(());
            }
            debug!(running, "destination still importing");
            tokio::time::sleep(self.config.status_poll_interval).await;
        }
        Err(OpsError::Timeout {
            operation: format!("slot import on {}", dst.addr),
            duration: self.config.status_wait_bound(),
        })
    }

    async fn query_status(
        &self,
        addr: &str,
    ) -> Result<Vec<crate::client::SlotImportStatus>> {
        self.connector.connect(addr).await?.migration_status().await
    }

    /// Re-resolve an endpoint after a suspected failover.
    ///
    /// A direct probe keeps the endpoint if it still answers and reports
    /// itself a running master. Otherwise its former replica set is asked:
    /// a former replica now acting as master over at least one of the
    /// endpoint's pre-migration slots is the continuity proof. None found
    /// is fatal.
    async fn relocate(&self, endpoint: Endpoint) -> Result<Endpoint> {
        if let Ok(handle) = self.connector.connect(&endpoint.addr).await
            && let Ok(raw) = handle.cluster_nodes_raw().await
            && let Ok(view) = ClusterView::parse(&endpoint.addr, &raw)
            && let Some(node) = view.by_addr(&endpoint.addr)
            && node.is_running_master()
        {
            debug!(addr = %endpoint.addr, "endpoint still master, keeping it");
            return Ok(Endpoint::capture(&view, node));
        }

        let view = match ClusterView::fetch(self.connector, &endpoint.replica_addrs).await {
            Ok(view) => view,
            Err(err) => {
                warn!(addr = %endpoint.addr, error = %err, "former replica set unreachable");
                return Err(OpsError::CannotLocateNewOwner {
                    addr: endpoint.addr,
                });
            }
        };
        for replica_id in &endpoint.replica_ids {
            if let Some(node) = view.by_id(replica_id)
                && node.is_running_master()
                && node.owns_any(&endpoint.slots_before)
            {
                info!(
                    old = %endpoint.addr,
                    new = %node.addr,
                    "endpoint failed over, relocated to promoted replica"
                );
                return Ok(Endpoint::capture(&view, node));
            }
        }
        Err(OpsError::CannotLocateNewOwner {
            addr: endpoint.addr,
        })
    }
}
