//! Plan and task types shared by the planners and the operation drivers.
//!
//! These are the structs an outer job runtime decodes its parameters into.
//! They carry no connections and no behavior beyond bookkeeping: the
//! planners in [`crate::slots`] produce them, the drivers in [`crate::ops`]
//! consume them and report them back with final statuses.

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::slots::format_slots;

/// Lifecycle of a single slot-range transfer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Created by a planner, not yet started.
    #[default]
    Planned,
    /// The import handshake has been issued on the destination.
    Importing,
    /// Destination reports every slot of the task imported.
    Succeeded,
    /// Terminal failure, surfaced as an error.
    Failed,
    /// The driver gave up waiting; the store-side operation may still
    /// complete on its own.
    Unknown,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TaskStatus::Planned => write!(f, "planned"),
            TaskStatus::Importing => write!(f, "importing"),
            TaskStatus::Succeeded => write!(f, "succeeded"),
            TaskStatus::Failed => write!(f, "failed"),
            TaskStatus::Unknown => write!(f, "unknown"),
        }
    }
}

/// One slot-range transfer between two masters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationTask {
    /// Address (`ip:port`) of the master currently owning the slots.
    pub source: String,
    /// Address of the master receiving the slots.
    pub dest: String,
    /// Slots to move, in donation order.
    pub slots: Vec<u16>,
    /// Current lifecycle state.
    #[serde(default)]
    pub status: TaskStatus,
}

impl MigrationTask {
    /// Create a task in the `Planned` state.
    pub fn planned(
        source: impl Into<String>,
        dest: impl Into<String>,
        slots: Vec<u16>,
    ) -> Self {
        Self {
            source: source.into(),
            dest: dest.into(),
            slots,
            status: TaskStatus::Planned,
        }
    }

    /// Compact range rendering of the task's slots, for logs and errors.
    pub fn slot_spec(&self) -> String {
        format_slots(&self.slots)
    }

    /// Check if the task reached a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.status,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Unknown
        )
    }
}

impl std::fmt::Display for MigrationTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} -> {} [{}] ({})",
            self.source,
            self.dest,
            self.slot_spec(),
            self.status
        )
    }
}

/// A manual promotion of one replica over its master.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverTask {
    /// Address of the master to demote.
    pub master: String,
    /// Address of the replica to promote.
    pub slave: String,
    /// Use the takeover path, skipping the store's own safety checks and
    /// this crate's preconditions.
    #[serde(default)]
    pub force: bool,
}

/// Terminal state of one failover task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailoverOutcome {
    /// Replica promoted (and, graceful mode, old master demoted).
    Done,
    /// The bounded wait expired; not retried automatically.
    TimedOut,
    /// The failover command or a poll failed outright.
    Failed(String),
}

impl std::fmt::Display for FailoverOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailoverOutcome::Done => write!(f, "done"),
            FailoverOutcome::TimedOut => write!(f, "timed out"),
            FailoverOutcome::Failed(reason) => write!(f, "failed: {}", reason),
        }
    }
}

/// Per-task result of a failover batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailoverReport {
    /// The task as submitted.
    pub task: FailoverTask,
    /// What happened to it.
    pub outcome: FailoverOutcome,
}

/// A master leaving the cluster, captured before its slots are drained.
///
/// Replica ids are recorded at plan time: once the drain finishes the
/// replicas may re-attach to surviving masters, and they still have to be
/// forgotten under their original ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetiringNode {
    /// Address of the retiring master.
    pub addr: String,
    /// Gossip identity of the retiring master.
    pub node_id: String,
    /// Gossip identities of its replicas at plan time.
    pub replica_ids: Vec<String>,
    /// Addresses of those replicas at plan time.
    pub replica_addrs: Vec<String>,
}

/// Drain-and-forget plan for one or more retiring masters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetirementPlan {
    /// The masters being removed, with pre-drain replica capture.
    pub retiring: Vec<RetiringNode>,
    /// Ordinary migration tasks that empty the retiring masters.
    pub tasks: Vec<MigrationTask>,
}

impl RetirementPlan {
    /// All node ids to forget: the retiring masters and their pre-drain
    /// replicas.
    pub fn ids_to_forget(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for node in &self.retiring {
            ids.push(node.node_id.clone());
            ids.extend(node.replica_ids.iter().cloned());
        }
        ids
    }
}

/// Result of one migration batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchReport {
    /// Correlation id, also attached to every log line of the batch.
    pub op_id: Uuid,
    /// When the batch started.
    pub started_at: Timestamp,
    /// When the last worker finished.
    pub finished_at: Timestamp,
    /// The tasks with their final statuses.
    pub tasks: Vec<MigrationTask>,
}

impl BatchReport {
    /// Count tasks that reached `Succeeded`.
    pub fn succeeded(&self) -> usize {
        self.tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Succeeded)
            .count()
    }
}
