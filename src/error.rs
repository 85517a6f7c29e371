//! Error taxonomy for topology mutation operations.
//!
//! One enum for the whole crate, with classification helpers so retry
//! decisions live next to the error definitions instead of at call sites.
//! Errors carry the acting address and the raw protocol text so an operator
//! can resume manually.

use std::time::Duration;

use thiserror::Error;

use crate::client::types::ParseError;

/// Error type for all cluster maintenance operations.
#[derive(Error, Debug)]
pub enum OpsError {
    /// Bad plan input. Fatal, never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The plan's source no longer owns the slots it is supposed to donate.
    /// Guards against executing a plan computed on stale topology.
    #[error("{addr} does not own slots {expected} (owns {actual})")]
    InvalidOwnership {
        addr: String,
        expected: String,
        actual: String,
    },

    /// Malformed textual slot specification.
    #[error("invalid slot spec: {0}")]
    InvalidSlotSpec(String),

    /// No seed node answered a topology read.
    #[error("no seed node reachable: {}", .seeds.join(", "))]
    ClusterUnreachable { seeds: Vec<String> },

    /// Dialing or initializing a connection failed.
    #[error("connection to {addr} failed: {message}")]
    Connection { addr: String, message: String },

    /// The store answered a command with an error reply.
    #[error("{addr} replied with error: {message}")]
    Protocol { addr: String, message: String },

    /// The import handshake retry budget is exhausted.
    #[error("import command failed on {addr} for slots {slots}: {message}")]
    MigrationCommandFailed {
        addr: String,
        slots: String,
        message: String,
    },

    /// The destination reported a failed import, or stopped answering
    /// status queries mid-migration. Triggers the failover-aware restart
    /// path once; fatal on recurrence.
    #[error("destination {addr} reported failed import for slots {slots}: {message}")]
    MigrateFail {
        addr: String,
        slots: String,
        message: String,
    },

    /// After a suspected failover, no former replica of the endpoint now
    /// acts as master over any of its pre-migration slots.
    #[error("cannot locate a new owner for {addr} among its former replicas")]
    CannotLocateNewOwner { addr: String },

    /// A drain plan was requested with an empty survivor set.
    #[error("no surviving masters to receive drained slots")]
    NoSurvivingMasters,

    /// A bounded wait expired. Fatal inside this crate; outer callers may
    /// retry on their own schedule.
    #[error("timed out after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    /// Several independent sub-operations failed; every cause is kept.
    #[error("{} sub-operation(s) failed: {}", .failures.len(), describe_failures(.failures))]
    Aggregate { failures: Vec<(String, OpsError)> },

    /// Topology or status output the store sent could not be parsed.
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),
}

fn describe_failures(failures: &[(String, OpsError)]) -> String {
    failures
        .iter()
        .map(|(addr, err)| format!("{}: {}", addr, err))
        .collect::<Vec<_>>()
        .join("; ")
}

impl OpsError {
    /// Raw protocol error text, if this error carries a store reply.
    pub fn protocol_text(&self) -> Option<&str> {
        match self {
            OpsError::Protocol { message, .. } => Some(message),
            _ => None,
        }
    }

    /// Check for the store's "still deleting previously migrated data"
    /// reply to an import handshake. Background cleanup can legitimately
    /// take a long time, so this class gets the long fixed-backoff budget.
    pub fn is_slot_in_deleting(&self) -> bool {
        self.protocol_text()
            .is_some_and(|m| m.to_lowercase().contains("slot in deleting"))
    }

    /// Check for the store's "slot not empty" reply: residue of an aborted
    /// prior attempt that a bookkeeping reset clears.
    pub fn is_slot_not_empty(&self) -> bool {
        self.protocol_text()
            .is_some_and(|m| m.to_lowercase().contains("slot not empty"))
    }

    /// Transient import-handshake errors: retried under the long
    /// fixed-backoff policy rather than the short command policy.
    pub fn is_transient_migration(&self) -> bool {
        self.is_slot_in_deleting() || self.is_slot_not_empty()
    }

    /// Check if this is a transport-level failure rather than a store
    /// reply.
    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            OpsError::Connection { .. } | OpsError::ClusterUnreachable { .. }
        )
    }
}

/// Result type alias for cluster maintenance operations.
pub type Result<T> = std::result::Result<T, OpsError>;
