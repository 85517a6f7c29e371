//! Store-dialect commands and typed reply decoding.
//!
//! `fred` has no typed API for the slot-migration command family (its
//! `cluster_setslot` cannot carry the node-id parameter), so those commands
//! go through the custom-command path. This module centralizes the argument
//! building for that dialect and a small typed [`Reply`] decoder so call
//! sites never cast raw protocol values ad hoc.

use fred::types::Value;

use crate::client::types::{ParseError, SlotImportStatus};

/// A decoded protocol reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Simple or bulk string (null decodes as the empty string).
    Simple(String),
    /// Integer reply.
    Integer(i64),
    /// Array reply.
    Array(Vec<Reply>),
}

impl Reply {
    /// Decode a raw `fred` value.
    pub fn from_value(value: Value) -> Reply {
        match value {
            Value::Array(items) => {
                Reply::Array(items.into_iter().map(Reply::from_value).collect())
            }
            // RESP3 map replies flatten to alternating key/value entries.
            Value::Map(map) => {
                let mut items = Vec::new();
                for (key, value) in map.inner() {
                    items.push(Reply::Simple(key.into_string().unwrap_or_default()));
                    items.push(Reply::from_value(value));
                }
                Reply::Array(items)
            }
            Value::Integer(i) => Reply::Integer(i),
            Value::Null => Reply::Simple(String::new()),
            other => Reply::Simple(other.as_string().unwrap_or_default()),
        }
    }

    /// Expect a string reply.
    pub fn into_simple(self) -> Result<String, ParseError> {
        match self {
            Reply::Simple(s) => Ok(s),
            other => Err(ParseError::InvalidMigrationStatus(format!(
                "expected string reply, got {:?}",
                other
            ))),
        }
    }

    /// Expect an array of strings.
    pub fn into_lines(self) -> Result<Vec<String>, ParseError> {
        match self {
            Reply::Array(items) => items.into_iter().map(Reply::into_simple).collect(),
            other => Err(ParseError::InvalidMigrationStatus(format!(
                "expected array reply, got {:?}",
                other
            ))),
        }
    }
}

/// Arguments for `CLUSTER SETSLOT IMPORTING <source-id> <slot>...`.
///
/// The destination starts accepting streamed keys for the slots and
/// answers with an opaque task id.
pub fn setslot_importing_args(slots: &[u16], source_id: &str) -> Vec<String> {
    let mut args = vec!["SETSLOT".to_string(), "IMPORTING".to_string(), source_id.to_string()];
    args.extend(slots.iter().map(|s| s.to_string()));
    args
}

/// Arguments for `CLUSTER SETSLOT RESTART <source-id> <slot>...`.
///
/// Safe re-entry into an in-progress migration after an endpoint changed.
pub fn setslot_restart_args(slots: &[u16], source_id: &str) -> Vec<String> {
    let mut args = vec!["SETSLOT".to_string(), "RESTART".to_string(), source_id.to_string()];
    args.extend(slots.iter().map(|s| s.to_string()));
    args
}

/// Arguments for `CLUSTER SETSLOT STABLE <slot>...`.
///
/// Clears migration bookkeeping for the slots on the receiving node. Not a
/// data flush; issuing it on a clean node is a no-op.
pub fn setslot_stable_args(slots: &[u16]) -> Vec<String> {
    let mut args = vec!["SETSLOT".to_string(), "STABLE".to_string()];
    args.extend(slots.iter().map(|s| s.to_string()));
    args
}

/// Arguments for `CLUSTER SETSLOT INFO`, the per-slot migration status
/// listing.
pub fn setslot_info_args() -> Vec<String> {
    vec!["SETSLOT".to_string(), "INFO".to_string()]
}

/// Parse the status listing reply into per-slot entries.
pub fn parse_migration_status(reply: Reply) -> Result<Vec<SlotImportStatus>, ParseError> {
    reply
        .into_lines()?
        .iter()
        .filter(|line| !line.trim().is_empty())
        .map(|line| SlotImportStatus::parse_line(line))
        .collect()
}
