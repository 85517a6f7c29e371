//! Parsing for INFO text output.
//!
//! Regex-based key/value extraction instead of fragile string splitting,
//! plus the structured replication view the failover preconditions rely on.

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// Parse key-value pairs from INFO command output.
///
/// INFO output format: `key:value` per line, with section headers starting
/// with `#`.
pub fn parse_info_output(info: &str) -> HashMap<String, String> {
    static KV_REGEX: OnceLock<Regex> = OnceLock::new();
    #[allow(clippy::expect_used)]
    let kv_regex =
        KV_REGEX.get_or_init(|| Regex::new(r"^([\w-]+):(.+)$").expect("static regex"));

    let mut result = HashMap::new();
    for line in info.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(caps) = kv_regex.captures(line)
            && let (Some(key), Some(value)) = (caps.get(1), caps.get(2))
        {
            result.insert(key.as_str().to_string(), value.as_str().to_string());
        }
    }
    result
}

/// Structured view of INFO REPLICATION output.
#[derive(Debug, Clone, Default)]
pub struct ReplicationInfo {
    /// Role of the answering node ("master" or "slave").
    pub role: Option<String>,
    /// Replica-side link status to its master ("up" or "down").
    pub master_link_status: Option<String>,
    /// Master's replication offset.
    pub master_repl_offset: Option<i64>,
    /// Replica's acknowledged replication offset.
    pub slave_repl_offset: Option<i64>,
}

impl ReplicationInfo {
    /// Parse from INFO REPLICATION output.
    pub fn parse(info: &str) -> Self {
        let parsed = parse_info_output(info);
        ReplicationInfo {
            role: parsed.get("role").cloned(),
            master_link_status: parsed.get("master_link_status").cloned(),
            master_repl_offset: parsed
                .get("master_repl_offset")
                .and_then(|v| v.trim().parse().ok()),
            slave_repl_offset: parsed
                .get("slave_repl_offset")
                .and_then(|v| v.trim().parse().ok()),
        }
    }

    /// Check if the answering node reports itself a master.
    pub fn is_master(&self) -> bool {
        self.role.as_deref() == Some("master")
    }

    /// Check if the replica's link to its master is up.
    pub fn link_up(&self) -> bool {
        self.master_link_status.as_deref() == Some("up")
    }

    /// Replication lag in bytes. `None` when either offset is missing.
    pub fn replication_lag(&self) -> Option<i64> {
        match (self.master_repl_offset, self.slave_repl_offset) {
            (Some(master), Some(slave)) => Some(master - slave),
            _ => None,
        }
    }
}
