//! Scripted mock cluster for functional tests.
//!
//! Implements the `Connector`/`NodeHandle` seam over an in-memory script:
//! each node carries per-command reply queues with an optional default, and
//! every command is appended to a shared log so tests can assert on the
//! exact wire traffic. No store required; paused tokio clocks make the
//! hours-scale retry budgets run instantly.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};

use valkey_ops::client::{Connector, FailoverMode, ImportState, NodeHandle, SlotImportStatus};
use valkey_ops::error::{OpsError, Result};
use valkey_ops::slots::format_slots;

/// Route crate logs to the test writer. Call at the top of a test and run
/// with `RUST_LOG=valkey_ops=debug` to watch the drivers work.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type Outcome<T> = std::result::Result<T, String>;

/// Reply queue with an optional fallback once the queue drains.
pub struct Script<T: Clone> {
    queue: VecDeque<Outcome<T>>,
    default: Option<Outcome<T>>,
}

impl<T: Clone> Default for Script<T> {
    fn default() -> Self {
        Self {
            queue: VecDeque::new(),
            default: None,
        }
    }
}

impl<T: Clone> Script<T> {
    pub fn push_ok(&mut self, value: T) -> &mut Self {
        self.queue.push_back(Ok(value));
        self
    }

    pub fn push_err(&mut self, message: &str) -> &mut Self {
        self.queue.push_back(Err(message.to_string()));
        self
    }

    pub fn default_ok(&mut self, value: T) -> &mut Self {
        self.default = Some(Ok(value));
        self
    }

    pub fn default_err(&mut self, message: &str) -> &mut Self {
        self.default = Some(Err(message.to_string()));
        self
    }

    fn next(&mut self) -> Option<Outcome<T>> {
        self.queue.pop_front().or_else(|| self.default.clone())
    }
}

/// Scripted state of one node.
pub struct MockNode {
    /// Whether dialing this node succeeds.
    pub dial_ok: bool,
    /// Replies to `CLUSTER NODES`.
    pub topology: Script<String>,
    /// Replies to `CLUSTER INFO`.
    pub cluster_info: Script<String>,
    /// Replies to `INFO replication`.
    pub replication: Script<String>,
    /// Replies to the import handshake (task id).
    pub import: Script<String>,
    /// Replies to the restart handshake.
    pub restart: Script<String>,
    /// Replies to the migration status query.
    pub status: Script<Vec<SlotImportStatus>>,
    /// Per-node-id forget failures; ids not listed succeed.
    pub forget_errors: HashMap<String, String>,
    /// CONFIG GET values.
    pub config: HashMap<String, String>,
}

impl Default for MockNode {
    fn default() -> Self {
        Self {
            dial_ok: true,
            topology: Script::default(),
            cluster_info: Script::default(),
            replication: Script::default(),
            import: Script::default(),
            restart: Script::default(),
            status: Script::default(),
            forget_errors: HashMap::new(),
            config: HashMap::new(),
        }
    }
}

#[derive(Default)]
struct State {
    nodes: HashMap<String, MockNode>,
    log: Vec<String>,
}

/// The scripted cluster. Cloning shares the underlying state.
#[derive(Clone, Default)]
pub struct MockCluster {
    state: Arc<Mutex<State>>,
}

impl MockCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a node with default scripts (everything unscripted).
    pub fn add_node(&self, addr: &str) {
        self.lock().nodes.insert(addr.to_string(), MockNode::default());
    }

    /// Script a node, registering it if needed.
    pub fn script<F: FnOnce(&mut MockNode)>(&self, addr: &str, f: F) {
        let mut state = self.lock();
        f(state.nodes.entry(addr.to_string()).or_default());
    }

    /// Snapshot of the command log.
    pub fn log(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    /// Number of log entries containing `needle`.
    pub fn log_count(&self, needle: &str) -> usize {
        self.lock()
            .log
            .iter()
            .filter(|entry| entry.contains(needle))
            .count()
    }

    /// Index of the first log entry containing `needle`.
    pub fn log_index(&self, needle: &str) -> Option<usize> {
        self.lock().log.iter().position(|entry| entry.contains(needle))
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("mock state poisoned")
    }
}

impl Connector for MockCluster {
    type Handle = MockHandle;

    async fn connect(&self, addr: &str) -> Result<MockHandle> {
        let state = self.lock();
        match state.nodes.get(addr) {
            Some(node) if node.dial_ok => Ok(MockHandle {
                addr: addr.to_string(),
                state: Arc::clone(&self.state),
            }),
            Some(_) => Err(OpsError::Connection {
                addr: addr.to_string(),
                message: "connection refused".to_string(),
            }),
            None => Err(OpsError::Connection {
                addr: addr.to_string(),
                message: "unknown address".to_string(),
            }),
        }
    }
}

/// Handle to one scripted node.
pub struct MockHandle {
    addr: String,
    state: Arc<Mutex<State>>,
}

impl MockHandle {
    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("mock state poisoned")
    }

    fn record(state: &mut State, addr: &str, command: String) {
        state.log.push(format!("{} {}", addr, command));
    }

    fn scripted<T: Clone>(
        &self,
        command: String,
        pick: fn(&mut MockNode) -> &mut Script<T>,
    ) -> Result<T> {
        let mut state = self.lock();
        Self::record(&mut state, &self.addr, command.clone());
        let node = state
            .nodes
            .get_mut(&self.addr)
            .expect("handle to unregistered node");
        match pick(node).next() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(OpsError::Protocol {
                addr: self.addr.clone(),
                message,
            }),
            None => Err(OpsError::Protocol {
                addr: self.addr.clone(),
                message: format!("no scripted reply for {}", command),
            }),
        }
    }

    fn record_only(&self, command: String) {
        let mut state = self.lock();
        Self::record(&mut state, &self.addr, command);
    }
}

impl NodeHandle for MockHandle {
    fn addr(&self) -> &str {
        &self.addr
    }

    async fn cluster_nodes_raw(&self) -> Result<String> {
        self.scripted("CLUSTER NODES".to_string(), |n| &mut n.topology)
    }

    async fn cluster_info_raw(&self) -> Result<String> {
        self.scripted("CLUSTER INFO".to_string(), |n| &mut n.cluster_info)
    }

    async fn info(&self, section: Option<&str>) -> Result<String> {
        let section = section.unwrap_or("default");
        self.scripted(format!("INFO {}", section), |n| &mut n.replication)
    }

    async fn import_slots(&self, slots: &[u16], source_id: &str) -> Result<String> {
        self.scripted(
            format!(
                "CLUSTER SETSLOT IMPORTING {} {}",
                source_id,
                format_slots(slots)
            ),
            |n| &mut n.import,
        )
    }

    async fn restart_import(&self, slots: &[u16], source_id: &str) -> Result<()> {
        self.scripted(
            format!(
                "CLUSTER SETSLOT RESTART {} {}",
                source_id,
                format_slots(slots)
            ),
            |n| &mut n.restart,
        )
        .map(|_| ())
    }

    async fn stabilize_slots(&self, slots: &[u16]) -> Result<()> {
        self.record_only(format!("CLUSTER SETSLOT STABLE {}", format_slots(slots)));
        Ok(())
    }

    async fn migration_status(&self) -> Result<Vec<SlotImportStatus>> {
        self.scripted("CLUSTER SETSLOT INFO".to_string(), |n| &mut n.status)
    }

    async fn failover(&self, mode: FailoverMode) -> Result<()> {
        let suffix = match mode {
            FailoverMode::Graceful => "",
            FailoverMode::Force => " FORCE",
            FailoverMode::Takeover => " TAKEOVER",
        };
        self.record_only(format!("CLUSTER FAILOVER{}", suffix));
        Ok(())
    }

    async fn forget(&self, node_id: &str) -> Result<()> {
        let mut state = self.lock();
        Self::record(&mut state, &self.addr, format!("CLUSTER FORGET {}", node_id));
        let node = state
            .nodes
            .get(&self.addr)
            .expect("handle to unregistered node");
        match node.forget_errors.get(node_id) {
            Some(message) => Err(OpsError::Protocol {
                addr: self.addr.clone(),
                message: message.clone(),
            }),
            None => Ok(()),
        }
    }

    async fn meet(&self, ip: &str, port: u16) -> Result<()> {
        self.record_only(format!("CLUSTER MEET {} {}", ip, port));
        Ok(())
    }

    async fn reset(&self, hard: bool) -> Result<()> {
        self.record_only(format!(
            "CLUSTER RESET {}",
            if hard { "HARD" } else { "SOFT" }
        ));
        Ok(())
    }

    async fn config_get(&self, key: &str) -> Result<Option<String>> {
        let mut state = self.lock();
        Self::record(&mut state, &self.addr, format!("CONFIG GET {}", key));
        let node = state
            .nodes
            .get(&self.addr)
            .expect("handle to unregistered node");
        Ok(node.config.get(key).cloned())
    }
}

/// Build one `CLUSTER NODES` line.
pub fn node_line(
    id: &str,
    addr: &str,
    flags: &str,
    master_id: &str,
    link: &str,
    slots: &str,
) -> String {
    let mut line = format!("{} {}@16379 {} {} 0 0 1 {}", id, addr, flags, master_id, link);
    if !slots.is_empty() {
        line.push(' ');
        line.push_str(slots);
    }
    line
}

/// Shorthand for a healthy master line.
pub fn master_line(id: &str, addr: &str, slots: &str) -> String {
    node_line(id, addr, "master", "-", "connected", slots)
}

/// Shorthand for a healthy replica line.
pub fn replica_line(id: &str, addr: &str, master_id: &str) -> String {
    node_line(id, addr, "slave", master_id, "connected", "")
}

/// Shorthand for a status entry.
pub fn entry(slot: u16, task_id: &str, state: ImportState) -> SlotImportStatus {
    SlotImportStatus {
        slot,
        task_id: task_id.to_string(),
        state,
    }
}

/// A healthy `CLUSTER INFO` dump.
pub fn healthy_cluster_info() -> String {
    "cluster_state:ok\ncluster_slots_assigned:16384\ncluster_slots_ok:16384\n\
     cluster_slots_pfail:0\ncluster_slots_fail:0\ncluster_known_nodes:6\ncluster_size:3\n"
        .to_string()
}

/// INFO replication output for a caught-up replica.
pub fn replica_replication_info(offset: i64) -> String {
    format!(
        "# Replication\nrole:slave\nmaster_link_status:up\nmaster_repl_offset:{}\nslave_repl_offset:{}\n",
        offset, offset
    )
}

/// INFO replication output for a master.
pub fn master_replication_info(offset: i64) -> String {
    format!("# Replication\nrole:master\nmaster_repl_offset:{}\n", offset)
}
