//! Operation configuration.
//!
//! Every component takes an explicit [`OpsConfig`] instead of reading
//! process-global state. Defaults match the cadence of a live cluster:
//! metadata calls time out in seconds, data-moving waits are bounded in
//! hours.

use std::time::Duration;

use crate::retry::RetryPolicy;

/// Configuration shared by all maintenance operations.
#[derive(Debug, Clone)]
pub struct OpsConfig {
    /// Password sent with AUTH when dialing nodes.
    pub password: Option<String>,
    /// Dial timeout for a single node connection.
    pub connect_timeout: Duration,
    /// Per-command timeout for metadata calls.
    pub command_timeout: Duration,

    /// Interval between destination status queries during a migration.
    pub status_poll_interval: Duration,
    /// Status queries before the migration wait is declared timed out.
    pub status_poll_tries: u32,
    /// Retry policy for transient import-handshake replies
    /// ("slot in deleting", "slot not empty"). Background cleanup of
    /// previously migrated data can take a long time, hence the large
    /// budget.
    pub transient_retry: RetryPolicy,
    /// Retry policy for any other import-handshake failure.
    pub command_retry: RetryPolicy,
    /// Pause before re-resolving endpoints after a reported import
    /// failure, letting gossip converge on the new topology.
    pub relocate_cooldown: Duration,

    /// Interval between role checks while waiting on a failover.
    pub failover_poll_interval: Duration,
    /// Role checks before a failover wait is declared timed out.
    pub failover_poll_tries: u32,
    /// Maximum replication offset gap tolerated by the graceful-failover
    /// preconditions, in bytes.
    pub max_replication_lag_bytes: i64,

    /// Interval between topology checks while waiting for a met node to
    /// finish its handshake.
    pub join_poll_interval: Duration,
    /// Topology checks before a join wait is declared timed out.
    pub join_poll_tries: u32,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            password: None,
            connect_timeout: Duration::from_secs(10),
            command_timeout: Duration::from_secs(30),
            status_poll_interval: Duration::from_secs(10),
            status_poll_tries: 720,
            transient_retry: RetryPolicy::new(180, Duration::from_secs(60)),
            command_retry: RetryPolicy::new(3, Duration::from_secs(5)),
            relocate_cooldown: Duration::from_secs(30),
            failover_poll_interval: Duration::from_secs(1),
            failover_poll_tries: 120,
            max_replication_lag_bytes: 10 * 1024 * 1024,
            join_poll_interval: Duration::from_secs(1),
            join_poll_tries: 60,
        }
    }
}

impl OpsConfig {
    /// Create a configuration with defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the AUTH password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    /// Set the dial timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set the per-command timeout.
    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Set the migration status polling cadence.
    pub fn with_status_poll(mut self, interval: Duration, tries: u32) -> Self {
        self.status_poll_interval = interval;
        self.status_poll_tries = tries;
        self
    }

    /// Set the failover polling cadence.
    pub fn with_failover_poll(mut self, interval: Duration, tries: u32) -> Self {
        self.failover_poll_interval = interval;
        self.failover_poll_tries = tries;
        self
    }

    /// Upper bound of a migration status wait.
    pub fn status_wait_bound(&self) -> Duration {
        self.status_poll_interval * self.status_poll_tries
    }

    /// Upper bound of a failover wait.
    pub fn failover_wait_bound(&self) -> Duration {
        self.failover_poll_interval * self.failover_poll_tries
    }
}
