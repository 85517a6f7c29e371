//! Slot migration state machine scenarios.

use std::time::Duration;

use valkey_ops::client::ImportState;
use valkey_ops::error::OpsError;
use valkey_ops::ops::SlotMigration;
use valkey_ops::retry::RetryPolicy;
use valkey_ops::tasks::{MigrationTask, TaskStatus};
use valkey_ops::OpsConfig;

use crate::mock_cluster::{entry, init_logging, master_line, node_line, replica_line, MockCluster};

const SRC: &str = "10.0.0.1:6379";
const DST: &str = "10.0.0.2:6379";
const REP: &str = "10.0.0.3:6379";

fn initial_topology() -> String {
    [
        master_line("aaa", SRC, "0-200"),
        master_line("bbb", DST, "300-400"),
        replica_line("ccc", REP, "bbb"),
    ]
    .join("\n")
}

fn task_100_200() -> MigrationTask {
    MigrationTask::planned(SRC, DST, (100..=200).collect())
}

/// Cluster where the source serves the initial topology and the
/// destination accepts one import and reports success.
fn happy_cluster() -> MockCluster {
    let cluster = MockCluster::new();
    cluster.script(SRC, |n| {
        n.topology.default_ok(initial_topology());
    });
    cluster.script(DST, |n| {
        n.import.push_ok("task-1".to_string());
        n.status
            .default_ok(vec![entry(100, "task-1", ImportState::Success)]);
    });
    cluster.add_node(REP);
    cluster
}

#[tokio::test(start_paused = true)]
async fn test_migration_happy_path() {
    let cluster = happy_cluster();
    let config = OpsConfig::default();
    let mut runner = SlotMigration::new(&cluster, &config, task_100_200());

    runner.run().await.expect("migration should succeed");

    assert_eq!(runner.task().status, TaskStatus::Succeeded);
    assert_eq!(cluster.log_count("CLUSTER SETSLOT IMPORTING aaa 100-200"), 1);
    assert_eq!(cluster.log_count("CLUSTER SETSLOT INFO"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_idempotent_when_destination_owns_slots() {
    // A prior run already moved the slots: the ownership precheck must
    // short-circuit without reissuing the import.
    let cluster = MockCluster::new();
    cluster.script(SRC, |n| {
        n.topology.default_ok(
            [
                master_line("aaa", SRC, "0-99"),
                master_line("bbb", DST, "100-400"),
            ]
            .join("\n"),
        );
    });
    cluster.add_node(DST);

    let config = OpsConfig::default();
    let mut runner = SlotMigration::new(&cluster, &config, task_100_200());
    runner.run().await.expect("already-done migration succeeds");

    assert_eq!(runner.task().status, TaskStatus::Succeeded);
    assert_eq!(cluster.log_count("SETSLOT IMPORTING"), 0);
    assert_eq!(cluster.log_count("SETSLOT INFO"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stale_plan_fails_ownership_precheck() {
    // The source lost slots since the plan was computed.
    let cluster = MockCluster::new();
    cluster.script(SRC, |n| {
        n.topology.default_ok(
            [
                master_line("aaa", SRC, "0-99"),
                master_line("bbb", DST, "300-400"),
            ]
            .join("\n"),
        );
    });
    cluster.add_node(DST);

    let config = OpsConfig::default();
    let mut runner = SlotMigration::new(&cluster, &config, task_100_200());
    let err = runner.run().await.expect_err("stale plan must fail");

    assert!(matches!(err, OpsError::InvalidOwnership { .. }));
    assert_eq!(runner.task().status, TaskStatus::Failed);
    assert_eq!(cluster.log_count("SETSLOT IMPORTING"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_source_equal_destination_rejected() {
    let cluster = MockCluster::new();
    let config = OpsConfig::default();
    let task = MigrationTask::planned(SRC, SRC, vec![1]);
    let mut runner = SlotMigration::new(&cluster, &config, task);
    assert!(matches!(
        runner.run().await,
        Err(OpsError::Validation(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn test_slot_in_deleting_retries_identical_importing() {
    // First IMPORTING answers "slot in deleting": the driver must reissue
    // the identical command after the fixed backoff and must not query
    // status until a non-transient response arrives.
    init_logging();
    let cluster = MockCluster::new();
    cluster.script(SRC, |n| {
        n.topology.default_ok(initial_topology());
    });
    cluster.script(DST, |n| {
        n.import.push_err("ERR slot in deleting");
        n.import.push_ok("task-1".to_string());
        n.status
            .default_ok(vec![entry(100, "task-1", ImportState::Success)]);
    });
    cluster.add_node(REP);

    let config = OpsConfig::default();
    let mut runner = SlotMigration::new(&cluster, &config, task_100_200());
    runner.run().await.expect("migration should succeed");

    assert_eq!(runner.task().status, TaskStatus::Succeeded);

    let log = cluster.log();
    let imports: Vec<usize> = log
        .iter()
        .enumerate()
        .filter(|(_, e)| e.contains("CLUSTER SETSLOT IMPORTING aaa 100-200"))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(imports.len(), 2, "identical IMPORTING reissued once");

    let first_status = cluster
        .log_index("CLUSTER SETSLOT INFO")
        .expect("status was queried");
    assert!(
        first_status > imports[1],
        "no status polling before the handshake is accepted"
    );
}

#[tokio::test(start_paused = true)]
async fn test_slot_not_empty_resets_bookkeeping_on_both_endpoints() {
    let cluster = MockCluster::new();
    cluster.script(SRC, |n| {
        n.topology.default_ok(initial_topology());
    });
    cluster.script(DST, |n| {
        n.import.push_err("ERR slot not empty");
        n.import.push_ok("task-1".to_string());
        n.status
            .default_ok(vec![entry(100, "task-1", ImportState::Success)]);
    });
    cluster.add_node(REP);

    let config = OpsConfig::default();
    let mut runner = SlotMigration::new(&cluster, &config, task_100_200());
    runner.run().await.expect("migration should succeed");

    let log = cluster.log();
    let second_import = log
        .iter()
        .rposition(|e| e.contains("SETSLOT IMPORTING"))
        .unwrap();
    for addr in [SRC, DST] {
        let reset = log
            .iter()
            .position(|e| e.starts_with(addr) && e.contains("SETSLOT STABLE 100-200"))
            .unwrap_or_else(|| panic!("no bookkeeping reset on {}", addr));
        assert!(reset < second_import, "reset precedes the retry");
    }
}

#[tokio::test(start_paused = true)]
async fn test_transient_budget_exhaustion_is_fatal() {
    let cluster = MockCluster::new();
    cluster.script(SRC, |n| {
        n.topology.default_ok(initial_topology());
    });
    cluster.script(DST, |n| {
        n.import.default_err("ERR slot in deleting");
    });
    cluster.add_node(REP);

    let mut config = OpsConfig::default();
    config.transient_retry = RetryPolicy::new(3, Duration::from_secs(60));

    let mut runner = SlotMigration::new(&cluster, &config, task_100_200());
    let err = runner.run().await.expect_err("budget exhaustion is fatal");

    assert!(matches!(err, OpsError::MigrationCommandFailed { .. }));
    assert_eq!(runner.task().status, TaskStatus::Failed);
    assert_eq!(cluster.log_count("SETSLOT IMPORTING"), 3);
    assert_eq!(cluster.log_count("SETSLOT INFO"), 0);
}

#[tokio::test(start_paused = true)]
async fn test_other_import_errors_get_short_retries() {
    let cluster = MockCluster::new();
    cluster.script(SRC, |n| {
        n.topology.default_ok(initial_topology());
    });
    cluster.script(DST, |n| {
        n.import.default_err("ERR unknown subcommand");
    });
    cluster.add_node(REP);

    let config = OpsConfig::default();
    let mut runner = SlotMigration::new(&cluster, &config, task_100_200());
    let err = runner.run().await.expect_err("non-transient errors are fatal");

    assert!(matches!(err, OpsError::MigrationCommandFailed { .. }));
    // Default short policy: three attempts, no long-budget retries.
    assert_eq!(cluster.log_count("SETSLOT IMPORTING"), 3);
}

/// Mid-poll the destination fails over to its replica: the driver must
/// locate the promoted replica through the former replica set and reissue
/// the restart variant against it.
fn failover_cluster() -> MockCluster {
    let cluster = MockCluster::new();
    cluster.script(SRC, |n| {
        n.topology.default_ok(initial_topology());
    });
    cluster.script(DST, |n| {
        n.import.push_ok("task-1".to_string());
        n.status
            .push_ok(vec![entry(100, "task-1", ImportState::Running)]);
        n.status.push_err("ERR connection reset by peer");
        n.status.default_err("ERR connection reset by peer");
        // The failed-over node no longer answers topology reads.
        n.topology.default_err("ERR loading");
    });
    cluster.script(REP, |n| {
        n.topology.default_ok(
            [
                master_line("aaa", SRC, "0-200"),
                node_line("bbb", DST, "master,fail", "-", "disconnected", ""),
                master_line("ccc", REP, "300-400"),
            ]
            .join("\n"),
        );
        n.restart.push_ok(String::new());
        n.status
            .default_ok(vec![entry(100, "task-2", ImportState::Success)]);
    });
    cluster
}

#[tokio::test(start_paused = true)]
async fn test_destination_failover_triggers_restart_against_successor() {
    init_logging();
    let cluster = failover_cluster();
    let config = OpsConfig::default();
    let mut runner = SlotMigration::new(&cluster, &config, task_100_200());

    runner.run().await.expect("restart path should succeed");

    assert_eq!(runner.task().status, TaskStatus::Succeeded);
    let restart = format!("{} CLUSTER SETSLOT RESTART aaa 100-200", REP);
    assert_eq!(cluster.log_count(&restart), 1, "restart issued against successor");
}

#[tokio::test(start_paused = true)]
async fn test_second_import_failure_is_fatal() {
    let cluster = failover_cluster();
    // The successor also reports the import failed.
    cluster.script(REP, |n| {
        n.status = Default::default();
        n.status
            .default_ok(vec![entry(100, "task-2", ImportState::Fail)]);
    });

    let config = OpsConfig::default();
    let mut runner = SlotMigration::new(&cluster, &config, task_100_200());
    let err = runner.run().await.expect_err("second failure is fatal");

    assert!(matches!(err, OpsError::MigrateFail { .. }));
    assert_eq!(runner.task().status, TaskStatus::Failed);
}

#[tokio::test(start_paused = true)]
async fn test_no_successor_is_fatal() {
    // Destination dies and its only former replica never promotes.
    let cluster = MockCluster::new();
    cluster.script(SRC, |n| {
        n.topology.default_ok(initial_topology());
    });
    cluster.script(DST, |n| {
        n.import.push_ok("task-1".to_string());
        n.status.default_err("ERR connection reset by peer");
        n.topology.default_err("ERR loading");
    });
    cluster.script(REP, |n| {
        n.topology.default_ok(
            [
                master_line("aaa", SRC, "0-200"),
                node_line("bbb", DST, "master,fail", "-", "disconnected", ""),
                replica_line("ccc", REP, "bbb"),
            ]
            .join("\n"),
        );
    });

    let config = OpsConfig::default();
    let mut runner = SlotMigration::new(&cluster, &config, task_100_200());
    let err = runner.run().await.expect_err("no successor to relocate to");

    assert!(matches!(err, OpsError::CannotLocateNewOwner { .. }));
    assert_eq!(runner.task().status, TaskStatus::Failed);
}
