//! Planning against parsed topology dumps.
//!
//! End-to-end over the read path: raw `CLUSTER NODES` text through the
//! view into the planners.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use valkey_ops::ops::run_migrations;
use valkey_ops::slots::{plan_equalize, MasterLoad};
use valkey_ops::tasks::TaskStatus;
use valkey_ops::view::ClusterView;
use valkey_ops::OpsConfig;

use crate::mock_cluster::{entry, master_line, MockCluster};
use valkey_ops::client::ImportState;

const M1: &str = "10.0.7.1:6379";
const M2: &str = "10.0.7.2:6379";
const M3: &str = "10.0.7.3:6379";

/// The skewed ownership from a cluster that grew one master at a time:
/// 8192 / 5462 / 2730.
fn skewed_topology() -> String {
    [
        master_line("aaa", M1, "0-8191"),
        master_line("bbb", M2, "8192-13653"),
        master_line("ccc", M3, "13654-16383"),
    ]
    .join("\n")
}

#[tokio::test(start_paused = true)]
async fn test_equalize_from_parsed_topology_moves_exact_surplus() {
    let view = ClusterView::parse(M1, &skewed_topology()).unwrap();
    let masters = MasterLoad::snapshot(&view);
    let plan = plan_equalize(&masters);

    // First address-sorted master targets 5462, so exactly 2730 slots
    // leave it; nothing moves onto it.
    let off_first: usize = plan
        .iter()
        .filter(|t| t.source == M1)
        .map(|t| t.slots.len())
        .sum();
    assert_eq!(off_first, 2730);
    assert!(plan.iter().all(|t| t.dest != M1));

    // Disjoint tasks covering only moved slots.
    let mut seen = HashSet::new();
    for task in &plan {
        for slot in &task.slots {
            assert!(seen.insert(*slot));
        }
    }

    // Applying the plan leaves every master within one slot of 16384/3.
    let mut counts: HashMap<&str, i64> =
        masters.iter().map(|m| (m.addr.as_str(), m.slots.len() as i64)).collect();
    for task in &plan {
        *counts.get_mut(task.source.as_str()).unwrap() -= task.slots.len() as i64;
        *counts.get_mut(task.dest.as_str()).unwrap() += task.slots.len() as i64;
    }
    for (_, count) in counts {
        assert!((count - 16384 / 3).abs() <= 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_equalize_plan_executes_as_batch() {
    let view = ClusterView::parse(M1, &skewed_topology()).unwrap();
    let plan = plan_equalize(&MasterLoad::snapshot(&view));
    assert!(!plan.is_empty());

    let cluster = MockCluster::new();
    for addr in [M1, M2, M3] {
        cluster.script(addr, |n| {
            n.topology.default_ok(skewed_topology());
            n.import.default_ok("task".to_string());
            n.status.default_ok(vec![entry(0, "task", ImportState::Success)]);
        });
    }

    let report = run_migrations(Arc::new(cluster), OpsConfig::default(), plan)
        .await
        .expect("batch should complete");
    assert!(
        report
            .tasks
            .iter()
            .all(|t| t.status == TaskStatus::Succeeded)
    );
    assert_eq!(report.succeeded(), report.tasks.len());
}

#[tokio::test(start_paused = true)]
async fn test_single_master_topology_plans_nothing() {
    let view =
        ClusterView::parse(M1, &master_line("aaa", M1, "0-16383")).unwrap();
    let plan = plan_equalize(&MasterLoad::snapshot(&view));
    assert!(plan.is_empty());
}
