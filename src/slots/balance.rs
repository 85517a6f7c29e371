//! Equalizing rebalance planner.
//!
//! Computes the minimal set of slot transfers that levels slot counts
//! across the running masters. Pure computation over an owned snapshot;
//! executing the resulting tasks is the migration driver's job.

use crate::slots::TOTAL_SLOTS;
use crate::tasks::MigrationTask;
use crate::view::ClusterView;

/// Owned snapshot of one master's slot list, keyed by address.
///
/// Planners copy these out of a [`ClusterView`] so concurrent workers never
/// alias live topology state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterLoad {
    /// Address (`ip:port`) of the master.
    pub addr: String,
    /// Slots owned, in topology-listing order.
    pub slots: Vec<u16>,
}

impl MasterLoad {
    /// Create a snapshot entry.
    pub fn new(addr: impl Into<String>, slots: Vec<u16>) -> Self {
        Self {
            addr: addr.into(),
            slots,
        }
    }

    /// Snapshot every running master of a view, address-sorted.
    pub fn snapshot(view: &ClusterView) -> Vec<MasterLoad> {
        let mut loads: Vec<MasterLoad> = view
            .running_masters()
            .into_iter()
            .map(|node| MasterLoad::new(node.addr.clone(), node.slots.clone()))
            .collect();
        loads.sort_by(|a, b| a.addr.cmp(&b.addr));
        loads
    }
}

struct Entry {
    addr: String,
    slots: Vec<u16>,
    balance: i64,
}

/// Compute the transfers that equalize slot ownership across `masters`.
///
/// Targets: `floor(16384 / N)` each, with the first `16384 mod N` masters
/// in address order absorbing one extra slot so the remainder is disposed
/// of exactly. The largest-deficit receiver is matched with the
/// largest-surplus donor until both sides reach balance; each step takes
/// slots from the tail of the donor's slot list in list-position order.
///
/// The plan is deterministic for identical input, its tasks are pairwise
/// slot-disjoint, and a single-master or already-balanced topology yields
/// an empty plan.
pub fn plan_equalize(masters: &[MasterLoad]) -> Vec<MigrationTask> {
    let n = masters.len();
    if n <= 1 {
        return Vec::new();
    }

    let expected = usize::from(TOTAL_SLOTS) / n;
    let remainder = usize::from(TOTAL_SLOTS) % n;

    let mut by_addr: Vec<MasterLoad> = masters.to_vec();
    by_addr.sort_by(|a, b| a.addr.cmp(&b.addr));

    let mut entries: Vec<Entry> = by_addr
        .into_iter()
        .enumerate()
        .map(|(idx, load)| {
            let target = expected + usize::from(idx < remainder);
            Entry {
                balance: load.slots.len() as i64 - target as i64,
                addr: load.addr,
                slots: load.slots,
            }
        })
        .collect();

    // Receivers first, donors last; ties resolved by address so the plan
    // is stable across runs.
    entries.sort_by(|a, b| a.balance.cmp(&b.balance).then_with(|| a.addr.cmp(&b.addr)));

    let mut tasks = Vec::new();
    let mut lo = 0usize;
    let mut hi = entries.len() - 1;
    while lo < hi {
        let deficit = -entries[lo].balance;
        let surplus = entries[hi].balance;
        if deficit <= 0 {
            lo += 1;
            continue;
        }
        if surplus <= 0 {
            hi -= 1;
            continue;
        }

        let step = deficit.min(surplus) as usize;
        let dest = entries[lo].addr.clone();
        let source = entries[hi].addr.clone();
        let donor_len = entries[hi].slots.len();
        let moved = entries[hi].slots.split_off(donor_len - step);
        tasks.push(MigrationTask::planned(source, dest, moved));

        entries[lo].balance += step as i64;
        entries[hi].balance -= step as i64;
        if entries[lo].balance == 0 {
            lo += 1;
        }
        if entries[hi].balance == 0 {
            hi -= 1;
        }
    }
    tasks
}
