//! Drain planner for node retirement.
//!
//! Moves every slot off the retiring masters and onto the survivors,
//! without ever reshuffling slots the survivors already own.

use crate::error::{OpsError, Result};
use crate::slots::TOTAL_SLOTS;
use crate::slots::balance::MasterLoad;
use crate::tasks::MigrationTask;

/// Compute the transfers that empty every retiring master.
///
/// Each retiring slot (retiring masters in address order, slots in
/// list-position order) goes to the survivor with the least combined
/// current-plus-assigned load, ties broken by address, capped at
/// `ceil(16384 / survivors)`. Survivor-owned slots never move.
pub fn plan_drain(
    survivors: &[MasterLoad],
    retiring: &[MasterLoad],
) -> Result<Vec<MigrationTask>> {
    if survivors.is_empty() {
        return Err(OpsError::NoSurvivingMasters);
    }

    let cap = usize::from(TOTAL_SLOTS).div_ceil(survivors.len());

    let mut receivers: Vec<(String, usize)> = survivors
        .iter()
        .map(|s| (s.addr.clone(), s.slots.len()))
        .collect();
    receivers.sort_by(|a, b| a.0.cmp(&b.0));

    let mut sources: Vec<MasterLoad> = retiring.to_vec();
    sources.sort_by(|a, b| a.addr.cmp(&b.addr));

    let mut tasks = Vec::new();
    for source in sources {
        // Per-destination accumulation in first-assignment order, flushed
        // to one task per (source, dest) pair.
        let mut assigned: Vec<(String, Vec<u16>)> = Vec::new();
        for slot in source.slots {
            let pick = pick_receiver(&receivers, cap);
            if let Some((addr, count)) = receivers.get_mut(pick) {
                *count += 1;
                match assigned.iter_mut().find(|(a, _)| a == addr) {
                    Some((_, slots)) => slots.push(slot),
                    None => assigned.push((addr.clone(), vec![slot])),
                }
            }
        }
        for (dest, slots) in assigned {
            tasks.push(MigrationTask::planned(source.addr.clone(), dest, slots));
        }
    }
    Ok(tasks)
}

/// Index of the least-loaded receiver under the cap. The slot universe is
/// owned at most once, so while retiring slots remain some receiver is
/// under the cap; the uncapped fallback only fires on inconsistent input.
fn pick_receiver(receivers: &[(String, usize)], cap: usize) -> usize {
    let mut best: Option<usize> = None;
    for (idx, (_, count)) in receivers.iter().enumerate() {
        if *count >= cap {
            continue;
        }
        match best {
            Some(current) if receivers[current].1 <= *count => {}
            _ => best = Some(idx),
        }
    }
    best.unwrap_or_else(|| {
        receivers
            .iter()
            .enumerate()
            .min_by_key(|(_, (_, count))| *count)
            .map(|(idx, _)| idx)
            .unwrap_or(0)
    })
}
