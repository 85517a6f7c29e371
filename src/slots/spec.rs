//! Textual slot specifications.
//!
//! The wire format for slot sets is a whitespace-separated list of single
//! slots and inclusive ranges, e.g. `"0-4095 6000 6002-6010"`. Parsing
//! applies set semantics: overlaps collapse, output is ascending and
//! de-duplicated. Formatting produces the most compact range rendering for
//! logs and error messages.

use crate::error::{OpsError, Result};
use crate::slots::TOTAL_SLOTS;

/// Parse a slot spec into an ascending, de-duplicated slot list.
///
/// An empty or whitespace-only spec yields an empty list. A malformed
/// token, a reversed range, or a slot outside `0..16384` is an
/// [`OpsError::InvalidSlotSpec`].
pub fn parse_slots(spec: &str) -> Result<Vec<u16>> {
    let mut slots = Vec::new();
    for token in spec.split_whitespace() {
        let (start, end) = match token.split_once('-') {
            Some((start, end)) => (parse_slot(token, start)?, parse_slot(token, end)?),
            None => {
                let slot = parse_slot(token, token)?;
                (slot, slot)
            }
        };
        if start > end {
            return Err(OpsError::InvalidSlotSpec(format!(
                "reversed range: {}",
                token
            )));
        }
        slots.extend(start..=end);
    }
    slots.sort_unstable();
    slots.dedup();
    Ok(slots)
}

fn parse_slot(token: &str, text: &str) -> Result<u16> {
    let slot: u16 = text
        .parse()
        .map_err(|_| OpsError::InvalidSlotSpec(format!("bad token: {}", token)))?;
    if slot >= TOTAL_SLOTS {
        return Err(OpsError::InvalidSlotSpec(format!(
            "slot {} out of range in token: {}",
            slot, token
        )));
    }
    Ok(slot)
}

/// Format a slot list as a compact range spec.
///
/// Consecutive runs collapse to `start-end`; the input does not have to be
/// sorted or unique.
pub fn format_slots(slots: &[u16]) -> String {
    let mut sorted = slots.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    let mut parts: Vec<String> = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return String::new();
    };
    let (mut start, mut end) = (first, first);
    for slot in iter {
        if slot == end + 1 {
            end = slot;
        } else {
            parts.push(render_range(start, end));
            start = slot;
            end = slot;
        }
    }
    parts.push(render_range(start, end));
    parts.join(" ")
}

fn render_range(start: u16, end: u16) -> String {
    if start == end {
        format!("{}", start)
    } else {
        format!("{}-{}", start, end)
    }
}

/// Slots present in `a` but not in `b`, ascending.
pub fn diff(a: &[u16], b: &[u16]) -> Vec<u16> {
    let mut out: Vec<u16> = a.iter().copied().filter(|s| !b.contains(s)).collect();
    out.sort_unstable();
    out.dedup();
    out
}

/// Slots present in both `a` and `b`, ascending.
pub fn intersect(a: &[u16], b: &[u16]) -> Vec<u16> {
    let mut out: Vec<u16> = a.iter().copied().filter(|s| b.contains(s)).collect();
    out.sort_unstable();
    out.dedup();
    out
}
