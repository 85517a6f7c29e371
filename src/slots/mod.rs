//! Pure slot math and migration planning.
//!
//! Everything in here is side-effect free: textual slot-spec handling in
//! [`spec`], the equalizing rebalance planner in [`balance`], the
//! node-retirement drain planner in [`drain`]. The planners work on owned
//! per-call snapshots of the topology, never on shared state.

pub mod balance;
pub mod drain;
pub mod spec;

pub use balance::{MasterLoad, plan_equalize};
pub use drain::plan_drain;
pub use spec::{diff, format_slots, intersect, parse_slots};

/// Total number of hash slots in the cluster keyspace.
pub const TOTAL_SLOTS: u16 = 16384;
