//! Operation drivers.
//!
//! Each submodule executes one kind of coordinated maintenance operation
//! against a live cluster, generic over the [`crate::client::Connector`]
//! seam:
//!
//! - [`migrate`]: the slot-transfer state machine, failover-aware
//! - [`batch`]: groups migration tasks so same-host work serializes while
//!   cross-host work runs in parallel
//! - [`failover`]: manual replica promotion with pre/post checks
//! - [`retire`]: drain retiring masters, then broadcast forget
//! - [`forget`]: the forget broadcast itself
//! - [`join`]: introduce new nodes and wait for the handshake to clear
//!
//! Drivers run one operation at a time; coordinating concurrent operations
//! against overlapping nodes is the caller's discipline.

pub mod batch;
pub mod failover;
pub mod forget;
pub mod join;
pub mod migrate;
pub mod retire;

pub use batch::run_migrations;
pub use failover::run_failovers;
pub use migrate::SlotMigration;
pub use retire::{RetirementReport, plan_retirement};
