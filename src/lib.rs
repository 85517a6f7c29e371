//! Online topology maintenance for Valkey clusters.
//!
//! This crate mutates the topology of a live, sharded, replicated cluster
//! while it keeps serving traffic: rebalancing and migrating hash slots
//! between masters, orchestrating manual failovers, and retiring shards
//! (drain plus forget). The cluster's own gossip view is the only source
//! of truth — it is polled fresh at every step, never cached — and every
//! remote operation is idempotent and retryable, because peers can change
//! role mid-operation.
//!
//! The crate is a library: an outer job runtime decodes its parameters
//! into the plan structs of [`tasks`] and calls the `run` entry points in
//! [`ops`]. Results and errors are the only channel back; nothing is
//! persisted here.
//!
//! ## Modules
//!
//! - [`view`]: topology reader (`CLUSTER NODES` over any reachable seed)
//! - [`slots`]: pure slot math and the equalize/drain planners
//! - [`ops`]: the operation drivers (migrate, failover, retire, forget,
//!   join) and the batch scheduler
//! - [`client`]: the wire command surface behind the `Connector` seam
//! - [`retry`], [`config`], [`error`]: the shared plumbing

pub mod client;
pub mod config;
pub mod error;
pub mod ops;
pub mod retry;
pub mod slots;
pub mod tasks;
pub mod view;

pub use client::{Connector, NodeHandle, ValkeyConnector};
pub use config::OpsConfig;
pub use error::OpsError;
pub use retry::RetryPolicy;
pub use tasks::{
    BatchReport, FailoverOutcome, FailoverReport, FailoverTask, MigrationTask, RetirementPlan,
    TaskStatus,
};
pub use view::ClusterView;
